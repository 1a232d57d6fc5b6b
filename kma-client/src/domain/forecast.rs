use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use super::Region;

/// One element of the `result` array returned by the energy forecast endpoint.
///
/// The endpoint is not consistent about JSON types (`"7.25"` next to `7.25`,
/// `"-"` for unavailable values), so every field is kept exactly as received.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastSlot {
    pub fcst_date: Value,
    pub fcst_time: Value,
    pub pcap: Value,
    pub qgen: Value,
    pub reg_cd: Value,
    pub srad: Value,
    pub temp: Value,
    pub wspd: Value,
}

impl ForecastSlot {
    /// Take the eight forecast fields out of one response object.
    ///
    /// Fails with the name of the first missing key. Extra keys are ignored.
    pub fn from_object(mut object: Map<String, Value>) -> Result<Self, &'static str> {
        let mut take = |key: &'static str| object.remove(key).ok_or(key);
        Ok(ForecastSlot {
            fcst_date: take("fcstDate")?,
            fcst_time: take("fcstTime")?,
            pcap: take("pcap")?,
            qgen: take("qgen")?,
            reg_cd: take("regCd")?,
            srad: take("srad")?,
            temp: take("temp")?,
            wspd: take("wspd")?,
        })
    }
}

/// Forecast record published to the event sink: a slot merged with the
/// static attributes of the region it was requested for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastItem {
    pub city: Option<String>,
    pub county: Option<String>,
    pub fcst_date: Value,
    pub fcst_time: Value,
    pub pcap: Value,
    pub qgen: Value,
    pub reg_cd: Value,
    pub srad: Value,
    pub temp: Value,
    pub wspd: Value,
    pub lat: Option<Number>,
    pub lon: Option<Number>,
}

impl ForecastItem {
    pub fn merge(region: &Region, slot: ForecastSlot) -> Self {
        ForecastItem {
            city: region.province.clone(),
            county: region.county.clone(),
            fcst_date: slot.fcst_date,
            fcst_time: slot.fcst_time,
            pcap: slot.pcap,
            qgen: slot.qgen,
            reg_cd: slot.reg_cd,
            srad: slot.srad,
            temp: slot.temp,
            wspd: slot.wspd,
            lat: region.latitude.clone(),
            lon: region.longitude.clone(),
        }
    }
}
