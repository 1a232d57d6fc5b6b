use std::time::Duration;

use reqwest::StatusCode;
use serde_json::Value;

use crate::domain::{BaseDate, ForecastSlot};

pub const DEFAULT_FORECAST_URL: &str = "https://bd.kma.go.kr/kma2020/energy/energyGeneration.do";

/// Forecast time requested for every region; midnight of the base date.
pub const DEFAULT_FCST_TIME: &str = "0000";

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("forecast request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("forecast API returned status {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("failed to decode forecast response: {0}")]
    Decode(String),
    #[error("forecast response is missing key {0}")]
    Contract(String),
}

impl ApiError {
    /// A body that is not JSON, or whose `result` is not a list of objects,
    /// only concerns one region's response. Transport and status failures
    /// and missing keys mean the upstream is unusable for the rest of the run.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ApiError::Decode(_))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ForecastRequest<'a> {
    pub base_date: &'a BaseDate,
    pub fcst_time: &'a str,
    pub reg_cd: &'a str,
}

impl ForecastRequest<'_> {
    /// Form fields in wire order. The forecast date always equals the base date.
    pub fn form(&self) -> [(&'static str, &str); 4] {
        [
            ("baseDate", self.base_date.as_str()),
            ("fcstDate", self.base_date.as_str()),
            ("fcstTime", self.fcst_time),
            ("regCd", self.reg_cd),
        ]
    }
}

/// Client for the KMA solar generation forecast endpoint.
#[derive(Debug, Clone)]
pub struct ForecastApiClient {
    http: reqwest::Client,
    url: String,
}

impl ForecastApiClient {
    pub fn new(url: impl Into<String>, timeout: Option<Duration>) -> Result<Self, ApiError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self::with_client(builder.build()?, url))
    }

    pub fn with_client(http: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Issue one form-encoded POST and decode the `result` array.
    pub async fn fetch(&self, request: &ForecastRequest<'_>) -> Result<Vec<ForecastSlot>, ApiError> {
        let response = self.http.post(&self.url).form(&request.form()).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "could not read error body".to_string());
            return Err(ApiError::Status { status, body });
        }

        let body = response.bytes().await?;
        tracing::debug!(reg_cd = request.reg_cd, bytes = body.len(), "forecast response received");
        decode_slots(&body)
    }
}

/// Decode a response body into slots, failing on the first element that
/// does not convert.
pub fn decode_slots(body: &[u8]) -> Result<Vec<ForecastSlot>, ApiError> {
    let response: Value = serde_json::from_slice(body).map_err(|e| ApiError::Decode(e.to_string()))?;

    let result = match response {
        Value::Object(mut object) => object
            .remove("result")
            .ok_or_else(|| ApiError::Contract("'result'".to_string()))?,
        other => return Err(ApiError::Decode(format!("expected an object, got {}", kind(&other)))),
    };

    let elements = match result {
        Value::Array(elements) => elements,
        other => return Err(ApiError::Decode(format!("result: expected an array, got {}", kind(&other)))),
    };

    elements
        .into_iter()
        .enumerate()
        .map(|(i, element)| match element {
            Value::Object(object) => ForecastSlot::from_object(object)
                .map_err(|key| ApiError::Contract(format!("'{key}' in result[{i}]"))),
            other => Err(ApiError::Decode(format!("result[{i}]: expected an object, got {}", kind(&other)))),
        })
        .collect()
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
