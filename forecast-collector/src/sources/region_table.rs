use std::{fs, path::PathBuf};

use csv::StringRecord;
use encoding_rs::Encoding;
use kma_client::domain::Region;
use serde_json::Number;

use crate::pipeline::{PipelineError, RegionSource};

pub const COL_GRID_X: &str = "격자X";
pub const COL_GRID_Y: &str = "격자Y";
pub const COL_ADMIN_CODE: &str = "행정구역코드";
pub const COL_FACILITY: &str = "발전설비유무";
pub const COL_PROVINCE: &str = "도";
pub const COL_COUNTY: &str = "시";
pub const COL_LATITUDE: &str = "위도(초/100)";
pub const COL_LONGITUDE: &str = "경도(초/100)";

const REQUIRED_COLUMNS: [&str; 8] = [
    COL_GRID_X,
    COL_GRID_Y,
    COL_ADMIN_CODE,
    COL_FACILITY,
    COL_PROVINCE,
    COL_COUNTY,
    COL_LATITUDE,
    COL_LONGITUDE,
];

/// Regional reference table in CSV form.
///
/// The file is decoded with the configured encoding (EUC-KR for the table
/// shipped with the job); a UTF-8 or UTF-16 BOM overrides it.
///
/// Expected header columns (by name):
/// - 격자X, 격자Y (integer grid coordinates)
/// - 행정구역코드 (administrative code)
/// - 발전설비유무 (`유` / `무`)
/// - 도, 시 (province, county)
/// - 위도(초/100), 경도(초/100)
///
/// Empty cells are read as missing. Other columns are ignored.
pub struct RegionTableSource {
    path: PathBuf,
    encoding: &'static Encoding,
}

impl RegionTableSource {
    pub fn new<P: Into<PathBuf>>(path: P, encoding: &'static Encoding) -> Self {
        Self {
            path: path.into(),
            encoding,
        }
    }
}

fn parse_optional_string(s: &str) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Integer cells stay integers and decimal cells stay decimals.
fn parse_optional_number(row: usize, name: &str, s: &str) -> Result<Option<Number>, PipelineError> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    if let Ok(v) = trimmed.parse::<i64>() {
        return Ok(Some(Number::from(v)));
    }
    trimmed
        .parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Some)
        .ok_or_else(|| PipelineError::Source(format!("row {row}: invalid {name} '{trimmed}': expected a number")))
}

/// Grid cells may have been written as floats (`60.0`) by spreadsheet tools.
fn parse_optional_grid(row: usize, name: &str, s: &str) -> Result<Option<i32>, PipelineError> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    if let Ok(v) = trimmed.parse::<i32>() {
        return Ok(Some(v));
    }
    match trimmed.parse::<f64>() {
        Ok(v) if v.fract() == 0.0 && v >= i32::MIN as f64 && v <= i32::MAX as f64 => Ok(Some(v as i32)),
        _ => Err(PipelineError::Source(format!(
            "row {row}: invalid {name} '{trimmed}': expected an integer"
        ))),
    }
}

fn record_to_region(row: usize, record: &StringRecord, headers: &StringRecord) -> Result<Region, PipelineError> {
    let get = |name: &str| -> Result<&str, PipelineError> {
        headers
            .iter()
            .position(|h| h.trim() == name)
            .and_then(|idx| record.get(idx))
            .ok_or_else(|| PipelineError::Source(format!("row {row}: missing column '{name}'")))
    };

    Ok(Region {
        admin_code: parse_optional_string(get(COL_ADMIN_CODE)?),
        province: parse_optional_string(get(COL_PROVINCE)?),
        county: parse_optional_string(get(COL_COUNTY)?),
        grid_x: parse_optional_grid(row, COL_GRID_X, get(COL_GRID_X)?)?,
        grid_y: parse_optional_grid(row, COL_GRID_Y, get(COL_GRID_Y)?)?,
        latitude: parse_optional_number(row, COL_LATITUDE, get(COL_LATITUDE)?)?,
        longitude: parse_optional_number(row, COL_LONGITUDE, get(COL_LONGITUDE)?)?,
        facility_flag: parse_optional_string(get(COL_FACILITY)?),
    })
}

#[async_trait::async_trait]
impl RegionSource for RegionTableSource {
    async fn load(&self) -> Result<Vec<Region>, PipelineError> {
        // The table is small and read once per run, so the blocking reader is fine here.
        let bytes = fs::read(&self.path).map_err(|e| {
            PipelineError::Source(format!("failed to open reference table {}: {e}", self.path.display()))
        })?;
        let (text, used, had_errors) = self.encoding.decode(&bytes);
        if had_errors {
            return Err(PipelineError::Source(format!(
                "reference table {} is not valid {}",
                self.path.display(),
                used.name()
            )));
        }

        let mut rdr = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(text.as_bytes());
        let headers = rdr
            .headers()
            .map_err(|e| PipelineError::Source(format!("failed to read reference table headers: {e}")))?
            .clone();

        let headers = StringRecord::from(
            headers
                .iter()
                .map(|h| h.trim_start_matches('\u{feff}'))
                .collect::<Vec<_>>(),
        );

        if let Some(missing) = REQUIRED_COLUMNS
            .iter()
            .find(|name| !headers.iter().any(|h| h.trim() == **name))
        {
            return Err(PipelineError::Source(format!(
                "reference table is missing column '{missing}'"
            )));
        }

        let mut regions = Vec::new();
        for (row, result) in rdr.records().enumerate() {
            let record = result
                .map_err(|e| PipelineError::Source(format!("failed to read reference row {row}: {e}")))?;
            regions.push(record_to_region(row, &record, &headers)?);
        }

        Ok(regions)
    }
}
