use serde_json::Number;

/// Facility flag value marking a region without solar generation facilities.
pub const FACILITY_ABSENT: &str = "무";
pub const FACILITY_PRESENT: &str = "유";

/// One row of the regional reference table.
///
/// Every attribute is optional because any cell of the table may be empty;
/// eligibility for querying is decided by the collector, not here.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Region {
    pub admin_code: Option<String>,
    pub province: Option<String>,
    pub county: Option<String>,
    pub grid_x: Option<i32>,
    pub grid_y: Option<i32>,
    /// Latitude in arcseconds/100, in the numeric form the table wrote it.
    pub latitude: Option<Number>,
    /// Longitude in arcseconds/100, in the numeric form the table wrote it.
    pub longitude: Option<Number>,
    pub facility_flag: Option<String>,
}

impl Region {
    pub fn has_no_facility(&self) -> bool {
        self.facility_flag.as_deref() == Some(FACILITY_ABSENT)
    }
}
