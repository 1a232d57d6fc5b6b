pub mod base_date;
pub mod forecast;
pub mod region;

pub use base_date::BaseDate;
pub use forecast::{ForecastItem, ForecastSlot};
pub use region::{Region, FACILITY_ABSENT, FACILITY_PRESENT};
