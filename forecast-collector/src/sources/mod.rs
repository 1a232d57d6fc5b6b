pub mod forecast_api;
pub mod region_table;

pub use region_table::RegionTableSource;
