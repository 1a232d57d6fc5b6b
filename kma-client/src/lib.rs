pub mod api;
pub mod domain;

pub use api::{ApiError, ForecastApiClient, ForecastRequest};
