pub mod config;
pub mod job;
pub mod metrics_server;
pub mod notify;
pub mod observability;
pub mod pipeline;
pub mod scheduler;
pub mod sinks;
pub mod sources;
pub mod transform;

pub use pipeline::{Pipeline, PipelineError, RegionOutcome, RunReport};
