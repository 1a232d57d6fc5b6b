pub mod event_hub;
pub mod stdout;

pub use event_hub::{EventHubConnection, EventHubSink};
pub use stdout::StdoutSink;

use kma_client::domain::ForecastItem;

use crate::pipeline::{PipelineError, Sink};

/// Outcome of a successful publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReceipt {
    pub items: usize,
    pub bytes: usize,
    /// blake3 hex digest of the serialized payload; identical re-runs share it.
    pub digest: String,
}

impl PublishReceipt {
    pub fn for_payload(items: usize, payload: &[u8]) -> Self {
        Self {
            items,
            bytes: payload.len(),
            digest: blake3::hash(payload).to_hex().to_string(),
        }
    }
}

/// Serialize the run payload: one JSON array in collection order.
pub fn encode_payload(items: &[ForecastItem]) -> Result<Vec<u8>, PipelineError> {
    serde_json::to_vec(items).map_err(|e| PipelineError::Sink(format!("failed to encode payload: {e}")))
}

/// Sink selected by `sink.kind`.
pub enum ConfiguredSink {
    EventHub(EventHubSink),
    Stdout(StdoutSink),
}

#[async_trait::async_trait]
impl Sink for ConfiguredSink {
    async fn publish(&self, items: &[ForecastItem]) -> Result<PublishReceipt, PipelineError> {
        match self {
            Self::EventHub(s) => s.publish(items).await,
            Self::Stdout(s) => s.publish(items).await,
        }
    }
}
