use std::io::Write;

use kma_client::domain::ForecastItem;

use crate::{
    pipeline::{PipelineError, Sink},
    sinks::{encode_payload, PublishReceipt},
};

/// Writes the run payload to stdout as a single JSON line. Used for dry runs.
#[derive(Debug, Clone, Default)]
pub struct StdoutSink;

#[async_trait::async_trait]
impl Sink for StdoutSink {
    async fn publish(&self, items: &[ForecastItem]) -> Result<PublishReceipt, PipelineError> {
        let payload = encode_payload(items)?;
        let receipt = PublishReceipt::for_payload(items.len(), &payload);

        let mut out = std::io::stdout().lock();
        out.write_all(&payload)
            .and_then(|_| out.write_all(b"\n"))
            .and_then(|_| out.flush())
            .map_err(|e| PipelineError::Sink(format!("failed to write payload to stdout: {e}")))?;

        metrics::counter!("event_sink_published_items_total").increment(receipt.items as u64);
        Ok(receipt)
    }
}
