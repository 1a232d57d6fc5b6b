use std::time::Duration;

use serde_json::{json, Value};

use crate::pipeline::{Notifier, PipelineError};

/// Status line posted after every run. The card never carries run details.
pub const STATUS_TEXT: &str = "태양광 예측 데이터 수집 스케줄러가 실행되었습니다.";

/// Teams incoming-webhook message wrapping a single-text adaptive card.
pub fn card_payload() -> Value {
    json!({
        "type": "message",
        "attachments": [
            {
                "contentType": "application/vnd.microsoft.card.adaptive",
                "contentUrl": null,
                "content": {
                    "$schema": "http://adaptivecards.io/schemas/adaptive-card.json",
                    "type": "AdaptiveCard",
                    "version": "1.2",
                    "body": [
                        {
                            "type": "TextBlock",
                            "text": STATUS_TEXT
                        }
                    ]
                }
            }
        ]
    })
}

pub struct TeamsWebhookNotifier {
    http: reqwest::Client,
    url: String,
}

impl TeamsWebhookNotifier {
    pub fn new(url: impl Into<String>, timeout: Option<Duration>) -> Result<Self, PipelineError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|e| PipelineError::Notify(format!("failed to build webhook client: {e}")))?;
        Ok(Self { http, url: url.into() })
    }
}

#[async_trait::async_trait]
impl Notifier for TeamsWebhookNotifier {
    async fn notify(&self) -> Result<(), PipelineError> {
        tracing::info!("webhook URL configured; sending run notification");

        let response = self
            .http
            .post(&self.url)
            .json(&card_payload())
            .send()
            .await
            .map_err(|e| PipelineError::Notify(format!("webhook request failed: {e}")))?;

        let status = response.status();
        tracing::info!(%status, "webhook responded");
        metrics::counter!("webhook_notifications_total").increment(1);

        if !status.is_success() {
            return Err(PipelineError::Notify(format!("webhook returned status {status}")));
        }
        Ok(())
    }
}
