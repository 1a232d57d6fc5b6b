use std::{str::FromStr, time::Duration};

use base64::Engine as _;
use hmac::{Hmac, Mac};
use kma_client::domain::ForecastItem;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use sha2::Sha256;
use time::OffsetDateTime;

use crate::{
    config::ConfigError,
    pipeline::{PipelineError, Sink},
    sinks::{encode_payload, PublishReceipt},
};

const SEND_API_VERSION: &str = "2014-01";
const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(60 * 60);

/// Parsed Event Hubs connection string:
/// `Endpoint=sb://<host>/;SharedAccessKeyName=<name>;SharedAccessKey=<key>[;EntityPath=<hub>]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventHubConnection {
    pub host: String,
    pub key_name: String,
    pub key: String,
    pub entity_path: Option<String>,
}

impl FromStr for EventHubConnection {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: String| ConfigError::Invalid {
            name: crate::config::EVENT_HUB_CONNECTION_ENV,
            reason,
        };

        let mut host = None;
        let mut key_name = None;
        let mut key = None;
        let mut entity_path = None;

        for part in s.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let (k, v) = part
                .split_once('=')
                .ok_or_else(|| invalid(format!("segment '{part}' is not key=value")))?;
            match k.trim() {
                "Endpoint" => {
                    let h = v
                        .trim()
                        .strip_prefix("sb://")
                        .ok_or_else(|| invalid("Endpoint must start with sb://".to_string()))?
                        .trim_end_matches('/');
                    host = Some(h.to_string());
                }
                "SharedAccessKeyName" => key_name = Some(v.trim().to_string()),
                "SharedAccessKey" => key = Some(v.trim().to_string()),
                "EntityPath" => entity_path = Some(v.trim().to_string()),
                _ => {}
            }
        }

        Ok(Self {
            host: host
                .filter(|h| !h.is_empty())
                .ok_or_else(|| invalid("missing Endpoint".to_string()))?,
            key_name: key_name.ok_or_else(|| invalid("missing SharedAccessKeyName".to_string()))?,
            key: key.ok_or_else(|| invalid("missing SharedAccessKey".to_string()))?,
            entity_path,
        })
    }
}

/// Build a Service Bus shared access signature for `resource_uri`, valid until `expiry` (unix seconds).
pub fn sas_token(resource_uri: &str, key_name: &str, key: &str, expiry: i64) -> Result<String, PipelineError> {
    let encoded_uri: String = url::form_urlencoded::byte_serialize(resource_uri.as_bytes()).collect();
    let string_to_sign = format!("{encoded_uri}\n{expiry}");

    let mut mac = Hmac::<Sha256>::new_from_slice(key.as_bytes())
        .map_err(|e| PipelineError::Sink(format!("invalid shared access key: {e}")))?;
    mac.update(string_to_sign.as_bytes());
    let signature = base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes());
    let encoded_signature: String = url::form_urlencoded::byte_serialize(signature.as_bytes()).collect();

    Ok(format!(
        "SharedAccessSignature sr={encoded_uri}&sig={encoded_signature}&se={expiry}&skn={key_name}"
    ))
}

/// Publishes the whole run payload as a single event through the Event Hubs REST API.
pub struct EventHubSink {
    http: reqwest::Client,
    resource_uri: String,
    send_url: String,
    key_name: String,
    key: String,
    token_ttl: Duration,
    max_event_bytes: usize,
}

impl EventHubSink {
    pub fn new(connection: &EventHubConnection, hub: &str, max_event_bytes: usize) -> Self {
        Self::with_base_url(
            &format!("https://{}", connection.host),
            hub,
            connection,
            max_event_bytes,
        )
    }

    /// Same as [`EventHubSink::new`] but against an explicit base URL.
    pub fn with_base_url(
        base_url: &str,
        hub: &str,
        connection: &EventHubConnection,
        max_event_bytes: usize,
    ) -> Self {
        let resource_uri = format!("{}/{}", base_url.trim_end_matches('/'), hub);
        let send_url = format!("{resource_uri}/messages?timeout=60&api-version={SEND_API_VERSION}");
        Self {
            http: reqwest::Client::new(),
            resource_uri,
            send_url,
            key_name: connection.key_name.clone(),
            key: connection.key.clone(),
            token_ttl: DEFAULT_TOKEN_TTL,
            max_event_bytes,
        }
    }

    fn authorization(&self) -> Result<String, PipelineError> {
        let expiry = OffsetDateTime::now_utc().unix_timestamp() + self.token_ttl.as_secs() as i64;
        sas_token(&self.resource_uri, &self.key_name, &self.key, expiry)
    }
}

#[async_trait::async_trait]
impl Sink for EventHubSink {
    async fn publish(&self, items: &[ForecastItem]) -> Result<PublishReceipt, PipelineError> {
        let payload = encode_payload(items)?;
        if payload.len() > self.max_event_bytes {
            metrics::counter!("event_sink_errors_total").increment(1);
            return Err(PipelineError::Sink(format!(
                "payload of {} bytes exceeds the {} byte event limit",
                payload.len(),
                self.max_event_bytes
            )));
        }

        let receipt = PublishReceipt::for_payload(items.len(), &payload);
        let response = self
            .http
            .post(&self.send_url)
            .header(AUTHORIZATION, self.authorization()?)
            .header(CONTENT_TYPE, "application/json")
            .body(payload)
            .send()
            .await
            .map_err(|e| {
                metrics::counter!("event_sink_errors_total").increment(1);
                PipelineError::Sink(format!("event hub request failed: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "could not read error body".to_string());
            tracing::error!(%status, body = %body, "event hub rejected payload");
            metrics::counter!("event_sink_errors_total").increment(1);
            return Err(PipelineError::Sink(format!("event hub returned status {status}")));
        }

        metrics::counter!("event_sink_published_items_total").increment(receipt.items as u64);
        Ok(receipt)
    }
}
