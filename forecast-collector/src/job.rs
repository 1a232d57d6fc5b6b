use kma_client::ForecastApiClient;

use crate::{
    config::{AppConfig, SinkKind},
    notify::TeamsWebhookNotifier,
    pipeline::{Pipeline, RunReport},
    sinks::{ConfiguredSink, EventHubSink, StdoutSink},
    sources::RegionTableSource,
};

pub type CollectorPipeline = Pipeline<RegionTableSource, ForecastApiClient, ConfiguredSink, TeamsWebhookNotifier>;

/// Wire a validated configuration into a runnable pipeline. No network I/O happens here.
pub fn build_pipeline(cfg: &AppConfig) -> anyhow::Result<CollectorPipeline> {
    let forecast = ForecastApiClient::new(cfg.forecast_api.url.clone(), cfg.forecast_timeout())?;

    let sink = match cfg.sink.kind {
        SinkKind::EventHub => {
            let (hub, conn) = cfg.event_hub_target()?;
            if let Some(path) = conn.entity_path.as_deref().filter(|p| *p != hub) {
                tracing::warn!(entity_path = path, hub = %hub, "connection string EntityPath differs from configured event hub name");
            }
            let sink = match &cfg.event_hub.base_url {
                Some(base) => EventHubSink::with_base_url(base, &hub, &conn, cfg.sink.max_event_bytes),
                None => EventHubSink::new(&conn, &hub, cfg.sink.max_event_bytes),
            };
            ConfiguredSink::EventHub(sink)
        }
        SinkKind::Stdout => ConfiguredSink::Stdout(StdoutSink),
    };

    let notifier = cfg
        .webhook
        .url
        .as_ref()
        .map(|url| TeamsWebhookNotifier::new(url.clone(), cfg.webhook_timeout()))
        .transpose()?;

    Ok(Pipeline {
        regions: RegionTableSource::new(&cfg.reference.path, cfg.reference_encoding()?),
        forecast,
        sink,
        notifier,
        fcst_time: cfg.forecast_api.fcst_time.clone(),
        utc_offset: cfg.utc_offset()?,
    })
}

/// Build the pipeline from `cfg` and run it once.
pub async fn run_once(cfg: &AppConfig) -> anyhow::Result<RunReport> {
    let pipeline = build_pipeline(cfg)?;
    let report = pipeline.run().await?;
    tracing::info!(
        base_date = %report.base_date,
        published = report.published,
        digest = %report.payload_digest,
        "run finished"
    );
    Ok(report)
}
