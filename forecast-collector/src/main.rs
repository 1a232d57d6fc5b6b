use anyhow::Result;
use forecast_collector::{config::AppConfig, job, metrics_server, observability, scheduler};

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing()?;

    // Load configuration; fails before any external call when settings are missing.
    let cfg = AppConfig::load()?;

    // Start metrics server if configured
    if let Some(metrics_cfg) = &cfg.metrics {
        metrics_server::init(&metrics_cfg.bind_addr)?;
    }

    let pipeline = job::build_pipeline(&cfg)?;
    let at = cfg.schedule_time()?;

    tracing::info!(time_utc = %at, sink = ?cfg.sink.kind, "solar forecast scheduler started");
    scheduler::run_daily(at, cfg.schedule.run_on_startup, || pipeline.run()).await;
    tracing::info!("solar forecast scheduler stopped");

    Ok(())
}
