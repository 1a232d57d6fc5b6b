use anyhow::Result;
use forecast_collector::{config::AppConfig, job, observability};

/// Single collection run for external schedulers (cron, Kubernetes CronJob).
#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing()?;

    let cfg = AppConfig::load()?;
    job::run_once(&cfg).await?;

    Ok(())
}
