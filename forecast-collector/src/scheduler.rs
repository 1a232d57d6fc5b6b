use std::future::Future;

use time::{Duration, OffsetDateTime, Time, UtcOffset};

use crate::pipeline::{PipelineError, RunReport};

/// First instant strictly after `now` whose UTC time of day is `at`.
pub fn next_fire_after(now: OffsetDateTime, at: Time) -> OffsetDateTime {
    let now = now.to_offset(UtcOffset::UTC);
    let today = now.date().with_time(at).assume_utc();
    if today > now {
        today
    } else {
        today + Duration::days(1)
    }
}

async fn execute<F, Fut>(job: &mut F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<RunReport, PipelineError>>,
{
    metrics::counter!("scheduled_runs_total").increment(1);
    match job().await {
        Ok(report) => tracing::info!(
            base_date = %report.base_date,
            published = report.published,
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "scheduled run succeeded"
        ),
        Err(e) => {
            metrics::counter!("scheduled_run_failures_total").increment(1);
            tracing::error!(error = %e, "scheduled run failed");
        }
    }
}

/// Run `job` every day at `at` (UTC) until Ctrl-C.
///
/// A failed run is logged and counted; it does not stop later firings.
pub async fn run_daily<F, Fut>(at: Time, run_on_startup: bool, mut job: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<RunReport, PipelineError>>,
{
    if run_on_startup {
        tracing::info!("running collection on startup");
        execute(&mut job).await;
    }

    loop {
        let now = OffsetDateTime::now_utc();
        let next = next_fire_after(now, at);
        let wait = std::time::Duration::try_from(next - now).unwrap_or_default();
        tracing::info!(next_run = %next, "waiting for next scheduled run");

        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown signal received; stopping scheduler");
                return;
            }
        }

        execute(&mut job).await;
    }
}
