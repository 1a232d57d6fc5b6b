use kma_client::{
    domain::{BaseDate, ForecastItem, ForecastSlot, Region},
    ApiError, ForecastRequest,
};
use time::{OffsetDateTime, UtcOffset};

use crate::{sinks::PublishReceipt, transform::{self, SkipReason}};

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("source error: {0}")]
    Source(String),
    #[error("sink error: {0}")]
    Sink(String),
    #[error("notify error: {0}")]
    Notify(String),
}

/// Regional reference table, loaded in full before any request is issued.
#[async_trait::async_trait]
pub trait RegionSource: Send + Sync {
    async fn load(&self) -> Result<Vec<Region>, PipelineError>;
}

/// Upstream forecast lookup for a single region.
#[async_trait::async_trait]
pub trait ForecastSource: Send + Sync {
    async fn fetch(&self, request: &ForecastRequest<'_>) -> Result<Vec<ForecastSlot>, ApiError>;
}

/// Destination of the run payload; called exactly once per run.
#[async_trait::async_trait]
pub trait Sink: Send + Sync {
    async fn publish(&self, items: &[ForecastItem]) -> Result<PublishReceipt, PipelineError>;
}

/// Post-publish notification that the run happened.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self) -> Result<(), PipelineError>;
}

/// What happened to one row of the reference table.
#[derive(Debug, Clone, PartialEq)]
pub enum RegionOutcome {
    Collected(Vec<ForecastItem>),
    Skipped(SkipReason),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub base_date: BaseDate,
    pub published: usize,
    pub payload_digest: String,
    pub skipped: Vec<(usize, SkipReason)>,
    pub failed: Vec<(usize, String)>,
}

impl RunReport {
    pub fn skipped_rows(&self) -> Vec<usize> {
        self.skipped.iter().map(|(row, _)| *row).collect()
    }

    pub fn failed_rows(&self) -> Vec<usize> {
        self.failed.iter().map(|(row, _)| *row).collect()
    }
}

pub struct Pipeline<R, F, K, N> {
    pub regions: R,
    pub forecast: F,
    pub sink: K,
    pub notifier: Option<N>,
    pub fcst_time: String,
    pub utc_offset: UtcOffset,
}

impl<R, F, K, N> Pipeline<R, F, K, N>
where
    R: RegionSource,
    F: ForecastSource,
    K: Sink,
    N: Notifier,
{
    pub async fn run(&self) -> Result<RunReport, PipelineError> {
        self.run_at(OffsetDateTime::now_utc()).await
    }

    /// One full collection run as of `now`.
    ///
    /// Regions are queried strictly one after another in table order.
    pub async fn run_at(&self, now: OffsetDateTime) -> Result<RunReport, PipelineError> {
        tracing::info!("solar forecast collection started");

        let regions = self.regions.load().await?;
        let base_date = BaseDate::from_instant(now, self.utc_offset);
        tracing::info!(base_date = %base_date, regions = regions.len(), "reference table loaded");

        let mut items: Vec<ForecastItem> = Vec::new();
        let mut skipped = Vec::new();
        let mut failed = Vec::new();

        for (row, region) in regions.iter().enumerate() {
            match self.collect_region(row, region, &base_date).await? {
                RegionOutcome::Collected(mut collected) => {
                    metrics::counter!("forecast_items_collected_total").increment(collected.len() as u64);
                    items.append(&mut collected);
                }
                RegionOutcome::Skipped(reason) => {
                    metrics::counter!("regions_skipped_total").increment(1);
                    tracing::debug!(row, %reason, "region skipped");
                    skipped.push((row, reason));
                }
                RegionOutcome::Failed(error) => {
                    metrics::counter!("regions_failed_total").increment(1);
                    tracing::error!(row, error = %error, "failed to convert forecast response; region dropped");
                    failed.push((row, error));
                }
            }
        }

        tracing::info!(count = items.len(), "forecast collection finished");

        let receipt = self.sink.publish(&items).await?;
        tracing::info!(
            count = receipt.items,
            bytes = receipt.bytes,
            digest = %receipt.digest,
            "published forecast items to event sink"
        );

        match &self.notifier {
            Some(notifier) => notifier.notify().await?,
            None => tracing::info!("webhook URL not configured; skipping notification"),
        }

        let report = RunReport {
            base_date,
            published: receipt.items,
            payload_digest: receipt.digest,
            skipped,
            failed,
        };

        tracing::info!(
            skipped = ?report.skipped_rows(),
            failed = ?report.failed_rows(),
            "rows excluded from collection"
        );
        tracing::info!("solar forecast collection completed");

        Ok(report)
    }

    async fn collect_region(
        &self,
        row: usize,
        region: &Region,
        base_date: &BaseDate,
    ) -> Result<RegionOutcome, PipelineError> {
        let eligible = match transform::check_eligibility(region) {
            Ok(eligible) => eligible,
            Err(reason) => return Ok(RegionOutcome::Skipped(reason)),
        };

        let request = ForecastRequest {
            base_date,
            fcst_time: &self.fcst_time,
            reg_cd: eligible.admin_code,
        };

        metrics::counter!("forecast_api_requests_total").increment(1);
        match self.forecast.fetch(&request).await {
            Ok(slots) => Ok(RegionOutcome::Collected(transform::merge_slots(eligible.region, slots))),
            Err(e) if e.is_recoverable() => Ok(RegionOutcome::Failed(e.to_string())),
            Err(e) => Err(PipelineError::Source(format!(
                "forecast request for row {row} (regCd {}) failed: {e}",
                eligible.admin_code
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        collections::HashMap,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Mutex,
        },
    };

    use kma_client::domain::FACILITY_ABSENT;
    use reqwest::StatusCode;
    use serde_json::{json, Number};
    use time::macros::{datetime, offset};

    struct StaticRegions(Vec<Region>);

    #[async_trait::async_trait]
    impl RegionSource for StaticRegions {
        async fn load(&self) -> Result<Vec<Region>, PipelineError> {
            Ok(self.0.clone())
        }
    }

    struct MissingTable;

    #[async_trait::async_trait]
    impl RegionSource for MissingTable {
        async fn load(&self) -> Result<Vec<Region>, PipelineError> {
            Err(PipelineError::Source("failed to open reference table".to_string()))
        }
    }

    #[derive(Clone)]
    enum Reply {
        Slots(Vec<ForecastSlot>),
        Undecodable,
        MissingKey,
        Status(u16),
    }

    #[derive(Default)]
    struct FakeForecast {
        replies: HashMap<String, Reply>,
        calls: Mutex<Vec<(String, String, String)>>,
    }

    impl FakeForecast {
        fn reply(mut self, reg_cd: &str, reply: Reply) -> Self {
            self.replies.insert(reg_cd.to_string(), reply);
            self
        }

        fn calls(&self) -> Vec<(String, String, String)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl ForecastSource for FakeForecast {
        async fn fetch(&self, request: &ForecastRequest<'_>) -> Result<Vec<ForecastSlot>, ApiError> {
            self.calls.lock().unwrap().push((
                request.base_date.to_string(),
                request.fcst_time.to_string(),
                request.reg_cd.to_string(),
            ));
            match self.replies.get(request.reg_cd).cloned().unwrap_or(Reply::Slots(Vec::new())) {
                Reply::Slots(slots) => Ok(slots),
                Reply::Undecodable => Err(ApiError::Decode("expected value at line 1 column 1".to_string())),
                Reply::MissingKey => Err(ApiError::Contract("'qgen' in result[0]".to_string())),
                Reply::Status(code) => Err(ApiError::Status {
                    status: StatusCode::from_u16(code).unwrap(),
                    body: String::new(),
                }),
            }
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        published: Mutex<Vec<Vec<ForecastItem>>>,
    }

    #[async_trait::async_trait]
    impl Sink for RecordingSink {
        async fn publish(&self, items: &[ForecastItem]) -> Result<PublishReceipt, PipelineError> {
            self.published.lock().unwrap().push(items.to_vec());
            Ok(PublishReceipt {
                items: items.len(),
                bytes: 0,
                digest: "test".to_string(),
            })
        }
    }

    struct FailingSink;

    #[async_trait::async_trait]
    impl Sink for FailingSink {
        async fn publish(&self, _items: &[ForecastItem]) -> Result<PublishReceipt, PipelineError> {
            Err(PipelineError::Sink("event hub returned status 401".to_string()))
        }
    }

    #[derive(Default)]
    struct CountingNotifier {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait::async_trait]
    impl Notifier for CountingNotifier {
        async fn notify(&self) -> Result<(), PipelineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(PipelineError::Notify("webhook returned status 500".to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn region(code: Option<&str>, grid_x: Option<i32>, flag: &str) -> Region {
        Region {
            admin_code: code.map(str::to_string),
            province: Some("경기도".to_string()),
            county: code.map(|c| format!("county-{c}")),
            grid_x,
            grid_y: Some(120),
            latitude: Some(Number::from(13_500_000_i64)),
            longitude: Some(Number::from(45_700_000_i64)),
            facility_flag: Some(flag.to_string()),
        }
    }

    fn slot(reg_cd: &str, fcst_time: &str) -> ForecastSlot {
        ForecastSlot {
            fcst_date: json!("20240102"),
            fcst_time: json!(fcst_time),
            pcap: json!(100.0),
            qgen: json!("12.0"),
            reg_cd: json!(reg_cd),
            srad: json!(250),
            temp: json!(4.0),
            wspd: json!("-"),
        }
    }

    fn pipeline<R, F, K>(
        regions: R,
        forecast: F,
        sink: K,
        notifier: Option<CountingNotifier>,
    ) -> Pipeline<R, F, K, CountingNotifier> {
        Pipeline {
            regions,
            forecast,
            sink,
            notifier,
            fcst_time: "0000".to_string(),
            utc_offset: offset!(+9),
        }
    }

    const NOW: OffsetDateTime = datetime!(2024-01-01 16:00:00 UTC);

    #[tokio::test]
    async fn three_row_table_collects_only_eligible_region() {
        let p = pipeline(
            StaticRegions(vec![
                region(Some("111"), Some(60), "유"),
                region(Some("222"), Some(61), FACILITY_ABSENT),
                region(Some("333"), None, "유"),
            ]),
            FakeForecast::default().reply("111", Reply::Slots(vec![slot("111", "0000"), slot("111", "0100")])),
            RecordingSink::default(),
            None,
        );

        let report = p.run_at(NOW).await.unwrap();

        assert_eq!(report.skipped_rows(), vec![1, 2]);
        assert_eq!(report.skipped[0].1, SkipReason::NoGenerationFacility);
        assert_eq!(report.skipped[1].1, SkipReason::MissingGridX);
        assert_eq!(report.published, 2);
        assert!(report.failed.is_empty());

        let calls = p.forecast.calls();
        assert_eq!(calls, vec![("20240102".to_string(), "0000".to_string(), "111".to_string())]);

        let published = p.sink.published.lock().unwrap();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].len(), 2);
        assert_eq!(published[0][0].county.as_deref(), Some("county-111"));
        assert_eq!(published[0][1].fcst_time, json!("0100"));
        assert_eq!(published[0][1].wspd, json!("-"));
    }

    #[tokio::test]
    async fn decode_failure_drops_only_that_region() {
        let p = pipeline(
            StaticRegions(vec![
                region(Some("111"), Some(60), "유"),
                region(Some("222"), Some(61), "유"),
                region(Some("333"), Some(62), "유"),
            ]),
            FakeForecast::default()
                .reply("111", Reply::Slots(vec![slot("111", "0000")]))
                .reply("222", Reply::Undecodable)
                .reply("333", Reply::Slots(vec![slot("333", "0000"), slot("333", "0100")])),
            RecordingSink::default(),
            None,
        );

        let report = p.run_at(NOW).await.unwrap();

        assert_eq!(report.failed_rows(), vec![1]);
        assert_eq!(report.published, 3);
        assert_eq!(p.forecast.calls().len(), 3);

        let published = p.sink.published.lock().unwrap();
        let codes: Vec<&str> = published[0].iter().filter_map(|i| i.reg_cd.as_str()).collect();
        assert_eq!(codes, vec!["111", "333", "333"]);
    }

    #[tokio::test]
    async fn upstream_status_error_aborts_before_publish() {
        let notifier = CountingNotifier::default();
        let p = pipeline(
            StaticRegions(vec![
                region(Some("111"), Some(60), "유"),
                region(Some("222"), Some(61), "유"),
            ]),
            FakeForecast::default().reply("111", Reply::Status(503)),
            RecordingSink::default(),
            Some(notifier),
        );

        let err = p.run_at(NOW).await.unwrap_err();

        assert!(matches!(err, PipelineError::Source(_)));
        assert_eq!(p.forecast.calls().len(), 1);
        assert!(p.sink.published.lock().unwrap().is_empty());
        assert_eq!(p.notifier.as_ref().unwrap().calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn response_missing_a_key_aborts_the_run() {
        let p = pipeline(
            StaticRegions(vec![
                region(Some("111"), Some(60), "유"),
                region(Some("222"), Some(61), "유"),
            ]),
            FakeForecast::default()
                .reply("111", Reply::MissingKey)
                .reply("222", Reply::Slots(vec![slot("222", "0000")])),
            RecordingSink::default(),
            Some(CountingNotifier::default()),
        );

        let err = p.run_at(NOW).await.unwrap_err();

        assert!(matches!(err, PipelineError::Source(_)));
        assert!(err.to_string().contains("qgen"));
        assert_eq!(p.forecast.calls().len(), 1);
        assert!(p.sink.published.lock().unwrap().is_empty());
        assert_eq!(p.notifier.as_ref().unwrap().calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn reference_load_failure_makes_no_requests() {
        let p = pipeline(MissingTable, FakeForecast::default(), RecordingSink::default(), None);

        assert!(matches!(p.run_at(NOW).await, Err(PipelineError::Source(_))));
        assert!(p.forecast.calls().is_empty());
        assert!(p.sink.published.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_collection_still_publishes_once_and_notifies() {
        let p = pipeline(
            StaticRegions(vec![region(None, Some(60), "유")]),
            FakeForecast::default(),
            RecordingSink::default(),
            Some(CountingNotifier::default()),
        );

        let report = p.run_at(NOW).await.unwrap();

        assert_eq!(report.published, 0);
        assert_eq!(report.skipped, vec![(0, SkipReason::MissingAdminCode)]);
        assert_eq!(p.sink.published.lock().unwrap().len(), 1);
        assert_eq!(p.notifier.as_ref().unwrap().calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn sink_failure_skips_notification() {
        let p = pipeline(
            StaticRegions(vec![region(Some("111"), Some(60), "유")]),
            FakeForecast::default().reply("111", Reply::Slots(vec![slot("111", "0000")])),
            FailingSink,
            Some(CountingNotifier::default()),
        );

        assert!(matches!(p.run_at(NOW).await, Err(PipelineError::Sink(_))));
        assert_eq!(p.notifier.as_ref().unwrap().calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn notifier_failure_surfaces_after_publish() {
        let p = pipeline(
            StaticRegions(vec![region(Some("111"), Some(60), "유")]),
            FakeForecast::default().reply("111", Reply::Slots(vec![slot("111", "0000")])),
            RecordingSink::default(),
            Some(CountingNotifier {
                calls: AtomicUsize::new(0),
                fail: true,
            }),
        );

        assert!(matches!(p.run_at(NOW).await, Err(PipelineError::Notify(_))));
        assert_eq!(p.sink.published.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn base_date_follows_configured_offset() {
        let p = pipeline(
            StaticRegions(vec![region(Some("111"), Some(60), "유")]),
            FakeForecast::default(),
            RecordingSink::default(),
            None,
        );

        let report = p.run_at(datetime!(2024-06-30 14:59:00 UTC)).await.unwrap();
        assert_eq!(report.base_date.as_str(), "20240630");

        let report = p.run_at(datetime!(2024-06-30 15:00:00 UTC)).await.unwrap();
        assert_eq!(report.base_date.as_str(), "20240701");

        let dates: Vec<String> = p.forecast.calls().into_iter().map(|(d, _, _)| d).collect();
        assert_eq!(dates, vec!["20240630", "20240701"]);
    }
}
