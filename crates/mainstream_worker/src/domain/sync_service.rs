use crate::domain::{
    retry_once_if_transient, DeviceDirectoryCache, FetchWindow, LatestStoreOutcome,
    TelemetryIngestService, UpstreamTelemetryClient,
};
use async_trait::async_trait;
use common::domain::{Clock, DatabaseProbe, Device, DomainError, DomainResult};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, instrument, warn};

#[derive(Debug, Clone)]
pub struct SyncServiceConfig {
    /// Look-back of the batch fetch, ending at the cycle's "now"
    pub batch_window: Duration,
    pub device_cache_ttl: Duration,
    pub warmup_retry_delay: Duration,
}

impl Default for SyncServiceConfig {
    fn default() -> Self {
        Self {
            batch_window: Duration::from_secs(30 * 60),
            device_cache_ttl: Duration::from_millis(300_000),
            warmup_retry_delay: Duration::from_millis(500),
        }
    }
}

/// Counters describing one completed cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub devices: usize,
    pub batch_stored: usize,
    pub batch_skipped: usize,
    pub batch_envelope_rejected: bool,
    pub latest_stored: usize,
    pub latest_empty: usize,
    pub latest_skipped: usize,
    pub latest_failed: usize,
    pub duration: Duration,
}

/// One unit of scheduled work
#[async_trait]
pub trait SyncCycle: Send + Sync {
    async fn run_cycle(&self) -> DomainResult<CycleReport>;
}

/// Orchestrates warmup, device lookup, batch ingest and per-device latest ingest
pub struct SyncService {
    probe: Arc<dyn DatabaseProbe>,
    directory: DeviceDirectoryCache,
    upstream: Arc<dyn UpstreamTelemetryClient>,
    ingest: TelemetryIngestService,
    clock: Arc<dyn Clock>,
    config: SyncServiceConfig,
}

impl SyncService {
    pub fn new(
        probe: Arc<dyn DatabaseProbe>,
        directory: DeviceDirectoryCache,
        upstream: Arc<dyn UpstreamTelemetryClient>,
        ingest: TelemetryIngestService,
        clock: Arc<dyn Clock>,
        config: SyncServiceConfig,
    ) -> Self {
        Self {
            probe,
            directory,
            upstream,
            ingest,
            clock,
            config,
        }
    }

    async fn warm_up(&self) -> DomainResult<()> {
        retry_once_if_transient("database_warmup", self.config.warmup_retry_delay, || {
            self.probe.probe()
        })
        .await
    }

    fn batch_window(&self) -> DomainResult<FetchWindow> {
        let look_back = chrono::Duration::from_std(self.config.batch_window)
            .map_err(|e| DomainError::InvalidConfiguration(format!("batch window: {e}")))?;
        Ok(FetchWindow::ending_at(self.clock.now(), look_back))
    }

    /// Latest reads run one device at a time; the upstream allows a single
    /// concurrent request.
    async fn sync_latest(&self, devices: &[Device], report: &mut CycleReport) {
        for device in devices {
            let result = match self.upstream.fetch_latest(device).await {
                Ok(reading) => self.ingest.store_latest(device, &reading).await,
                Err(e) => Err(e),
            };

            match result {
                Ok(LatestStoreOutcome::Stored) => report.latest_stored += 1,
                Ok(LatestStoreOutcome::Empty) => report.latest_empty += 1,
                Ok(LatestStoreOutcome::Skipped(_)) => report.latest_skipped += 1,
                Err(e) => {
                    report.latest_failed += 1;
                    warn!(
                        device_id = %device.device_id,
                        error = %e,
                        "main stream latest sync failed for device"
                    );
                }
            }
        }
    }
}

#[async_trait]
impl SyncCycle for SyncService {
    #[instrument(skip(self))]
    async fn run_cycle(&self) -> DomainResult<CycleReport> {
        let started = Instant::now();

        self.warm_up().await?;

        let devices = self.directory.load(self.config.device_cache_ttl).await?;
        if devices.is_empty() {
            warn!("no main stream devices configured, skipping cycle");
            return Ok(CycleReport {
                duration: started.elapsed(),
                ..CycleReport::default()
            });
        }

        let window = self.batch_window()?;
        info!(
            devices = devices.len(),
            start = %window.start,
            end = %window.end,
            "fetching main stream batch"
        );

        let envelope = self.upstream.fetch_batch(&devices, window).await?;
        let batch = self.ingest.store_batch(&envelope).await?;

        let mut report = CycleReport {
            devices: devices.len(),
            batch_stored: batch.stored,
            batch_skipped: batch.skipped.len(),
            batch_envelope_rejected: batch.envelope_rejected,
            ..CycleReport::default()
        };

        self.sync_latest(&devices, &mut report).await;

        report.duration = started.elapsed();
        Ok(report)
    }
}
