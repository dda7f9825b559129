use crate::domain::{
    DeviceDirectoryCache, DeviceDirectoryConfig, SyncScheduler, SyncService, SyncServiceConfig,
    TelemetryIngestService, TimestampNormalizer,
};
use crate::mainstream::{MainstreamClientConfig, MainstreamHttpClient};
use common::domain::{
    CacheEntryRepository, Clock, DatabaseProbe, DeviceRepository, DomainError, TelemetryRepository,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Debug, Clone)]
pub struct MainstreamWorkerConfig {
    pub base_url: String,
    pub request_timeout: Duration,
    pub sync_interval: Duration,
    pub batch_window: Duration,
    pub device_cache_ttl: Duration,
    pub device_cache_key: String,
    pub warmup_retry_delay: Duration,
    pub cache_retry_delay: Duration,
    pub upstream_naive_utc_offset_hours: i32,
    pub display_utc_offset_hours: i32,
}

/// Storage collaborators the worker reads and writes
pub struct MainstreamRepositories {
    pub probe: Arc<dyn DatabaseProbe>,
    pub devices: Arc<dyn DeviceRepository>,
    pub cache: Arc<dyn CacheEntryRepository>,
    pub telemetry: Arc<dyn TelemetryRepository>,
}

pub struct MainstreamWorker {
    scheduler: SyncScheduler,
}

impl MainstreamWorker {
    pub fn new(
        repositories: MainstreamRepositories,
        clock: Arc<dyn Clock>,
        config: MainstreamWorkerConfig,
    ) -> Result<Self, DomainError> {
        info!(base_url = %config.base_url, "Initializing main stream worker");

        if config.sync_interval.is_zero() {
            return Err(DomainError::InvalidConfiguration(
                "sync interval must be greater than zero".to_string(),
            ));
        }

        let normalizer = TimestampNormalizer::with_offsets(
            config.upstream_naive_utc_offset_hours,
            config.display_utc_offset_hours,
        )
        .ok_or_else(|| {
            DomainError::InvalidConfiguration(format!(
                "utc offsets out of range: naive {}h, display {}h",
                config.upstream_naive_utc_offset_hours, config.display_utc_offset_hours
            ))
        })?;

        let upstream = MainstreamHttpClient::new(MainstreamClientConfig {
            base_url: config.base_url.clone(),
            request_timeout: config.request_timeout,
        })?;

        let directory = DeviceDirectoryCache::new(
            repositories.devices,
            repositories.cache,
            clock.clone(),
            DeviceDirectoryConfig {
                cache_key: config.device_cache_key.clone(),
                retry_delay: config.cache_retry_delay,
            },
        );

        let ingest =
            TelemetryIngestService::new(repositories.telemetry, normalizer, clock.clone());

        let service = SyncService::new(
            repositories.probe,
            directory,
            Arc::new(upstream),
            ingest,
            clock,
            SyncServiceConfig {
                batch_window: config.batch_window,
                device_cache_ttl: config.device_cache_ttl,
                warmup_retry_delay: config.warmup_retry_delay,
            },
        );

        Ok(Self {
            scheduler: SyncScheduler::new(Arc::new(service), config.sync_interval),
        })
    }

    pub fn into_runner_process(
        self,
    ) -> Box<
        dyn FnOnce(
                CancellationToken,
            ) -> std::pin::Pin<
                Box<dyn std::future::Future<Output = anyhow::Result<()>> + Send>,
            > + Send,
    > {
        Box::new(move |ctx| {
            Box::pin(async move {
                self.scheduler.run(ctx).await;
                Ok(())
            })
        })
    }
}
