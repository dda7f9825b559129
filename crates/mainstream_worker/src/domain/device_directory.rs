use crate::domain::retry_once_if_transient;
use common::domain::{
    CacheEntryRepository, Clock, Device, DeviceRepository, DomainError, DomainResult,
    PutCacheEntryRepoInput,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Cache key under which the device list is stored
pub const DEFAULT_DEVICE_CACHE_KEY: &str = "main_stream_devices";

#[derive(Debug, Clone)]
pub struct DeviceDirectoryConfig {
    pub cache_key: String,
    /// Delay before the single retry after a transient database failure
    pub retry_delay: Duration,
}

impl Default for DeviceDirectoryConfig {
    fn default() -> Self {
        Self {
            cache_key: DEFAULT_DEVICE_CACHE_KEY.to_string(),
            retry_delay: Duration::from_millis(1000),
        }
    }
}

/// Cache-aside view of the device registry.
///
/// Reads the list from the key/value cache while the entry is fresh and
/// well-formed; otherwise reloads it from the registry and overwrites the
/// entry with a new expiry.
pub struct DeviceDirectoryCache {
    device_repository: Arc<dyn DeviceRepository>,
    cache_repository: Arc<dyn CacheEntryRepository>,
    clock: Arc<dyn Clock>,
    config: DeviceDirectoryConfig,
}

impl DeviceDirectoryCache {
    pub fn new(
        device_repository: Arc<dyn DeviceRepository>,
        cache_repository: Arc<dyn CacheEntryRepository>,
        clock: Arc<dyn Clock>,
        config: DeviceDirectoryConfig,
    ) -> Self {
        Self {
            device_repository,
            cache_repository,
            clock,
            config,
        }
    }

    /// Load the device list, retrying once on a transient database failure
    #[instrument(skip(self), fields(cache_key = %self.config.cache_key))]
    pub async fn load(&self, ttl: Duration) -> DomainResult<Vec<Device>> {
        retry_once_if_transient("device_directory_load", self.config.retry_delay, || {
            self.load_once(ttl)
        })
        .await
    }

    async fn load_once(&self, ttl: Duration) -> DomainResult<Vec<Device>> {
        if let Some(devices) = self.read_cached().await? {
            debug!(count = devices.len(), "device directory cache hit");
            return Ok(devices);
        }

        let devices = self.load_from_registry().await?;
        self.write_cache(&devices, ttl).await?;

        info!(count = devices.len(), "device directory reloaded from registry");
        Ok(devices)
    }

    /// `None` means miss: absent, expired or malformed
    async fn read_cached(&self) -> DomainResult<Option<Vec<Device>>> {
        let Some(entry) = self.cache_repository.get_entry(&self.config.cache_key).await? else {
            debug!("device directory cache entry absent");
            return Ok(None);
        };

        if entry.is_expired(self.clock.now()) {
            debug!(expires_at = ?entry.expires_at, "device directory cache entry expired");
            return Ok(None);
        }

        let devices = parse_cached_devices(&entry.value);
        if devices.is_none() {
            warn!("device directory cache entry malformed, reloading");
        }
        Ok(devices)
    }

    async fn load_from_registry(&self) -> DomainResult<Vec<Device>> {
        let rows = self.device_repository.list_device_rows().await?;
        let total = rows.len();
        let devices: Vec<Device> = rows.into_iter().filter_map(|row| row.into_device()).collect();

        if devices.len() < total {
            debug!(
                dropped = total - devices.len(),
                "ignored registry rows missing deviceId, deviceKey or monitorItem"
            );
        }
        Ok(devices)
    }

    async fn write_cache(&self, devices: &[Device], ttl: Duration) -> DomainResult<()> {
        let now = self.clock.now();
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| DomainError::InvalidConfiguration(format!("cache ttl: {e}")))?;

        self.cache_repository
            .put_entry(PutCacheEntryRepoInput {
                key: self.config.cache_key.clone(),
                value: json!({ "devices": devices }),
                expires_at: Some(now + ttl),
                updated_at: now,
            })
            .await
    }
}

/// Every element must be a complete device, otherwise the whole entry is rejected
fn parse_cached_devices(value: &serde_json::Value) -> Option<Vec<Device>> {
    let raw = value.get("devices")?.as_array()?;
    let devices: Vec<Device> = raw
        .iter()
        .filter_map(|item| serde_json::from_value::<Device>(item.clone()).ok())
        .filter(Device::is_complete)
        .collect();

    (devices.len() == raw.len()).then_some(devices)
}
