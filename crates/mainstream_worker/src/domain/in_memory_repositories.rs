use async_trait::async_trait;
use common::domain::{
    CacheEntry, CacheEntryRepository, DatabaseProbe, DeviceRepository, DeviceRow, DomainResult,
    PutCacheEntryRepoInput, TelemetryReading, TelemetryRepository,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

/// Device registry with a fixed row set that counts reads
#[derive(Default)]
pub struct InMemoryDeviceRepository {
    rows: Vec<DeviceRow>,
    reads: AtomicUsize,
}

impl InMemoryDeviceRepository {
    pub fn new(rows: Vec<DeviceRow>) -> Self {
        Self {
            rows,
            reads: AtomicUsize::new(0),
        }
    }

    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeviceRepository for InMemoryDeviceRepository {
    async fn list_device_rows(&self) -> DomainResult<Vec<DeviceRow>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.rows.clone())
    }
}

#[derive(Default)]
pub struct InMemoryCacheEntryRepository {
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
}

impl InMemoryCacheEntryRepository {
    pub async fn entry(&self, key: &str) -> Option<CacheEntry> {
        self.entries.read().await.get(key).cloned()
    }
}

#[async_trait]
impl CacheEntryRepository for InMemoryCacheEntryRepository {
    async fn get_entry(&self, key: &str) -> DomainResult<Option<CacheEntry>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put_entry(&self, input: PutCacheEntryRepoInput) -> DomainResult<()> {
        let mut entries = self.entries.write().await;
        entries.insert(
            input.key.clone(),
            CacheEntry {
                key: input.key,
                value: input.value,
                expires_at: input.expires_at,
                updated_at: input.updated_at,
            },
        );
        Ok(())
    }
}

/// Keyed by `(device_id, monitor_time)` with the same overwrite rule as the table
#[derive(Default)]
pub struct InMemoryTelemetryRepository {
    rows: Arc<RwLock<BTreeMap<(String, String), TelemetryReading>>>,
}

impl InMemoryTelemetryRepository {
    pub async fn readings(&self) -> Vec<TelemetryReading> {
        self.rows.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl TelemetryRepository for InMemoryTelemetryRepository {
    async fn upsert_readings(&self, readings: Vec<TelemetryReading>) -> DomainResult<u64> {
        let mut rows = self.rows.write().await;
        let count = readings.len() as u64;
        for reading in readings {
            let key = (reading.device_id.clone(), reading.monitor_time.clone());
            match rows.get_mut(&key) {
                Some(existing) => existing.monitor_value = reading.monitor_value,
                None => {
                    rows.insert(key, reading);
                }
            }
        }
        Ok(count)
    }
}

#[derive(Default)]
pub struct NoopProbe;

#[async_trait]
impl DatabaseProbe for NoopProbe {
    async fn probe(&self) -> DomainResult<()> {
        Ok(())
    }
}
