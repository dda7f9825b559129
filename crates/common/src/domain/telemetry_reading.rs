use crate::domain::result::DomainResult;
use async_trait::async_trait;

/// One stored telemetry row.
///
/// `(device_id, monitor_time)` is the natural key; `monitor_time` is already
/// normalized to the display timezone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryReading {
    pub device_id: String,
    pub monitor_item: String,
    pub monitor_time: String,
    pub monitor_value: String,
}

/// Repository trait for telemetry storage
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait TelemetryRepository: Send + Sync {
    /// Upsert readings keyed by `(device_id, monitor_time)`.
    ///
    /// On conflict only `monitor_value` is overwritten. Callers must not pass
    /// two readings with the same key in one call.
    /// Returns the number of affected rows.
    async fn upsert_readings(&self, readings: Vec<TelemetryReading>) -> DomainResult<u64>;
}
