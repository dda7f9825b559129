use crate::domain::{BatchEnvelope, LatestReading, NormalizeError, TimestampNormalizer};
use crate::mainstream::translate_message;
use common::domain::{Clock, Device, DomainResult, TelemetryReading, TelemetryRepository};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, instrument, warn};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    #[error(transparent)]
    InvalidTime(#[from] NormalizeError),

    #[error("Malformed record: {0}")]
    Malformed(String),
}

/// A record dropped without aborting the rest of its batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRecord {
    pub device_id: String,
    pub monitor_item: String,
    pub monitor_time: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchStoreReport {
    /// Rows handed to the repository after normalization and de-duplication
    pub stored: usize,
    pub skipped: Vec<SkippedRecord>,
    /// The envelope had no usable data array; nothing was written
    pub envelope_rejected: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LatestStoreOutcome {
    Stored,
    /// Value or time was empty
    Empty,
    Skipped(SkippedRecord),
}

/// Writes upstream telemetry idempotently, keyed by `(device_id, monitor_time)`
pub struct TelemetryIngestService {
    repository: Arc<dyn TelemetryRepository>,
    normalizer: TimestampNormalizer,
    clock: Arc<dyn Clock>,
}

impl TelemetryIngestService {
    pub fn new(
        repository: Arc<dyn TelemetryRepository>,
        normalizer: TimestampNormalizer,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repository,
            normalizer,
            clock,
        }
    }

    /// Flatten a batch envelope and upsert every row whose time normalizes.
    ///
    /// A missing or non-array `data` is logged and treated as zero rows. Items
    /// that do not decode or normalize are skipped one by one.
    #[instrument(skip(self, envelope))]
    pub async fn store_batch(&self, envelope: &BatchEnvelope) -> DomainResult<BatchStoreReport> {
        let Some(records) = envelope.device_records() else {
            let translated = envelope.message.as_deref().map(translate_message);
            warn!(
                code = ?envelope.code,
                status = ?envelope.status,
                translated_message = ?translated,
                "main stream payload missing data field"
            );
            return Ok(BatchStoreReport {
                envelope_rejected: true,
                ..BatchStoreReport::default()
            });
        };

        let now = self.clock.now();
        let mut readings = Vec::new();
        let mut skipped = Vec::new();

        for record in records {
            for malformed in record.malformed {
                let skip = SkippedRecord {
                    device_id: record.device_id.clone(),
                    monitor_item: malformed.monitor_item,
                    monitor_time: malformed.monitor_time,
                    reason: SkipReason::Malformed(malformed.error),
                };
                log_skip(&skip, "skipping malformed main stream record");
                skipped.push(skip);
            }
            for item in record.data {
                match self.normalizer.normalize(&item.monitor_time, now) {
                    Ok(monitor_time) => readings.push(TelemetryReading {
                        device_id: record.device_id.clone(),
                        monitor_item: item.monitor_item,
                        monitor_time,
                        monitor_value: item.monitor_value,
                    }),
                    Err(reason) => {
                        let skip = SkippedRecord {
                            device_id: record.device_id.clone(),
                            monitor_item: item.monitor_item,
                            monitor_time: item.monitor_time,
                            reason: reason.into(),
                        };
                        log_skip(&skip, "skipping main stream record due to invalid monitorTime");
                        skipped.push(skip);
                    }
                }
            }
        }

        let readings = collapse_duplicate_keys(readings);
        let stored = readings.len();
        if stored > 0 {
            self.repository.upsert_readings(readings).await?;
        }

        debug!(stored, skipped = skipped.len(), "batch stored");
        Ok(BatchStoreReport {
            stored,
            skipped,
            envelope_rejected: false,
        })
    }

    /// Upsert a device's latest reading; empty readings are a no-op
    #[instrument(skip(self, device, reading), fields(device_id = %device.device_id))]
    pub async fn store_latest(
        &self,
        device: &Device,
        reading: &LatestReading,
    ) -> DomainResult<LatestStoreOutcome> {
        if reading.is_empty() {
            debug!(code = reading.code, "latest reading empty, nothing to store");
            return Ok(LatestStoreOutcome::Empty);
        }

        let monitor_time = match self
            .normalizer
            .normalize(&reading.monitor_time, self.clock.now())
        {
            Ok(time) => time,
            Err(reason) => {
                let skip = SkippedRecord {
                    device_id: device.device_id.clone(),
                    monitor_item: device.monitor_item.clone(),
                    monitor_time: reading.monitor_time.clone(),
                    reason: reason.into(),
                };
                log_skip(
                    &skip,
                    "skipping latest main stream record due to invalid monitorTime",
                );
                return Ok(LatestStoreOutcome::Skipped(skip));
            }
        };

        self.repository
            .upsert_readings(vec![TelemetryReading {
                device_id: device.device_id.clone(),
                monitor_item: device.monitor_item.clone(),
                monitor_time,
                monitor_value: reading.monitor_value.clone(),
            }])
            .await?;

        Ok(LatestStoreOutcome::Stored)
    }
}

fn log_skip(skip: &SkippedRecord, message: &'static str) {
    warn!(
        device_id = %skip.device_id,
        monitor_item = %skip.monitor_item,
        monitor_time = %skip.monitor_time,
        error = %skip.reason,
        "{}",
        message
    );
}

/// Keep one reading per `(device_id, monitor_time)`, the last one winning,
/// in first-seen order. A single upsert statement cannot touch a key twice.
fn collapse_duplicate_keys(readings: Vec<TelemetryReading>) -> Vec<TelemetryReading> {
    let mut positions: HashMap<(String, String), usize> = HashMap::new();
    let mut collapsed: Vec<TelemetryReading> = Vec::with_capacity(readings.len());

    for reading in readings {
        let key = (reading.device_id.clone(), reading.monitor_time.clone());
        match positions.get(&key) {
            Some(&index) => collapsed[index] = reading,
            None => {
                positions.insert(key, collapsed.len());
                collapsed.push(reading);
            }
        }
    }
    collapsed
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use common::domain::{FixedClock, MockTelemetryRepository};
    use serde_json::json;

    fn service(repository: MockTelemetryRepository) -> TelemetryIngestService {
        TelemetryIngestService::new(
            Arc::new(repository),
            TimestampNormalizer::default(),
            Arc::new(FixedClock::new(
                Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap(),
            )),
        )
    }

    fn device() -> Device {
        Device {
            device_id: "dev-1".to_string(),
            device_secret_key: "secret".to_string(),
            monitor_item: "PM25".to_string(),
        }
    }

    fn envelope(data: serde_json::Value) -> BatchEnvelope {
        serde_json::from_value(json!({ "code": 200, "message": "ok", "data": data })).unwrap()
    }

    #[tokio::test]
    async fn test_store_batch_normalizes_and_skips_bad_times() {
        let mut repository = MockTelemetryRepository::new();
        repository
            .expect_upsert_readings()
            .withf(|readings: &Vec<TelemetryReading>| {
                readings.len() == 2
                    && readings[0].monitor_time == "2024-05-01 09:00:00"
                    && readings[1].device_id == "dev-2"
                    && readings[1].monitor_value == "7"
            })
            .times(1)
            .return_once(|_| Ok(2));

        let report = service(repository)
            .store_batch(&envelope(json!([
                { "deviceId": "dev-1", "data": [
                    { "monitorItem": "PM25", "monitorTime": "2024-05-01 10:00:00", "monitorValue": "12" },
                    { "monitorItem": "PM25", "monitorTime": "2024-02-30 10:00:00", "monitorValue": "13" }
                ]},
                { "deviceId": "dev-2", "data": [
                    { "monitorItem": "PM10", "monitorTime": "2024-05-01T03:00:00Z", "monitorValue": 7 }
                ]}
            ])))
            .await
            .unwrap();

        assert_eq!(report.stored, 2);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].monitor_time, "2024-02-30 10:00:00");
        assert_eq!(
            report.skipped[0].reason,
            SkipReason::InvalidTime(NormalizeError::InvalidCalendarDate(
                "2024-02-30 10:00:00".to_string()
            ))
        );
        assert!(!report.envelope_rejected);
    }

    #[tokio::test]
    async fn test_store_batch_keeps_siblings_of_undecodable_item() {
        let mut repository = MockTelemetryRepository::new();
        repository
            .expect_upsert_readings()
            .withf(|readings: &Vec<TelemetryReading>| {
                readings
                    == &vec![TelemetryReading {
                        device_id: "dev-1".to_string(),
                        monitor_item: "PM25".to_string(),
                        monitor_time: "2024-05-01 09:00:00".to_string(),
                        monitor_value: "1".to_string(),
                    }]
            })
            .times(1)
            .return_once(|_| Ok(1));

        let report = service(repository)
            .store_batch(&envelope(json!([
                { "deviceId": "dev-1", "data": [
                    { "monitorItem": "PM25", "monitorTime": "2024-05-01 10:00:00", "monitorValue": "1" }
                ]},
                { "deviceId": "dev-2", "data": [
                    { "monitorItem": "PM25", "monitorTime": null, "monitorValue": "2" }
                ]}
            ])))
            .await
            .unwrap();

        assert!(!report.envelope_rejected);
        assert_eq!(report.stored, 1);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].device_id, "dev-2");
        assert_eq!(report.skipped[0].monitor_item, "PM25");
        assert!(matches!(report.skipped[0].reason, SkipReason::Malformed(_)));
    }

    #[tokio::test]
    async fn test_store_batch_rejects_envelope_without_data() {
        let mut repository = MockTelemetryRepository::new();
        repository.expect_upsert_readings().times(0);

        let envelope: BatchEnvelope = serde_json::from_value(json!({
            "code": 500,
            "message": "当前ip并发查询限制为1次,每秒钟查询限制为1次,每分钟查询限制为10次,限制条件触发"
        }))
        .unwrap();

        let report = service(repository).store_batch(&envelope).await.unwrap();
        assert!(report.envelope_rejected);
        assert_eq!(report.stored, 0);
    }

    #[tokio::test]
    async fn test_store_batch_without_valid_rows_does_not_write() {
        let mut repository = MockTelemetryRepository::new();
        repository.expect_upsert_readings().times(0);

        let report = service(repository)
            .store_batch(&envelope(json!([
                { "deviceId": "dev-1", "data": [
                    { "monitorItem": "PM25", "monitorTime": "garbage", "monitorValue": "1" }
                ]}
            ])))
            .await
            .unwrap();

        assert_eq!(report.stored, 0);
        assert_eq!(report.skipped.len(), 1);
    }

    #[tokio::test]
    async fn test_store_batch_collapses_same_key_last_wins() {
        let mut repository = MockTelemetryRepository::new();
        repository
            .expect_upsert_readings()
            .withf(|readings: &Vec<TelemetryReading>| {
                readings.len() == 1 && readings[0].monitor_value == "second"
            })
            .times(1)
            .return_once(|_| Ok(1));

        // epoch seconds and the naive UTC+8 form denote the same instant
        let report = service(repository)
            .store_batch(&envelope(json!([
                { "deviceId": "dev-1", "data": [
                    { "monitorItem": "PM25", "monitorTime": "1714528800", "monitorValue": "first" },
                    { "monitorItem": "PM25", "monitorTime": "2024-05-01 10:00:00", "monitorValue": "second" }
                ]}
            ])))
            .await
            .unwrap();

        assert_eq!(report.stored, 1);
    }

    #[tokio::test]
    async fn test_store_latest_empty_is_noop() {
        let mut repository = MockTelemetryRepository::new();
        repository.expect_upsert_readings().times(0);
        let service = service(repository);

        let outcome = service
            .store_latest(&device(), &LatestReading::empty(503))
            .await
            .unwrap();
        assert_eq!(outcome, LatestStoreOutcome::Empty);

        let no_time = LatestReading {
            code: 200,
            monitor_value: "12".to_string(),
            monitor_time: String::new(),
        };
        let outcome = service.store_latest(&device(), &no_time).await.unwrap();
        assert_eq!(outcome, LatestStoreOutcome::Empty);
    }

    #[tokio::test]
    async fn test_store_latest_upserts_single_row() {
        let mut repository = MockTelemetryRepository::new();
        repository
            .expect_upsert_readings()
            .withf(|readings: &Vec<TelemetryReading>| {
                readings
                    == &vec![TelemetryReading {
                        device_id: "dev-1".to_string(),
                        monitor_item: "PM25".to_string(),
                        monitor_time: "2024-05-01 09:00:00".to_string(),
                        monitor_value: "12.5".to_string(),
                    }]
            })
            .times(1)
            .return_once(|_| Ok(1));

        let reading = LatestReading {
            code: 200,
            monitor_value: "12.5".to_string(),
            monitor_time: "2024-05-01 10:00:00".to_string(),
        };
        let outcome = service(repository)
            .store_latest(&device(), &reading)
            .await
            .unwrap();
        assert_eq!(outcome, LatestStoreOutcome::Stored);
    }

    #[tokio::test]
    async fn test_store_latest_skips_invalid_time() {
        let mut repository = MockTelemetryRepository::new();
        repository.expect_upsert_readings().times(0);

        let reading = LatestReading {
            code: 200,
            monitor_value: "12.5".to_string(),
            monitor_time: "not-a-time".to_string(),
        };
        let outcome = service(repository)
            .store_latest(&device(), &reading)
            .await
            .unwrap();
        assert!(matches!(outcome, LatestStoreOutcome::Skipped(_)));
    }

    #[test]
    fn test_collapse_keeps_first_position() {
        let reading = |id: &str, time: &str, value: &str| TelemetryReading {
            device_id: id.to_string(),
            monitor_item: "PM25".to_string(),
            monitor_time: time.to_string(),
            monitor_value: value.to_string(),
        };
        let collapsed = collapse_duplicate_keys(vec![
            reading("a", "t1", "1"),
            reading("b", "t1", "2"),
            reading("a", "t1", "3"),
        ]);
        assert_eq!(collapsed, vec![reading("a", "t1", "3"), reading("b", "t1", "2")]);
    }
}
