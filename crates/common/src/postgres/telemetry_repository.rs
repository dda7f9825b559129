use crate::domain::{DomainError, DomainResult, TelemetryReading, TelemetryRepository};
use crate::postgres::PostgresClient;
use async_trait::async_trait;
use tracing::{debug, instrument};

/// PostgreSQL implementation of TelemetryRepository trait
#[derive(Clone)]
pub struct PostgresTelemetryRepository {
    client: PostgresClient,
}

impl PostgresTelemetryRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TelemetryRepository for PostgresTelemetryRepository {
    #[instrument(skip(self, readings), fields(count = readings.len()))]
    async fn upsert_readings(&self, readings: Vec<TelemetryReading>) -> DomainResult<u64> {
        if readings.is_empty() {
            return Ok(0);
        }

        let mut device_ids = Vec::with_capacity(readings.len());
        let mut monitor_items = Vec::with_capacity(readings.len());
        let mut monitor_times = Vec::with_capacity(readings.len());
        let mut monitor_values = Vec::with_capacity(readings.len());
        for reading in readings {
            device_ids.push(reading.device_id);
            monitor_items.push(reading.monitor_item);
            monitor_times.push(reading.monitor_time);
            monitor_values.push(reading.monitor_value);
        }

        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let affected = conn
            .execute(
                r#"INSERT INTO device_data ("deviceId", "monitorItem", "monitorTime", "monitorValue")
                 SELECT * FROM UNNEST($1::varchar[], $2::varchar[], $3::varchar[], $4::varchar[])
                 ON CONFLICT ("deviceId", "monitorTime") DO UPDATE
                 SET "monitorValue" = EXCLUDED."monitorValue""#,
                &[&device_ids, &monitor_items, &monitor_times, &monitor_values],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        debug!("upserted {} telemetry rows", affected);
        Ok(affected)
    }
}
