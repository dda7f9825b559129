use crate::domain::{DeviceRepository, DeviceRow, DomainError, DomainResult};
use crate::postgres::PostgresClient;
use async_trait::async_trait;
use tracing::{debug, instrument};

/// PostgreSQL implementation of DeviceRepository trait
#[derive(Clone)]
pub struct PostgresDeviceRepository {
    client: PostgresClient,
}

impl PostgresDeviceRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DeviceRepository for PostgresDeviceRepository {
    #[instrument(skip(self))]
    async fn list_device_rows(&self) -> DomainResult<Vec<DeviceRow>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let rows = conn
            .query(
                r#"SELECT "deviceId", "deviceKey", "monitorItem"
                 FROM devices
                 ORDER BY id"#,
                &[],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        let devices: Vec<DeviceRow> = rows
            .iter()
            .map(|row| DeviceRow {
                device_id: row.get(0),
                device_key: row.get(1),
                monitor_item: row.get(2),
            })
            .collect();

        debug!("found {} device rows in registry", devices.len());

        Ok(devices)
    }
}
