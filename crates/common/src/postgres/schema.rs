use crate::postgres::PostgresClient;
use anyhow::Result;
use tracing::info;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS devices (
    id SERIAL PRIMARY KEY,
    "deviceId" VARCHAR(255) UNIQUE,
    "deviceKey" VARCHAR(255),
    "monitorItem" VARCHAR(255),
    "customName" VARCHAR(255),
    "deviceName" VARCHAR(255),
    warning_level INTEGER NOT NULL DEFAULT 0,
    latitude VARCHAR(100),
    longitude VARCHAR(100)
);

CREATE TABLE IF NOT EXISTS device_data (
    id SERIAL PRIMARY KEY,
    "deviceId" VARCHAR(255),
    "monitorItem" VARCHAR(255),
    "monitorTime" VARCHAR(100),
    "monitorValue" VARCHAR(100),
    CONSTRAINT unique_device_time UNIQUE ("deviceId", "monitorTime")
);

CREATE TABLE IF NOT EXISTS cache_entries (
    key TEXT PRIMARY KEY,
    value JSONB NOT NULL,
    expires_at TIMESTAMPTZ,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
"#;

/// Creates the device, telemetry and cache tables if they are missing.
///
/// The schema normally belongs to the device-management service; this exists
/// for local development and integration tests.
pub async fn ensure_schema(client: &PostgresClient) -> Result<()> {
    let conn = client.get_connection().await?;
    conn.batch_execute(SCHEMA).await?;
    info!("postgres schema ensured");
    Ok(())
}
