#![cfg(feature = "integration-tests")]

use chrono::{Duration, TimeZone, Utc};
use common::domain::{
    CacheEntryRepository, DatabaseProbe, DeviceRepository, PutCacheEntryRepoInput,
    TelemetryReading, TelemetryRepository,
};
use common::postgres::{
    ensure_schema, PostgresCacheEntryRepository, PostgresClient, PostgresConfig,
    PostgresDeviceRepository, PostgresTelemetryRepository,
};
use serde_json::json;
use testcontainers::runners::AsyncRunner;
use testcontainers::ContainerAsync;
use testcontainers_modules::postgres::Postgres;

async fn setup_test_db() -> (ContainerAsync<Postgres>, PostgresClient) {
    let postgres = Postgres::default().start().await.unwrap();
    let host = postgres.get_host().await.unwrap();
    let port = postgres.get_host_port_ipv4(5432).await.unwrap();

    let client = PostgresClient::new(&PostgresConfig {
        host: host.to_string(),
        port,
        database: "postgres".to_string(),
        username: "postgres".to_string(),
        password: "postgres".to_string(),
        max_pool_size: 5,
        connect_timeout_ms: 10_000,
    })
    .expect("Failed to create client");

    ensure_schema(&client).await.expect("Schema creation failed");
    // second run must be a no-op
    ensure_schema(&client).await.expect("Schema re-creation failed");

    (postgres, client)
}

fn reading(device_id: &str, monitor_time: &str, value: &str) -> TelemetryReading {
    TelemetryReading {
        device_id: device_id.to_string(),
        monitor_item: "PM25".to_string(),
        monitor_time: monitor_time.to_string(),
        monitor_value: value.to_string(),
    }
}

async fn stored_rows(client: &PostgresClient) -> Vec<(String, String, String, String)> {
    let conn = client.get_connection().await.unwrap();
    conn.query(
        r#"SELECT "deviceId", "monitorItem", "monitorTime", "monitorValue"
         FROM device_data
         ORDER BY "deviceId", "monitorTime""#,
        &[],
    )
    .await
    .unwrap()
    .iter()
    .map(|row| (row.get(0), row.get(1), row.get(2), row.get(3)))
    .collect()
}

#[tokio::test]
async fn test_probe_succeeds() {
    let (_container, client) = setup_test_db().await;
    client.probe().await.unwrap();
}

#[tokio::test]
async fn test_upsert_same_reading_twice_keeps_one_row() {
    let (_container, client) = setup_test_db().await;
    let repo = PostgresTelemetryRepository::new(client.clone());

    let batch = vec![reading("dev-1", "2024-05-01 09:00:00", "12")];
    repo.upsert_readings(batch.clone()).await.unwrap();
    repo.upsert_readings(batch).await.unwrap();

    let rows = stored_rows(&client).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].3, "12");
}

#[tokio::test]
async fn test_upsert_new_value_updates_in_place() {
    let (_container, client) = setup_test_db().await;
    let repo = PostgresTelemetryRepository::new(client.clone());

    repo.upsert_readings(vec![
        reading("dev-1", "2024-05-01 09:00:00", "12"),
        reading("dev-2", "2024-05-01 09:00:00", "30"),
    ])
    .await
    .unwrap();

    let mut changed = reading("dev-1", "2024-05-01 09:00:00", "13");
    changed.monitor_item = "PM10".to_string();
    let affected = repo.upsert_readings(vec![changed]).await.unwrap();
    assert_eq!(affected, 1);

    let rows = stored_rows(&client).await;
    assert_eq!(rows.len(), 2);
    // only the value is overwritten; the item of the first insert stays
    assert_eq!(
        rows[0],
        (
            "dev-1".to_string(),
            "PM25".to_string(),
            "2024-05-01 09:00:00".to_string(),
            "13".to_string()
        )
    );
    assert_eq!(rows[1].3, "30");
}

#[tokio::test]
async fn test_upsert_empty_batch_is_noop() {
    let (_container, client) = setup_test_db().await;
    let repo = PostgresTelemetryRepository::new(client.clone());

    assert_eq!(repo.upsert_readings(vec![]).await.unwrap(), 0);
    assert!(stored_rows(&client).await.is_empty());
}

#[tokio::test]
async fn test_cache_entry_put_get_and_overwrite() {
    let (_container, client) = setup_test_db().await;
    let repo = PostgresCacheEntryRepository::new(client);

    assert!(repo.get_entry("main_stream_devices").await.unwrap().is_none());

    let now = Utc.with_ymd_and_hms(2024, 5, 1, 2, 0, 0).unwrap();
    repo.put_entry(PutCacheEntryRepoInput {
        key: "main_stream_devices".to_string(),
        value: json!({ "devices": [] }),
        expires_at: Some(now + Duration::minutes(5)),
        updated_at: now,
    })
    .await
    .unwrap();

    let value = json!({ "devices": [
        { "deviceId": "dev-1", "deviceSecretKey": "s", "monitorItem": "PM25" }
    ]});
    repo.put_entry(PutCacheEntryRepoInput {
        key: "main_stream_devices".to_string(),
        value: value.clone(),
        expires_at: None,
        updated_at: now + Duration::minutes(1),
    })
    .await
    .unwrap();

    let entry = repo.get_entry("main_stream_devices").await.unwrap().unwrap();
    assert_eq!(entry.value, value);
    assert_eq!(entry.expires_at, None);
    assert_eq!(entry.updated_at, now + Duration::minutes(1));
    assert!(!entry.is_expired(now + Duration::days(365)));
}

#[tokio::test]
async fn test_device_rows_keep_nulls_in_registry_order() {
    let (_container, client) = setup_test_db().await;

    let conn = client.get_connection().await.unwrap();
    conn.batch_execute(
        r#"INSERT INTO devices ("deviceId", "deviceKey", "monitorItem") VALUES
           ('dev-2', 'key-2', 'PM10'),
           ('dev-1', NULL, 'PM25'),
           ('dev-3', 'key-3', 'NO2')"#,
    )
    .await
    .unwrap();

    let repo = PostgresDeviceRepository::new(client.clone());
    let rows = repo.list_device_rows().await.unwrap();

    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].device_id.as_deref(), Some("dev-2"));
    assert_eq!(rows[1].device_key, None);
    let complete: Vec<_> = rows.into_iter().filter_map(|row| row.into_device()).collect();
    assert_eq!(complete.len(), 2);
}
