mod config;

use common::domain::SystemClock;
use common::postgres::{
    ensure_schema, PostgresCacheEntryRepository, PostgresClient, PostgresConfig,
    PostgresDeviceRepository, PostgresTelemetryRepository,
};
use common::telemetry::{init_telemetry, shutdown_telemetry, TelemetryConfig, TelemetryProviders};
use config::ServiceConfig;
use mainstream_worker::mainstream_worker::{
    MainstreamRepositories, MainstreamWorker, MainstreamWorkerConfig,
};
use station_runner::Runner;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

#[tokio::main]
async fn main() {
    let config = match ServiceConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize telemetry (tracing + OpenTelemetry for traces and logs)
    let telemetry_providers: Option<TelemetryProviders> = match init_telemetry(&TelemetryConfig {
        service_name: config.otel_service_name.clone(),
        otel_endpoint: config.otel_endpoint.clone(),
        otel_enabled: config.otel_enabled,
        log_level: config.log_level.clone(),
    }) {
        Ok(providers) => providers,
        Err(e) => {
            eprintln!("Failed to initialize telemetry: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        otel_enabled = config.otel_enabled,
        otel_endpoint = %config.otel_endpoint,
        "Starting station-all-in-one service"
    );
    debug!(
        sync_interval_ms = config.sync_interval_ms,
        device_cache_ttl_ms = config.device_cache_ttl_ms,
        postgres_host = %config.postgres_host,
        postgres_database = %config.postgres_database,
        "Configuration loaded"
    );

    let Some(base_url) = config.mainstream_base_url().map(str::to_string) else {
        warn!("STATION_MAINSTREAM_URL is not set, main stream sync is disabled");
        shutdown_telemetry(telemetry_providers);
        return;
    };

    let postgres_client = match initialize_postgres(&config).await {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to initialize PostgreSQL: {:#}", e);
            shutdown_telemetry(telemetry_providers);
            std::process::exit(1);
        }
    };

    let worker = match MainstreamWorker::new(
        MainstreamRepositories {
            probe: Arc::new(postgres_client.clone()),
            devices: Arc::new(PostgresDeviceRepository::new(postgres_client.clone())),
            cache: Arc::new(PostgresCacheEntryRepository::new(postgres_client.clone())),
            telemetry: Arc::new(PostgresTelemetryRepository::new(postgres_client)),
        },
        Arc::new(SystemClock),
        worker_config(&config, base_url),
    ) {
        Ok(worker) => worker,
        Err(e) => {
            error!("Failed to initialize main stream worker: {}", e);
            shutdown_telemetry(telemetry_providers);
            std::process::exit(1);
        }
    };

    let runner = Runner::new()
        .with_named_process("mainstream_worker", worker.into_runner_process())
        .with_closer(move || {
            Box::pin(async move {
                info!("Running cleanup tasks...");
                // Shutdown telemetry and flush pending traces and logs
                shutdown_telemetry(telemetry_providers);
                Ok(())
            })
        })
        .with_closer_timeout(Duration::from_secs(config.shutdown_timeout_secs));

    runner.run().await;
}

async fn initialize_postgres(config: &ServiceConfig) -> anyhow::Result<PostgresClient> {
    info!("Initializing PostgreSQL...");
    let client = PostgresClient::new(&PostgresConfig {
        host: config.postgres_host.clone(),
        port: config.postgres_port,
        database: config.postgres_database.clone(),
        username: config.postgres_username.clone(),
        password: config.postgres_password.clone(),
        max_pool_size: config.postgres_max_pool_size,
        connect_timeout_ms: config.postgres_connect_timeout_ms,
    })?;

    if config.postgres_ensure_schema {
        ensure_schema(&client).await?;
    }
    Ok(client)
}

fn worker_config(config: &ServiceConfig, base_url: String) -> MainstreamWorkerConfig {
    MainstreamWorkerConfig {
        base_url,
        request_timeout: Duration::from_millis(config.mainstream_request_timeout_ms),
        sync_interval: Duration::from_millis(config.sync_interval_ms),
        batch_window: Duration::from_millis(config.batch_window_ms),
        device_cache_ttl: Duration::from_millis(config.device_cache_ttl_ms),
        device_cache_key: config.device_cache_key.clone(),
        warmup_retry_delay: Duration::from_millis(config.warmup_retry_delay_ms),
        cache_retry_delay: Duration::from_millis(config.cache_retry_delay_ms),
        upstream_naive_utc_offset_hours: config.upstream_naive_utc_offset_hours,
        display_utc_offset_hours: config.display_utc_offset_hours,
    }
}
