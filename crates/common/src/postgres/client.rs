use crate::domain::{DatabaseProbe, DomainError, DomainResult};
use crate::postgres::PostgresConfig;
use anyhow::Result;
use async_trait::async_trait;
use deadpool_postgres::{Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime};
use tokio_postgres::NoTls;
use tracing::debug;

/// PostgreSQL client wrapper with connection pooling
#[derive(Clone)]
pub struct PostgresClient {
    pool: Pool,
}

impl PostgresClient {
    /// Creates a new PostgreSQL client with connection pooling.
    ///
    /// Connection establishment and pool checkout are both bounded by
    /// `connect_timeout_ms`.
    pub fn new(config: &PostgresConfig) -> Result<Self> {
        let mut cfg = Config::new();
        cfg.host = Some(config.host.clone());
        cfg.port = Some(config.port);
        cfg.dbname = Some(config.database.clone());
        cfg.user = Some(config.username.clone());
        cfg.password = Some(config.password.clone());
        cfg.connect_timeout = Some(config.connect_timeout());
        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let mut pool_config = PoolConfig::new(config.max_pool_size);
        pool_config.timeouts.wait = Some(config.connect_timeout());
        pool_config.timeouts.create = Some(config.connect_timeout());
        cfg.pool = Some(pool_config);

        let pool = cfg.create_pool(Some(Runtime::Tokio1), NoTls)?;

        Ok(Self { pool })
    }

    /// Pings the database to verify connectivity
    pub async fn ping(&self) -> Result<()> {
        let client = self.pool.get().await?;
        client.execute("SELECT 1", &[]).await?;
        debug!("postgreSQL connection successful");
        Ok(())
    }

    /// Gets a connection from the pool
    pub async fn get_connection(&self) -> Result<deadpool_postgres::Client> {
        Ok(self.pool.get().await?)
    }
}

#[async_trait]
impl DatabaseProbe for PostgresClient {
    async fn probe(&self) -> DomainResult<()> {
        self.ping().await.map_err(DomainError::RepositoryError)
    }
}
