use serde::{Deserialize, Serialize};
use std::time::Duration;

/// PostgreSQL configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
    pub max_pool_size: usize,
    pub connect_timeout_ms: u64,
}

impl PostgresConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            database: "station".to_string(),
            username: "station".to_string(),
            password: "station".to_string(),
            max_pool_size: 10,
            connect_timeout_ms: 10_000,
        }
    }
}
