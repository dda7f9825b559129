use crate::domain::{
    CacheEntry, CacheEntryRepository, DomainError, DomainResult, PutCacheEntryRepoInput,
};
use crate::postgres::PostgresClient;
use async_trait::async_trait;
use tracing::{debug, instrument};

/// PostgreSQL implementation of CacheEntryRepository trait
#[derive(Clone)]
pub struct PostgresCacheEntryRepository {
    client: PostgresClient,
}

impl PostgresCacheEntryRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CacheEntryRepository for PostgresCacheEntryRepository {
    #[instrument(skip(self))]
    async fn get_entry(&self, key: &str) -> DomainResult<Option<CacheEntry>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let row = conn
            .query_opt(
                "SELECT key, value, expires_at, updated_at
                 FROM cache_entries
                 WHERE key = $1
                 LIMIT 1",
                &[&key],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        Ok(row.map(|row| CacheEntry {
            key: row.get(0),
            value: row.get(1),
            expires_at: row.get(2),
            updated_at: row.get(3),
        }))
    }

    #[instrument(skip(self, input), fields(key = %input.key))]
    async fn put_entry(&self, input: PutCacheEntryRepoInput) -> DomainResult<()> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        conn.execute(
            "INSERT INTO cache_entries (key, value, expires_at, updated_at)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (key) DO UPDATE
             SET value = EXCLUDED.value,
                 expires_at = EXCLUDED.expires_at,
                 updated_at = EXCLUDED.updated_at",
            &[
                &input.key,
                &input.value,
                &input.expires_at,
                &input.updated_at,
            ],
        )
        .await
        .map_err(|e| DomainError::RepositoryError(e.into()))?;

        debug!("cache entry written: {}", input.key);
        Ok(())
    }
}
