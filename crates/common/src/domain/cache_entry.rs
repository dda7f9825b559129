use crate::domain::result::DomainResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Entry of the generic expiring key/value cache table
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key: String,
    pub value: serde_json::Value,
    pub expires_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl CacheEntry {
    /// An entry without `expires_at` never expires
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(expires_at) if expires_at <= now)
    }
}

/// Repository input for writing a cache entry (insert or overwrite by key)
#[derive(Debug, Clone, PartialEq)]
pub struct PutCacheEntryRepoInput {
    pub key: String,
    pub value: serde_json::Value,
    pub expires_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// Repository trait for the key/value cache table
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait CacheEntryRepository: Send + Sync {
    /// Get an entry by key, regardless of expiry
    async fn get_entry(&self, key: &str) -> DomainResult<Option<CacheEntry>>;

    /// Insert the entry or overwrite the existing one with the same key
    async fn put_entry(&self, input: PutCacheEntryRepoInput) -> DomainResult<()>;
}
