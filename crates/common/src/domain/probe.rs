use crate::domain::result::DomainResult;
use async_trait::async_trait;

/// Trivial round trip used to warm a database connection before a sync cycle
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait DatabaseProbe: Send + Sync {
    async fn probe(&self) -> DomainResult<()>;
}
