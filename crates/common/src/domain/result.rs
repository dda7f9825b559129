use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Upstream request failed: {0} {1}")]
    UpstreamRequestFailed(u16, String),

    #[error("Upstream transport error: {0}")]
    UpstreamTransport(String),

    #[error("Upstream response decode error: {0}")]
    UpstreamDecode(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Repository error: {0}")]
    RepositoryError(#[from] anyhow::Error),
}
