use common::domain::{DomainError, DomainResult};
use deadpool_postgres::PoolError;
use std::future::Future;
use tokio_postgres::error::SqlState;
use std::io::ErrorKind;
use std::time::Duration;
use tracing::warn;

/// SQLSTATEs raised when the server drops or refuses the session (57P01..57P03)
const CONNECTION_LOST_SQLSTATES: [SqlState; 3] = [
    SqlState::ADMIN_SHUTDOWN,
    SqlState::CRASH_SHUTDOWN,
    SqlState::CANNOT_CONNECT_NOW,
];

const CONNECTION_LOST_MESSAGES: [&str; 2] = ["connection terminated", "connection closed"];

/// True if the error is a dropped or terminated database connection that an
/// immediate retry is expected to fix.
///
/// Only repository errors are inspected; upstream HTTP failures are never
/// transient here.
pub fn is_transient(error: &DomainError) -> bool {
    match error {
        DomainError::RepositoryError(err) => is_transient_chain(err),
        _ => false,
    }
}

fn is_transient_chain(error: &anyhow::Error) -> bool {
    error.chain().any(|cause| {
        if let Some(pool_err) = cause.downcast_ref::<PoolError>() {
            if is_transient_pool_error(pool_err) {
                return true;
            }
        }
        if let Some(pg_err) = cause.downcast_ref::<tokio_postgres::Error>() {
            if is_transient_postgres_error(pg_err) {
                return true;
            }
        }
        if let Some(io_err) = cause.downcast_ref::<std::io::Error>() {
            if is_transient_io_error(io_err) {
                return true;
            }
        }
        message_signals_lost_connection(&cause.to_string())
    })
}

fn is_transient_pool_error(error: &PoolError) -> bool {
    match error {
        PoolError::Timeout(_) => true,
        PoolError::Backend(pg_err) => is_transient_postgres_error(pg_err),
        _ => false,
    }
}

fn is_transient_postgres_error(error: &tokio_postgres::Error) -> bool {
    if error.is_closed() {
        return true;
    }
    if let Some(db_err) = error.as_db_error() {
        return is_connection_lost_sqlstate(db_err.code());
    }
    message_signals_lost_connection(&error.to_string())
}

fn is_connection_lost_sqlstate(code: &SqlState) -> bool {
    CONNECTION_LOST_SQLSTATES.contains(code)
}

fn is_transient_io_error(error: &std::io::Error) -> bool {
    matches!(
        error.kind(),
        ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::TimedOut
    )
}

fn message_signals_lost_connection(message: &str) -> bool {
    let message = message.to_lowercase();
    CONNECTION_LOST_MESSAGES
        .iter()
        .any(|needle| message.contains(needle))
}

/// Run `operation`; if it fails transiently, sleep `delay` and run it exactly
/// once more. Any other failure, or a second failure, is returned.
pub async fn retry_once_if_transient<T, F, Fut>(
    operation_name: &str,
    delay: Duration,
    mut operation: F,
) -> DomainResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = DomainResult<T>>,
{
    match operation().await {
        Ok(value) => Ok(value),
        Err(err) if is_transient(&err) => {
            warn!(
                operation = operation_name,
                error = %err,
                delay_ms = delay.as_millis() as u64,
                "transient database failure, retrying once"
            );
            tokio::time::sleep(delay).await;
            operation().await
        }
        Err(err) => Err(err),
    }
}
