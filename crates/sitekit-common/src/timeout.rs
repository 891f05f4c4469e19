//! Timeout utilities.

use std::future::Future;
use std::time::Duration;
use tracing::debug;

use crate::SiteKitError;

/// Run an operation with a timeout.
pub async fn with_timeout<T, F, Fut>(timeout: Duration, operation: F) -> Result<T, SiteKitError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = T>,
{
    tokio::time::timeout(timeout, operation()).await.map_err(|_| {
        debug!(?timeout, "Operation timed out");
        SiteKitError::Timeout(timeout)
    })
}

/// Like [`with_timeout`], but a `None` limit waits indefinitely.
pub async fn with_optional_timeout<T, F, Fut>(
    timeout: Option<Duration>,
    operation: F,
) -> Result<T, SiteKitError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = T>,
{
    match timeout {
        Some(limit) => with_timeout(limit, operation).await,
        None => Ok(operation().await),
    }
}
