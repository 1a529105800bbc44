//! Timeout helpers.

use std::future::Future;
use std::time::Duration;

/// Wait up to `duration` for `future`; on expiry resolve to `default` instead.
pub async fn with_timeout_or<T>(duration: Duration, future: impl Future<Output = T>, default: T) -> T {
    tokio::time::timeout(duration, future).await.unwrap_or(default)
}
