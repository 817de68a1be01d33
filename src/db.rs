use redis::aio::ConnectionManager;
use std::future::Future;
use std::time::Duration;
use crate::error::{AppError, Result};

/// Opens a Redis connection manager.
///
/// # Arguments
///
/// * `redis_url` - The URL of the Redis server.
/// * `timeout` - Upper bound for establishing the connection.
///
/// # Returns
///
/// A `Result` containing the `ConnectionManager`.
pub async fn connect_redis(redis_url: &str, timeout: Duration) -> Result<ConnectionManager> {
    let client = redis::Client::open(redis_url)?;
    let manager = with_timeout(timeout, async {
        ConnectionManager::new(client).await.map_err(AppError::from)
    })
    .await?;
    Ok(manager)
}

/// Runs a store call with an upper bound on its latency.
///
/// A call that does not finish in time is reported as `AppError::Timeout`
/// rather than left hanging.
pub async fn with_timeout<T, F>(timeout: Duration, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(AppError::Timeout(timeout)),
    }
}
