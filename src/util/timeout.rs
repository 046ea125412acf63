//! Timeout helper.

use std::future::Future;
use std::time::Duration;

use crate::error::classify::{classify, Outcome};
use crate::error::Result;

/// Wrap a future with a timeout, classified as `RequestTimeout`.
pub async fn with_timeout<T>(
    duration: Duration,
    future: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => Err(classify(Outcome::Timeout(duration))),
    }
}
