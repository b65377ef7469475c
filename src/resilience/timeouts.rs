//! Timeout enforcement.
//!
//! Every outbound call runs under a deadline. Expiry drops the in-flight
//! future, which releases any circuit permit it holds as a failure, and
//! surfaces as a retryable `Timeout` error.

use std::future::Future;
use std::time::Duration;

use crate::error::{GatewayError, GatewayResult};

pub async fn with_timeout<T, Fut>(limit: Duration, operation: Fut) -> GatewayResult<T>
where
    Fut: Future<Output = GatewayResult<T>>,
{
    match tokio::time::timeout(limit, operation).await {
        Ok(result) => result,
        Err(_) => Err(GatewayError::Timeout(limit)),
    }
}
