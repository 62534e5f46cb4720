//! Bounded retry for idempotent reads

use crate::config::ApiConfig;
use crate::error::{is_transport_failure, Result};

use std::future::Future;
use std::time::Duration;

/// Retries an operation when it fails at the transport level
///
/// Backend answers, including error statuses, are returned at once. Only
/// failures that never produced a response are retried, with the delay
/// doubling after each attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts after the first one
    pub extra_attempts: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            extra_attempts: 2,
            base_delay: Duration::from_millis(200),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            extra_attempts: 0,
            base_delay: Duration::ZERO,
        }
    }

    /// Uses `api.read_retries` with the default base delay.
    pub fn from_api_config(config: &ApiConfig) -> Self {
        Self {
            extra_attempts: config.read_retries,
            ..Self::default()
        }
    }

    /// Runs `op`, retrying transport failures
    ///
    /// # Errors
    ///
    /// Returns the last error once attempts are exhausted, or the first
    /// non-transport error.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0u32;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.extra_attempts && is_transport_failure(&e) => {
                    let delay = self.base_delay.saturating_mul(2u32.saturating_pow(attempt));
                    attempt += 1;
                    tracing::warn!(
                        "{} failed ({}), retry {}/{} in {:?}",
                        what,
                        e,
                        attempt,
                        self.extra_attempts,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
