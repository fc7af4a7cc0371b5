//! Retry utilities with exponential backoff and jitter.
//!
//! Used for re-delivering activities locally with at-least-once semantics.
//! Unlike a blind retry loop, [`retry_with_backoff`] stops on errors that
//! are not retryable and on cancellation of the supplied token.
//!
//! # Example
//!
//! ```ignore
//! use stratus::retry::{retry_with_backoff, RetryConfig};
//!
//! let result = retry_with_backoff(
//!     &RetryConfig::with_max_attempts(5),
//!     "create_storage_account",
//!     &token,
//!     |attempt| async move { activity.run(attempt).await },
//! ).await?;
//! ```

use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use crate::{Error, Result};

/// Configuration for operations that may fail transiently.
#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Maximum number of attempts (0 = infinite)
    pub max_attempts: u32,
    /// Initial delay between retries
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 0, // infinite
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Create a config with a maximum number of attempts
    pub fn with_max_attempts(attempts: u32) -> Self {
        Self {
            max_attempts: attempts,
            ..Default::default()
        }
    }

    /// Create a config that retries forever (until success, a permanent error or cancellation)
    pub fn infinite() -> Self {
        Self::default()
    }

    /// Delay before the next attempt, given the current one
    fn next_delay(&self, delay: Duration) -> Duration {
        Duration::from_secs_f64(
            (delay.as_secs_f64() * self.backoff_multiplier).min(self.max_delay.as_secs_f64()),
        )
    }
}

/// Execute an async operation with exponential backoff and jitter.
///
/// The operation receives the 1-based attempt number. Retries while the
/// returned error is retryable, up to `max_attempts` if set. Cancellation of
/// `token` during a backoff wait returns [`Error::Cancelled`].
pub async fn retry_with_backoff<F, Fut, T>(
    config: &RetryConfig,
    operation_name: &str,
    token: &CancellationToken,
    mut operation: F,
) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut attempt = 0u32;
    let mut delay = config.initial_delay;

    loop {
        attempt += 1;

        let e = match operation(attempt).await {
            Ok(result) => return Ok(result),
            Err(e) => e,
        };

        if !e.is_retryable() {
            warn!(
                operation = %operation_name,
                attempt = attempt,
                error = %e,
                "Operation failed permanently"
            );
            return Err(e);
        }

        if config.max_attempts > 0 && attempt >= config.max_attempts {
            error!(
                operation = %operation_name,
                attempt = attempt,
                error = %e,
                "Operation failed after max retries"
            );
            return Err(e);
        }

        // Add jitter: 0.5x to 1.5x of the delay
        let jitter = rand::thread_rng().gen_range(0.5..1.5);
        let jittered_delay = Duration::from_secs_f64(delay.as_secs_f64() * jitter);

        warn!(
            operation = %operation_name,
            attempt = attempt,
            error = %e,
            delay_ms = jittered_delay.as_millis(),
            "Operation failed, retrying"
        );

        tokio::select! {
            _ = token.cancelled() => {
                return Err(Error::cancelled(operation_name));
            }
            _ = tokio::time::sleep(jittered_delay) => {}
        }

        delay = config.next_delay(delay);
    }
}
