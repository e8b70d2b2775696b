//! Exponential-backoff decorator for any transport.

use crate::config::RetryConfig;
use crate::traits::transport::{Transport, TransportError, TransportResponse};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Wraps a basic send-request capability with bounded exponential retry.
///
/// Transient failures (connection errors, timeouts, HTTP 408/429/5xx) are
/// retried with exponentially increasing, jittered delays, bounded by both a
/// maximum attempt count and a maximum cumulative wait. Non-retryable
/// client-side rejections propagate immediately without consuming retry
/// budget. Only safe-to-repeat operations go through this wrapper; key-set
/// fetches are read-only GETs.
///
/// # Example
///
/// ```rust,ignore
/// use lockgate::transport::{BackoffTransport, HttpTransport};
/// use lockgate::RetryConfig;
/// use std::sync::Arc;
///
/// let transport = BackoffTransport::new(Arc::new(HttpTransport::new()), RetryConfig::default());
/// ```
pub struct BackoffTransport {
    inner: Arc<dyn Transport>,
    config: RetryConfig,
}

impl BackoffTransport {
    pub fn new(inner: Arc<dyn Transport>, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    pub fn with_defaults(inner: Arc<dyn Transport>) -> Self {
        Self::new(inner, RetryConfig::default())
    }

    /// Jittered delay before the given retry (0-indexed).
    ///
    /// Jitter is applied before the per-delay cap so the sequence of delays
    /// stays non-decreasing.
    fn retry_delay(&self, attempt: u32) -> Duration {
        let delay = self.config.delay_for_attempt(attempt);
        let jitter = if delay.as_millis() > 0 {
            Duration::from_millis(fastrand::u64(0..=delay.as_millis() as u64 / 4))
        } else {
            Duration::ZERO
        };
        (delay + jitter).min(self.config.max_delay)
    }
}

#[async_trait]
impl Transport for BackoffTransport {
    async fn get(&self, url: &str) -> Result<TransportResponse, TransportError> {
        let mut attempts: u32 = 0;
        let mut total_delay = Duration::ZERO;

        loop {
            let result = tokio::time::timeout(self.config.attempt_timeout, self.inner.get(url)).await;
            attempts += 1;

            let error = match result {
                Ok(Ok(response)) => return Ok(response),
                Ok(Err(e)) => e,
                Err(_elapsed) => TransportError::Timeout,
            };

            if !error.is_retryable() {
                return Err(error);
            }

            if attempts > self.config.max_retries {
                return Err(TransportError::Exhausted {
                    attempts,
                    last_error: error.to_string(),
                });
            }

            let delay = self.retry_delay(attempts - 1);
            if total_delay + delay > self.config.max_total_delay {
                return Err(TransportError::Exhausted {
                    attempts,
                    last_error: error.to_string(),
                });
            }

            tracing::warn!(
                url = url,
                attempt = attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Retrying key-set fetch after transient failure"
            );

            tokio::time::sleep(delay).await;
            total_delay += delay;
        }
    }
}
