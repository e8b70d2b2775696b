//! Transport trait for outbound key-set fetches.
//!
//! The SDK never implements HTTP itself; it decorates whatever send-request
//! capability the application injects. The bundled `HttpTransport` is a thin
//! reqwest adapter, and `BackoffTransport` wraps any `Transport` with bounded
//! exponential retry.

use async_trait::async_trait;

/// A response from the underlying transport.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    status: u16,
    body: Vec<u8>,
}

impl TransportResponse {
    pub fn new(status: u16, body: Vec<u8>) -> Self {
        Self { status, body }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn into_body(self) -> Vec<u8> {
        self.body
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Errors a transport can report.
///
/// The classification matters: the backoff decorator retries `Connection`,
/// `Timeout` and the retryable `Status` classes, and propagates `Rejected`
/// immediately without consuming retry budget.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// Network-level failure before a response was received.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The request did not complete within the attempt deadline.
    #[error("Request timed out")]
    Timeout,

    /// A non-success HTTP status was returned.
    #[error("Unexpected status {status}")]
    Status { status: u16 },

    /// The request itself was invalid (bad URL, unserializable body).
    /// Never retried.
    #[error("Request rejected: {0}")]
    Rejected(String),

    /// Emitted by the backoff decorator once its retry budget is spent.
    /// Carries the number of attempts made and the last underlying failure.
    #[error("Retry budget exhausted after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: String },
}

impl TransportError {
    /// Whether the failure is transient and safe to retry for a read-only
    /// request.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connection(_) | Self::Timeout => true,
            // Request timeout, rate limited, or server error class
            Self::Status { status } => *status == 408 || *status == 429 || (500..600).contains(status),
            Self::Rejected(_) | Self::Exhausted { .. } => false,
        }
    }
}

/// Trait for a basic send-request capability.
///
/// Only read-only GETs are needed here (key-set fetches), so the surface is a
/// single method. Implementations must be safe to call concurrently.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform a GET request against `url`.
    ///
    /// A non-2xx response should be reported as `TransportError::Status` so
    /// the caller can classify it for retry.
    async fn get(&self, url: &str) -> Result<TransportResponse, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(TransportError::Connection("refused".into()).is_retryable());
        assert!(TransportError::Timeout.is_retryable());
        assert!(TransportError::Status { status: 500 }.is_retryable());
        assert!(TransportError::Status { status: 503 }.is_retryable());
        assert!(TransportError::Status { status: 429 }.is_retryable());
        assert!(TransportError::Status { status: 408 }.is_retryable());

        assert!(!TransportError::Status { status: 404 }.is_retryable());
        assert!(!TransportError::Status { status: 401 }.is_retryable());
        assert!(!TransportError::Rejected("bad url".into()).is_retryable());
    }

    #[test]
    fn test_response_success() {
        assert!(TransportResponse::new(200, vec![]).is_success());
        assert!(TransportResponse::new(204, vec![]).is_success());
        assert!(!TransportResponse::new(301, vec![]).is_success());
        assert!(!TransportResponse::new(500, vec![]).is_success());
    }
}
