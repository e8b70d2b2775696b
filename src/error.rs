use std::fmt;

/// The main error type for lockgate operations.
///
/// Verification failures (`MalformedWebhook`, `UnsupportedAlgorithm`,
/// `KeyNotFound`, `SignatureInvalid`, `StaleTimestamp`) are terminal: they are
/// never retried internally, since retrying a forged or stale signature must
/// not be treated as a transient fault. Transport failures are retried by the
/// backoff layer before surfacing as `TransportExhausted`.
#[derive(Debug, thiserror::Error)]
pub enum LockgateError {
    /// The envelope is structurally invalid (segment count, encoding, JSON).
    #[error("Malformed webhook: {0}")]
    MalformedWebhook(String),

    /// The declared algorithm is not on the allow-list, or disagrees with the
    /// algorithm declared on the resolved key.
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// No key with the requested `kid` exists, even after the bounded refresh.
    #[error("Signing key '{0}' not found in key set")]
    KeyNotFound(String),

    /// The signature does not verify against the resolved key.
    #[error("Webhook signature verification failed")]
    SignatureInvalid,

    /// The declared issuance time is outside the clock-skew tolerance.
    #[error("Webhook issuance time outside tolerance: {0}")]
    StaleTimestamp(String),

    /// The retry budget was exhausted while fetching keys.
    #[error("Transport retry budget exhausted after {attempts} attempts: {last_error}")]
    TransportExhausted { attempts: u32, last_error: String },

    /// A non-retryable transport rejection (client-side error class).
    #[error("Transport request failed: {0}")]
    Transport(String),

    /// The provider returned a key-set document that cannot be accepted
    /// (unparseable, empty, missing or duplicate `kid`s). Any previously
    /// cached document stays in place.
    #[error("Malformed key set: {0}")]
    MalformedKeySet(String),

    /// The cache collaborator failed.
    #[error("Cache error: {0}")]
    Cache(String),

    /// One or more handlers failed during dispatch. Every matching handler
    /// ran before this was reported.
    #[error("{0}")]
    HandlerFailed(HandlerError),

    /// Invalid configuration passed to a builder.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl LockgateError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedWebhook(msg.into())
    }

    pub fn unsupported_algorithm(msg: impl Into<String>) -> Self {
        Self::UnsupportedAlgorithm(msg.into())
    }

    pub fn key_not_found(kid: impl Into<String>) -> Self {
        Self::KeyNotFound(kid.into())
    }

    pub fn cache(msg: impl Into<String>) -> Self {
        Self::Cache(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

/// Aggregated handler failures from a single dispatch.
///
/// Dispatch never aborts early: every matching handler runs, and whatever
/// failed is collected here so the caller sees all failures at once.
#[derive(Debug)]
pub struct HandlerError {
    failures: Vec<HandlerFailure>,
}

/// A single handler's failure, identified by its registration position.
#[derive(Debug)]
pub struct HandlerFailure {
    /// Zero-based registration index of the failing handler.
    pub handler_index: usize,
    /// Event type the handler was invoked with.
    pub event_type: String,
    /// The failure, as reported by the handler.
    pub error: String,
}

impl HandlerError {
    pub(crate) fn new(failures: Vec<HandlerFailure>) -> Self {
        debug_assert!(!failures.is_empty());
        Self { failures }
    }

    /// The individual failures, in handler registration order.
    pub fn failures(&self) -> &[HandlerFailure] {
        &self.failures
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} handler(s) failed during dispatch: ", self.failures.len())?;
        for (i, failure) in self.failures.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(
                f,
                "handler #{} for '{}': {}",
                failure.handler_index, failure.event_type, failure.error
            )?;
        }
        Ok(())
    }
}

impl std::error::Error for HandlerError {}

impl From<HandlerError> for LockgateError {
    fn from(err: HandlerError) -> Self {
        Self::HandlerFailed(err)
    }
}

/// Convenience type alias for Results with LockgateError
pub type Result<T> = std::result::Result<T, LockgateError>;
