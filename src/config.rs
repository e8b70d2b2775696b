use crate::error::{LockgateError, Result};
use std::time::Duration;
use url::Url;

/// Well-known path of the provider's key-set document, relative to the
/// environment's webhooks base URL.
const JWKS_PATH: &str = ".well-known/jwks";

/// Provider environment the SDK talks to.
///
/// Signing keys never cross environments: the key cache is scoped by this
/// value, so a sandbox key can never validate a production webhook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Environment {
    Sandbox,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sandbox => "sandbox",
            Self::Production => "production",
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Retry behaviour for the backoff-capable transport.
///
/// Delays grow as `base_delay * 2^attempt` (plus jitter), capped at
/// `max_delay` per attempt and `max_total_delay` cumulatively. Each attempt
/// is additionally bounded by `attempt_timeout`.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retries after the initial attempt.
    pub max_retries: u32,
    /// Base delay for exponential backoff.
    pub base_delay: Duration,
    /// Maximum delay between attempts.
    pub max_delay: Duration,
    /// Maximum cumulative time spent waiting between attempts.
    pub max_total_delay: Duration,
    /// Deadline for a single attempt.
    pub attempt_timeout: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(10),
            max_total_delay: Duration::from_secs(30),
            attempt_timeout: Duration::from_secs(10),
        }
    }
}

impl RetryConfig {
    /// Create a new config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set maximum retry attempts.
    #[must_use]
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set base delay for exponential backoff.
    #[must_use]
    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Set maximum delay between attempts.
    #[must_use]
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set maximum cumulative wait across all attempts.
    #[must_use]
    pub fn max_total_delay(mut self, delay: Duration) -> Self {
        self.max_total_delay = delay;
        self
    }

    /// Set the per-attempt deadline.
    #[must_use]
    pub fn attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Delay before the given retry (0-indexed), without jitter.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let millis = (self.base_delay.as_millis() as u64)
            .saturating_mul(2_u64.saturating_pow(attempt));
        Duration::from_millis(millis).min(self.max_delay)
    }
}

/// Configuration for webhook verification.
///
/// Built through [`WebhookConfig::builder`]; construction validates that the
/// selected environment has a base URL.
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    pub environment: Environment,
    /// Base URL of the provider's webhooks surface for the selected
    /// environment; the key-set document lives under `.well-known/jwks`.
    pub webhooks_base_url: Url,
    /// How long a fetched key set stays cached.
    pub jwks_ttl: Duration,
    /// Tolerance applied to a declared issuance time, when the payload
    /// carries one. `None` disables the check.
    pub clock_skew_tolerance: Option<Duration>,
    /// Minimum interval between forced key-set refreshes triggered by
    /// unknown `kid`s. `Duration::ZERO` disables the guard.
    pub refresh_guard_interval: Duration,
    /// Retry behaviour for key-set fetches.
    pub retry: RetryConfig,
}

impl WebhookConfig {
    pub fn builder() -> WebhookConfigBuilder {
        WebhookConfigBuilder::new()
    }

    /// The environment's key-set endpoint.
    pub fn jwks_url(&self) -> String {
        let base = self.webhooks_base_url.as_str();
        if base.ends_with('/') {
            format!("{}{}", base, JWKS_PATH)
        } else {
            format!("{}/{}", base, JWKS_PATH)
        }
    }
}

/// Builder for [`WebhookConfig`].
pub struct WebhookConfigBuilder {
    environment: Environment,
    webhooks_base_url: Option<Url>,
    jwks_ttl: Duration,
    clock_skew_tolerance: Option<Duration>,
    refresh_guard_interval: Duration,
    retry: RetryConfig,
}

impl WebhookConfigBuilder {
    pub fn new() -> Self {
        Self {
            environment: Environment::Sandbox,
            webhooks_base_url: None,
            jwks_ttl: Duration::from_secs(600),
            clock_skew_tolerance: Some(Duration::from_secs(300)),
            refresh_guard_interval: Duration::from_secs(10),
            retry: RetryConfig::default(),
        }
    }

    /// Select the provider environment.
    #[must_use]
    pub fn environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    /// Set the webhooks base URL for the selected environment.
    #[must_use]
    pub fn webhooks_base_url(mut self, url: Url) -> Self {
        self.webhooks_base_url = Some(url);
        self
    }

    /// Set how long fetched key sets stay cached.
    #[must_use]
    pub fn jwks_ttl(mut self, ttl: Duration) -> Self {
        self.jwks_ttl = ttl;
        self
    }

    /// Set the issuance-time tolerance.
    #[must_use]
    pub fn clock_skew_tolerance(mut self, tolerance: Duration) -> Self {
        self.clock_skew_tolerance = Some(tolerance);
        self
    }

    /// Disable the issuance-time check entirely.
    #[must_use]
    pub fn no_issuance_check(mut self) -> Self {
        self.clock_skew_tolerance = None;
        self
    }

    /// Set the minimum interval between forced key-set refreshes.
    #[must_use]
    pub fn refresh_guard_interval(mut self, interval: Duration) -> Self {
        self.refresh_guard_interval = interval;
        self
    }

    /// Set retry behaviour for key-set fetches.
    #[must_use]
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn build(self) -> Result<WebhookConfig> {
        let webhooks_base_url = self.webhooks_base_url.ok_or_else(|| {
            LockgateError::config(format!(
                "no webhooks base URL configured for the {} environment",
                self.environment
            ))
        })?;

        if webhooks_base_url.cannot_be_a_base() {
            return Err(LockgateError::config(format!(
                "webhooks base URL '{}' cannot be used as a base",
                webhooks_base_url
            )));
        }

        Ok(WebhookConfig {
            environment: self.environment,
            webhooks_base_url,
            jwks_ttl: self.jwks_ttl,
            clock_skew_tolerance: self.clock_skew_tolerance,
            refresh_guard_interval: self.refresh_guard_interval,
            retry: self.retry,
        })
    }
}

impl Default for WebhookConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_url() -> Url {
        Url::parse("https://webhooks.sandbox.example-payments.com").unwrap()
    }

    #[test]
    fn test_jwks_url_joins_well_known_path() {
        let config = WebhookConfig::builder()
            .webhooks_base_url(base_url())
            .build()
            .unwrap();

        assert_eq!(
            config.jwks_url(),
            "https://webhooks.sandbox.example-payments.com/.well-known/jwks"
        );
    }

    #[test]
    fn test_jwks_url_with_trailing_slash() {
        let config = WebhookConfig::builder()
            .webhooks_base_url(Url::parse("https://webhooks.example.com/hooks/").unwrap())
            .build()
            .unwrap();

        assert_eq!(
            config.jwks_url(),
            "https://webhooks.example.com/hooks/.well-known/jwks"
        );
    }

    #[test]
    fn test_build_requires_base_url() {
        let result = WebhookConfig::builder()
            .environment(Environment::Production)
            .build();

        let err = result.unwrap_err();
        assert!(matches!(err, LockgateError::Config(_)));
        assert!(err.to_string().contains("production"));
    }

    #[test]
    fn test_defaults() {
        let config = WebhookConfig::builder()
            .webhooks_base_url(base_url())
            .build()
            .unwrap();

        assert_eq!(config.environment, Environment::Sandbox);
        assert_eq!(config.jwks_ttl, Duration::from_secs(600));
        assert_eq!(config.clock_skew_tolerance, Some(Duration::from_secs(300)));
        assert_eq!(config.refresh_guard_interval, Duration::from_secs(10));
        assert_eq!(config.retry.max_retries, 3);
    }

    #[test]
    fn test_retry_delay_growth_and_cap() {
        let retry = RetryConfig::new()
            .base_delay(Duration::from_millis(100))
            .max_delay(Duration::from_millis(500));

        assert_eq!(retry.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(retry.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(retry.delay_for_attempt(2), Duration::from_millis(400));
        assert_eq!(retry.delay_for_attempt(3), Duration::from_millis(500));
        assert_eq!(retry.delay_for_attempt(10), Duration::from_millis(500));
    }
}
