//! The webhook facade: one wired entry point for verification and dispatch.

use crate::cache::InMemoryCache;
use crate::config::{Environment, RetryConfig, WebhookConfig, WebhookConfigBuilder};
use crate::error::Result;
use crate::jwks::JwksManager;
use crate::traits::cache::Cache;
use crate::traits::transport::Transport;
use crate::transport::{BackoffTransport, HttpTransport};
use crate::webhooks::handlers::{EventMatcher, WebhookHandler, WebhookHandlerManager};
use crate::webhooks::verifier::{VerifiedWebhookEvent, WebhookVerifier};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Verifies inbound webhooks and dispatches the resulting events.
///
/// # Example
///
/// ```rust,ignore
/// use lockgate::{Environment, EventMatcher, Webhook};
/// use url::Url;
///
/// let webhook = Webhook::builder()
///     .environment(Environment::Sandbox)
///     .webhooks_base_url(Url::parse("https://webhooks.sandbox.acmepay.com")?)
///     .build()?;
///
/// webhook.on_fn(EventMatcher::exact("payment_executed"), |event| async move {
///     println!("payment {} settled", event.payload()["payment_id"]);
///     Ok(())
/// });
///
/// // In the receiving endpoint:
/// let event = webhook.handle(&raw_token).await?;
/// ```
pub struct Webhook {
    verifier: WebhookVerifier,
    handlers: WebhookHandlerManager,
}

impl std::fmt::Debug for Webhook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Webhook").finish_non_exhaustive()
    }
}

impl Webhook {
    /// Wire a facade from explicit dependencies.
    ///
    /// The given transport is wrapped in a [`BackoffTransport`] configured
    /// from `config.retry`; pass a pre-wrapped transport only if you want
    /// your own retry policy stacked instead. The cache may be shared with
    /// the rest of the application; entries are namespaced by environment.
    pub fn new(
        config: WebhookConfig,
        transport: Arc<dyn Transport>,
        cache: Arc<dyn Cache>,
    ) -> Self {
        let transport: Arc<dyn Transport> =
            Arc::new(BackoffTransport::new(transport, config.retry.clone()));
        let jwks = Arc::new(JwksManager::new(transport, cache, &config));
        let verifier = WebhookVerifier::new(jwks, config.clock_skew_tolerance);

        Self {
            verifier,
            handlers: WebhookHandlerManager::new(),
        }
    }

    pub fn builder() -> WebhookBuilder {
        WebhookBuilder::new()
    }

    /// Verify a raw webhook token without dispatching it.
    ///
    /// The call is time-bounded by the retry configuration (attempt count,
    /// per-attempt timeout, cumulative wait); wrap it in
    /// `tokio::time::timeout` for a hard overall deadline.
    pub async fn verify(&self, token: &str) -> Result<VerifiedWebhookEvent> {
        self.verifier.verify(token).await
    }

    /// Verify a raw webhook token, then dispatch the event to every matching
    /// handler. Returns the event once all handlers have run.
    pub async fn handle(&self, token: &str) -> Result<VerifiedWebhookEvent> {
        let event = self.verifier.verify(token).await?;
        self.handlers.dispatch(&event).await?;
        Ok(event)
    }

    /// Dispatch an already verified event.
    pub async fn dispatch(&self, event: &VerifiedWebhookEvent) -> Result<()> {
        self.handlers.dispatch(event).await
    }

    /// Register a handler for matching events.
    pub fn on(&self, matcher: EventMatcher, handler: Arc<dyn WebhookHandler>) {
        self.handlers.register(matcher, handler);
    }

    /// Register a closure for matching events.
    pub fn on_fn<F, Fut>(&self, matcher: EventMatcher, f: F)
    where
        F: Fn(VerifiedWebhookEvent) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<()>> + Send + 'static,
    {
        self.handlers.register_fn(matcher, f);
    }

    /// Number of registered handlers.
    pub fn handler_count(&self) -> usize {
        self.handlers.handler_count()
    }
}

/// Builder for [`Webhook`].
///
/// Collects configuration plus the two injectable collaborators; anything not
/// supplied falls back to the bundled implementations (reqwest transport,
/// in-memory cache).
pub struct WebhookBuilder {
    config: WebhookConfigBuilder,
    transport: Option<Arc<dyn Transport>>,
    cache: Option<Arc<dyn Cache>>,
}

impl WebhookBuilder {
    pub fn new() -> Self {
        Self {
            config: WebhookConfig::builder(),
            transport: None,
            cache: None,
        }
    }

    /// Select the provider environment.
    #[must_use]
    pub fn environment(mut self, environment: Environment) -> Self {
        self.config = self.config.environment(environment);
        self
    }

    /// Set the webhooks base URL for the selected environment.
    #[must_use]
    pub fn webhooks_base_url(mut self, url: Url) -> Self {
        self.config = self.config.webhooks_base_url(url);
        self
    }

    /// Set how long fetched key sets stay cached.
    #[must_use]
    pub fn jwks_ttl(mut self, ttl: Duration) -> Self {
        self.config = self.config.jwks_ttl(ttl);
        self
    }

    /// Set the issuance-time tolerance.
    #[must_use]
    pub fn clock_skew_tolerance(mut self, tolerance: Duration) -> Self {
        self.config = self.config.clock_skew_tolerance(tolerance);
        self
    }

    /// Disable the issuance-time check entirely.
    #[must_use]
    pub fn no_issuance_check(mut self) -> Self {
        self.config = self.config.no_issuance_check();
        self
    }

    /// Set the minimum interval between forced key-set refreshes.
    #[must_use]
    pub fn refresh_guard_interval(mut self, interval: Duration) -> Self {
        self.config = self.config.refresh_guard_interval(interval);
        self
    }

    /// Set retry behaviour for key-set fetches.
    #[must_use]
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.config = self.config.retry(retry);
        self
    }

    /// Inject a custom transport (it will still be backoff-wrapped).
    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Inject a custom cache backend.
    #[must_use]
    pub fn cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn build(self) -> Result<Webhook> {
        let config = self.config.build()?;
        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(HttpTransport::new()));
        let cache = self
            .cache
            .unwrap_or_else(|| Arc::new(InMemoryCache::default()));

        Ok(Webhook::new(config, transport, cache))
    }
}

impl Default for WebhookBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LockgateError;

    #[test]
    fn test_build_requires_base_url() {
        let result = Webhook::builder().environment(Environment::Production).build();
        assert!(matches!(result.unwrap_err(), LockgateError::Config(_)));
    }

    #[test]
    fn test_build_with_defaults() {
        let webhook = Webhook::builder()
            .webhooks_base_url(Url::parse("https://webhooks.sandbox.acmepay.com").unwrap())
            .build()
            .unwrap();

        assert_eq!(webhook.handler_count(), 0);
    }

    #[test]
    fn test_registration_through_facade() {
        let webhook = Webhook::builder()
            .webhooks_base_url(Url::parse("https://webhooks.sandbox.acmepay.com").unwrap())
            .build()
            .unwrap();

        webhook.on_fn(EventMatcher::Any, |_event| async { Ok(()) });
        webhook.on_fn(EventMatcher::exact("payment_executed"), |_event| async { Ok(()) });

        assert_eq!(webhook.handler_count(), 2);
    }
}
