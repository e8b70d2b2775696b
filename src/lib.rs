//! Lockgate - webhook trust verification for payment-provider webhooks
//!
//! Lockgate is the inbound-trust subsystem of a payments SDK: it fetches and
//! caches the provider's signing keys (JWKS), cryptographically verifies each
//! webhook's signed envelope against them, and dispatches verified events to
//! application-registered handlers.
//!
//! # Features
//!
//! - **Verification**: ES256/ES384/ES512 envelope verification with a fixed
//!   algorithm allow-list and clock-skew tolerance
//! - **Key management**: per-environment JWKS caching with TTL, bounded
//!   rotation refresh, and a refresh-rate guard
//! - **Resilient fetches**: exponential backoff with attempt and cumulative
//!   wait bounds around any injected transport
//! - **Dispatch**: ordered handlers with collected (never swallowed) failures
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use lockgate::{Environment, EventMatcher, Webhook};
//! use url::Url;
//!
//! #[tokio::main]
//! async fn main() -> lockgate::Result<()> {
//!     let webhook = Webhook::builder()
//!         .environment(Environment::Sandbox)
//!         .webhooks_base_url(Url::parse("https://webhooks.sandbox.acmepay.com").unwrap())
//!         .build()?;
//!
//!     webhook.on_fn(EventMatcher::exact("payment_executed"), |event| async move {
//!         println!("payment executed: {}", event.payload()["payment_id"]);
//!         Ok(())
//!     });
//!
//!     // From your HTTP endpoint:
//!     let raw_token = "<three-segment signed token>";
//!     let event = webhook.handle(raw_token).await?;
//!     println!("verified {} at {}", event.event_type(), event.verified_at());
//!     Ok(())
//! }
//! ```

#![allow(async_fn_in_trait)] // async_trait macro handles Send/Sync bounds properly

pub mod cache;
mod config;
mod error;
pub mod jwks;
pub mod traits;
pub mod transport;
pub mod webhooks;

// Re-exports for public API
pub use cache::{InMemoryCache, NoOpCache};
pub use config::{Environment, RetryConfig, WebhookConfig, WebhookConfigBuilder};
pub use error::{HandlerError, HandlerFailure, LockgateError, Result};
pub use jwks::{CachedJwks, Jwk, JwkSet, JwksManager};
pub use traits::cache::{Cache, CacheExt};
pub use traits::transport::{Transport, TransportError, TransportResponse};
pub use transport::{BackoffTransport, HttpTransport};
pub use webhooks::{
    EventMatcher, SignatureAlgorithm, VerifiedWebhookEvent, Webhook, WebhookBuilder,
    WebhookEnvelope, WebhookHandler, WebhookHandlerManager, WebhookVerifier,
};
