//! Webhook trust verification and event dispatch.
//!
//! Inbound webhooks arrive as signed three-segment tokens. The pipeline is:
//! envelope parse → algorithm allow-list → key resolution (cached JWKS with
//! bounded refresh) → signature verification → payload decode → dispatch to
//! registered handlers. See [`Webhook`] for the composed entry point.

pub mod client;
pub mod envelope;
pub mod handlers;
pub mod verifier;

pub use client::{Webhook, WebhookBuilder};
pub use envelope::{EnvelopeHeader, WebhookEnvelope};
pub use handlers::{EventMatcher, WebhookHandler, WebhookHandlerManager};
pub use verifier::{SignatureAlgorithm, VerifiedWebhookEvent, WebhookVerifier};
