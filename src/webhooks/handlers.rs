//! Registration and dispatch of verified events to application callbacks.

use crate::error::{HandlerError, HandlerFailure, Result};
use crate::webhooks::verifier::VerifiedWebhookEvent;
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::sync::{Arc, RwLock};

/// Decides which event types a handler receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventMatcher {
    /// Matches one event type exactly, e.g. `payment_executed`.
    Exact(String),
    /// Matches every event type starting with the prefix, e.g. `payment_`.
    Prefix(String),
    /// Matches every event.
    Any,
}

impl EventMatcher {
    pub fn exact(event_type: impl Into<String>) -> Self {
        Self::Exact(event_type.into())
    }

    pub fn prefix(prefix: impl Into<String>) -> Self {
        Self::Prefix(prefix.into())
    }

    pub fn matches(&self, event_type: &str) -> bool {
        match self {
            Self::Exact(expected) => event_type == expected,
            Self::Prefix(prefix) => event_type.starts_with(prefix.as_str()),
            Self::Any => true,
        }
    }
}

/// Trait for handling verified webhook events.
///
/// Handlers only ever receive events that passed signature verification.
///
/// # Example
///
/// ```rust,ignore
/// use lockgate::webhooks::{WebhookHandler, VerifiedWebhookEvent};
///
/// struct PaymentExecutedHandler;
///
/// #[async_trait]
/// impl WebhookHandler for PaymentExecutedHandler {
///     async fn handle(&self, event: &VerifiedWebhookEvent) -> lockgate::Result<()> {
///         let payment_id = event.payload()["payment_id"].as_str();
///         // mark the payment settled
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait WebhookHandler: Send + Sync {
    async fn handle(&self, event: &VerifiedWebhookEvent) -> Result<()>;
}

type BoxedHandlerFn =
    Box<dyn Fn(VerifiedWebhookEvent) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Adapter turning a closure into a [`WebhookHandler`].
struct FnHandler {
    f: BoxedHandlerFn,
}

#[async_trait]
impl WebhookHandler for FnHandler {
    async fn handle(&self, event: &VerifiedWebhookEvent) -> Result<()> {
        (self.f)(event.clone()).await
    }
}

/// A matcher paired with its handler; dispatch order equals registration
/// order.
struct HandlerRegistration {
    matcher: EventMatcher,
    handler: Arc<dyn WebhookHandler>,
}

/// Registers handlers and dispatches verified events to them.
#[derive(Default)]
pub struct WebhookHandlerManager {
    registrations: RwLock<Vec<HandlerRegistration>>,
}

impl WebhookHandlerManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. Multiple handlers may match one event type.
    pub fn register(&self, matcher: EventMatcher, handler: Arc<dyn WebhookHandler>) {
        self.write_registrations()
            .push(HandlerRegistration { matcher, handler });
    }

    /// Register a closure as a handler.
    pub fn register_fn<F, Fut>(&self, matcher: EventMatcher, f: F)
    where
        F: Fn(VerifiedWebhookEvent) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<()>> + Send + 'static,
    {
        let handler = FnHandler {
            f: Box::new(move |event| Box::pin(f(event))),
        };
        self.register(matcher, Arc::new(handler));
    }

    /// Number of registered handlers.
    pub fn handler_count(&self) -> usize {
        self.read_registrations().len()
    }

    /// Invoke every matching handler, in registration order.
    ///
    /// A handler's failure is captured but does not stop the remaining
    /// handlers; once all have run, the captured failures are reported
    /// together. No matching handlers is not an error.
    pub async fn dispatch(&self, event: &VerifiedWebhookEvent) -> Result<()> {
        // Snapshot under the lock, await outside it.
        let matching: Vec<(usize, Arc<dyn WebhookHandler>)> = self
            .read_registrations()
            .iter()
            .enumerate()
            .filter(|(_, registration)| registration.matcher.matches(event.event_type()))
            .map(|(index, registration)| (index, registration.handler.clone()))
            .collect();

        let mut failures = Vec::new();
        for (handler_index, handler) in matching {
            if let Err(error) = handler.handle(event).await {
                tracing::error!(
                    event_type = event.event_type(),
                    handler_index = handler_index,
                    error = %error,
                    "Webhook handler failed"
                );
                failures.push(HandlerFailure {
                    handler_index,
                    event_type: event.event_type().to_string(),
                    error: error.to_string(),
                });
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(HandlerError::new(failures).into())
        }
    }

    fn read_registrations(&self) -> std::sync::RwLockReadGuard<'_, Vec<HandlerRegistration>> {
        self.registrations
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_registrations(&self) -> std::sync::RwLockWriteGuard<'_, Vec<HandlerRegistration>> {
        self.registrations
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LockgateError;
    use std::sync::Mutex;

    fn event(event_type: &str) -> VerifiedWebhookEvent {
        VerifiedWebhookEvent::new(
            event_type.to_string(),
            serde_json::json!({ "type": event_type }),
        )
    }

    /// Records invocation order; optionally fails.
    struct RecordingHandler {
        name: &'static str,
        fail: bool,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl WebhookHandler for RecordingHandler {
        async fn handle(&self, _event: &VerifiedWebhookEvent) -> Result<()> {
            self.log
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .push(self.name);
            if self.fail {
                Err(LockgateError::cache(format!("{} exploded", self.name)))
            } else {
                Ok(())
            }
        }
    }

    fn recording(
        name: &'static str,
        fail: bool,
        log: &Arc<Mutex<Vec<&'static str>>>,
    ) -> Arc<dyn WebhookHandler> {
        Arc::new(RecordingHandler {
            name,
            fail,
            log: log.clone(),
        })
    }

    #[test]
    fn test_matcher_semantics() {
        assert!(EventMatcher::exact("payment_executed").matches("payment_executed"));
        assert!(!EventMatcher::exact("payment_executed").matches("payment_failed"));

        assert!(EventMatcher::prefix("payment_").matches("payment_failed"));
        assert!(!EventMatcher::prefix("payment_").matches("payout_settled"));

        assert!(EventMatcher::Any.matches("anything_at_all"));
    }

    #[tokio::test]
    async fn test_dispatch_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let manager = WebhookHandlerManager::new();

        manager.register(EventMatcher::exact("payment_executed"), recording("first", false, &log));
        manager.register(EventMatcher::Any, recording("second", false, &log));
        manager.register(EventMatcher::prefix("payment_"), recording("third", false, &log));
        manager.register(EventMatcher::exact("payout_settled"), recording("skipped", false, &log));

        manager.dispatch(&event("payment_executed")).await.unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_failing_handler_does_not_stop_the_rest() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let manager = WebhookHandlerManager::new();

        manager.register(EventMatcher::Any, recording("first", false, &log));
        manager.register(EventMatcher::Any, recording("second", true, &log));
        manager.register(EventMatcher::Any, recording("third", false, &log));

        let err = manager.dispatch(&event("payment_executed")).await.unwrap_err();

        // All three ran despite the failure in the middle
        assert_eq!(*log.lock().unwrap(), vec!["first", "second", "third"]);

        match err {
            LockgateError::HandlerFailed(aggregate) => {
                assert_eq!(aggregate.len(), 1);
                assert_eq!(aggregate.failures()[0].handler_index, 1);
                assert!(aggregate.failures()[0].error.contains("second exploded"));
            }
            other => panic!("expected HandlerFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_all_failures_reported_together() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let manager = WebhookHandlerManager::new();

        manager.register(EventMatcher::Any, recording("a", true, &log));
        manager.register(EventMatcher::Any, recording("b", true, &log));

        let err = manager.dispatch(&event("x")).await.unwrap_err();
        match err {
            LockgateError::HandlerFailed(aggregate) => assert_eq!(aggregate.len(), 2),
            other => panic!("expected HandlerFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_no_matching_handlers_is_ok() {
        let manager = WebhookHandlerManager::new();
        manager.register(
            EventMatcher::exact("payment_executed"),
            recording("unused", false, &Arc::new(Mutex::new(Vec::new()))),
        );

        manager.dispatch(&event("payout_settled")).await.unwrap();
    }

    #[tokio::test]
    async fn test_register_fn_closure() {
        let manager = WebhookHandlerManager::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let seen_clone = seen.clone();
        manager.register_fn(EventMatcher::exact("payment_executed"), move |event| {
            let seen = seen_clone.clone();
            async move {
                seen.lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .push(event.event_type().to_string());
                Ok(())
            }
        });

        manager.dispatch(&event("payment_executed")).await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["payment_executed".to_string()]);
    }
}
