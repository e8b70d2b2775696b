//! Retry behaviour of the backoff transport against scripted failure
//! schedules. Uses tokio's paused clock so the inter-attempt delays can be
//! measured exactly.

use async_trait::async_trait;
use lockgate::{BackoffTransport, RetryConfig, Transport, TransportError, TransportResponse};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// Fails the first `failures` calls, then succeeds; records when each
/// attempt arrived (on the tokio clock).
struct FlakyServer {
    failures: u32,
    calls: AtomicU32,
    attempt_times: Mutex<Vec<Instant>>,
    error: fn() -> TransportError,
}

impl FlakyServer {
    fn new(failures: u32) -> Arc<Self> {
        Self::with_error(failures, || TransportError::Status { status: 502 })
    }

    fn with_error(failures: u32, error: fn() -> TransportError) -> Arc<Self> {
        Arc::new(Self {
            failures,
            calls: AtomicU32::new(0),
            attempt_times: Mutex::new(Vec::new()),
            error,
        })
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn gaps(&self) -> Vec<Duration> {
        let times = self.attempt_times.lock().unwrap();
        times.windows(2).map(|w| w[1] - w[0]).collect()
    }
}

#[async_trait]
impl Transport for FlakyServer {
    async fn get(&self, _url: &str) -> Result<TransportResponse, TransportError> {
        self.attempt_times.lock().unwrap().push(Instant::now());
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            Err((self.error)())
        } else {
            Ok(TransportResponse::new(200, b"{\"keys\":[]}".to_vec()))
        }
    }
}

fn config() -> RetryConfig {
    RetryConfig::new()
        .max_retries(3)
        .base_delay(Duration::from_millis(100))
        .max_delay(Duration::from_secs(5))
        .max_total_delay(Duration::from_secs(60))
}

#[tokio::test(start_paused = true)]
async fn succeeds_when_failures_stay_under_the_attempt_budget() {
    for failures in 0..=3 {
        let server = FlakyServer::new(failures);
        let transport = BackoffTransport::new(server.clone(), config());

        let response = transport.get("https://webhooks.test/jwks").await.unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(server.calls(), failures + 1);
    }
}

#[tokio::test(start_paused = true)]
async fn fails_with_exhausted_when_failures_reach_the_budget() {
    let server = FlakyServer::new(4);
    let transport = BackoffTransport::new(server.clone(), config());

    let err = transport.get("https://webhooks.test/jwks").await.unwrap_err();
    match err {
        TransportError::Exhausted {
            attempts,
            last_error,
        } => {
            assert_eq!(attempts, 4);
            assert!(last_error.contains("502"));
        }
        other => panic!("expected Exhausted, got {:?}", other),
    }
    assert_eq!(server.calls(), 4);
}

#[tokio::test(start_paused = true)]
async fn inter_attempt_delays_are_exponential_and_non_decreasing() {
    let server = FlakyServer::new(3);
    let transport = BackoffTransport::new(server.clone(), config());

    transport.get("https://webhooks.test/jwks").await.unwrap();

    let gaps = server.gaps();
    assert_eq!(gaps.len(), 3);

    let mut previous = Duration::ZERO;
    for (attempt, gap) in gaps.iter().enumerate() {
        let base = Duration::from_millis(100 * 2_u64.pow(attempt as u32));
        // exact backoff plus at most 25% jitter
        assert!(*gap >= base, "attempt {}: gap {:?} below base {:?}", attempt, gap, base);
        assert!(
            *gap <= base + base / 4,
            "attempt {}: gap {:?} above jitter ceiling",
            attempt,
            gap
        );
        assert!(*gap >= previous, "delays must never shrink");
        previous = *gap;
    }
}

#[tokio::test(start_paused = true)]
async fn client_errors_propagate_immediately() {
    let server = FlakyServer::with_error(10, || TransportError::Status { status: 403 });
    let transport = BackoffTransport::new(server.clone(), config());

    let started = Instant::now();
    let err = transport.get("https://webhooks.test/jwks").await.unwrap_err();

    assert!(matches!(err, TransportError::Status { status: 403 }));
    assert_eq!(server.calls(), 1);
    assert_eq!(started.elapsed(), Duration::ZERO, "no backoff sleep on fast-fail");
}

#[tokio::test(start_paused = true)]
async fn rejected_requests_propagate_immediately() {
    let server = FlakyServer::with_error(10, || TransportError::Rejected("bad url".into()));
    let transport = BackoffTransport::new(server.clone(), config());

    let err = transport.get("not a url").await.unwrap_err();
    assert!(matches!(err, TransportError::Rejected(_)));
    assert_eq!(server.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn cumulative_wait_budget_cuts_retries_short() {
    // Attempt budget alone would allow 6 retries; the cumulative wait
    // budget (250ms) stops after the second sleep (100ms + 200ms <= 250ms
    // fails already for the second).
    let retry = config()
        .max_retries(6)
        .max_total_delay(Duration::from_millis(250));
    let server = FlakyServer::new(10);
    let transport = BackoffTransport::new(server.clone(), retry);

    let err = transport.get("https://webhooks.test/jwks").await.unwrap_err();
    assert!(matches!(err, TransportError::Exhausted { .. }));
    assert!(
        server.calls() <= 3,
        "cumulative budget should stop retries early, got {} calls",
        server.calls()
    );
}

#[tokio::test(start_paused = true)]
async fn hung_attempts_hit_the_per_attempt_deadline_and_retry() {
    /// Never returns within the attempt deadline on the first call.
    struct HangingOnce {
        calls: AtomicU32,
    }

    #[async_trait]
    impl Transport for HangingOnce {
        async fn get(&self, _url: &str) -> Result<TransportResponse, TransportError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            Ok(TransportResponse::new(200, vec![]))
        }
    }

    let retry = config().attempt_timeout(Duration::from_millis(50));
    let server = Arc::new(HangingOnce {
        calls: AtomicU32::new(0),
    });
    let transport = BackoffTransport::new(server.clone(), retry);

    let response = transport.get("https://webhooks.test/jwks").await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(server.calls.load(Ordering::SeqCst), 2);
}
