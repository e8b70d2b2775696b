//! reqwest-backed transport.

use crate::traits::transport::{Transport, TransportError, TransportResponse};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

/// Default connect timeout for the bundled client.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// The bundled `Transport` implementation.
///
/// A thin adapter over `reqwest`; the per-attempt deadline and retry policy
/// live in [`BackoffTransport`](super::BackoffTransport), not here.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self { client }
    }

    /// Use an existing reqwest client (shared pools, proxies, custom TLS).
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &str) -> Result<TransportResponse, TransportError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            return Err(TransportError::Status { status });
        }

        let body = response
            .bytes()
            .await
            .map_err(classify_reqwest_error)?
            .to_vec();

        Ok(TransportResponse::new(status, body))
    }
}

fn classify_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_builder() || err.is_request() {
        TransportError::Rejected(err.to_string())
    } else {
        TransportError::Connection(err.to_string())
    }
}
