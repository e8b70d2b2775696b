//! Key-set fetching, caching, and selection.
//!
//! The provider publishes the public keys it signs webhooks with as a JWKS
//! document. `JwksManager` keeps one cached copy per environment and resolves
//! keys by `kid`, refetching at most once per lookup when an unknown `kid`
//! suggests the keys rotated.

use crate::config::WebhookConfig;
use crate::error::{LockgateError, Result};
use crate::traits::cache::{Cache, CacheExt};
use crate::traits::transport::{Transport, TransportError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// A single JSON Web Key as published by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    /// Key identifier linking an envelope header to this key.
    #[serde(default)]
    pub kid: String,
    /// Key type, e.g. `EC`.
    pub kty: String,
    /// Algorithm this key is declared for, e.g. `ES512`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
    /// Intended use, e.g. `sig`.
    #[serde(rename = "use", skip_serializing_if = "Option::is_none")]
    pub key_use: Option<String>,
    /// EC curve name, e.g. `P-521`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,
    /// EC x coordinate, base64url.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,
    /// EC y coordinate, base64url.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,
}

/// The provider's key-set document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwkSet {
    pub keys: Vec<Jwk>,
}

impl JwkSet {
    /// Find a key by key ID.
    pub fn find_by_kid(&self, kid: &str) -> Option<&Jwk> {
        self.keys.iter().find(|jwk| jwk.kid == kid)
    }
}

/// A fetched key set plus its fetch timestamp, as stored in the cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedJwks {
    pub jwks: JwkSet,
    pub fetched_at: DateTime<Utc>,
}

/// Fetches, caches, and selects signing keys by identifier.
///
/// The cache key embeds the environment, so sandbox and production key sets
/// never mix even when the application shares one cache backend. A refresh
/// stores a whole new document (single `set`, never a merge), so concurrent
/// readers observe either the previous set or the new one.
pub struct JwksManager {
    transport: Arc<dyn Transport>,
    cache: Arc<dyn Cache>,
    jwks_url: String,
    cache_key: String,
    ttl: Duration,
    refresh_guard_interval: Duration,
    last_forced_refresh: Mutex<Option<Instant>>,
}

impl JwksManager {
    /// The transport is expected to already be backoff-wrapped; this type
    /// performs no retries of its own.
    pub fn new(transport: Arc<dyn Transport>, cache: Arc<dyn Cache>, config: &WebhookConfig) -> Self {
        Self {
            transport,
            cache,
            jwks_url: config.jwks_url(),
            cache_key: format!("lockgate:jwks:{}", config.environment),
            ttl: config.jwks_ttl,
            refresh_guard_interval: config.refresh_guard_interval,
            last_forced_refresh: Mutex::new(None),
        }
    }

    /// Resolve a signing key by `kid`.
    ///
    /// Consults the cached key set first; on an unknown `kid` performs at
    /// most one forced refetch before failing with
    /// [`LockgateError::KeyNotFound`]. Forced refetches are rate-limited
    /// across calls so repeated unknown-`kid` webhooks cannot trigger a
    /// refresh storm.
    pub async fn get_key(&self, kid: &str) -> Result<Jwk> {
        if let Some(cached) = self.cache.get::<CachedJwks>(&self.cache_key).await? {
            if let Some(jwk) = cached.jwks.find_by_kid(kid) {
                tracing::debug!(kid = kid, "Resolved signing key from cached key set");
                return Ok(jwk.clone());
            }

            // Unknown kid with a live cache entry: the provider may have
            // rotated keys since the last fetch.
            if !self.forced_refresh_allowed().await {
                tracing::warn!(
                    kid = kid,
                    "Forced key-set refresh suppressed by rate guard"
                );
                return Err(LockgateError::key_not_found(kid));
            }

            tracing::debug!(kid = kid, "Unknown kid, forcing key-set refresh");
            let jwks = self.refresh().await?;
            return jwks
                .find_by_kid(kid)
                .cloned()
                .ok_or_else(|| LockgateError::key_not_found(kid));
        }

        // Nothing cached (cold start or TTL expiry): fetch without touching
        // the forced-refresh guard.
        tracing::debug!(kid = kid, "No cached key set, fetching");
        let jwks = self.refresh().await?;
        jwks.find_by_kid(kid)
            .cloned()
            .ok_or_else(|| LockgateError::key_not_found(kid))
    }

    /// Check the refresh-rate guard and, when a refresh is allowed, claim the
    /// slot before the fetch starts so racing callers cannot stampede.
    async fn forced_refresh_allowed(&self) -> bool {
        if self.refresh_guard_interval.is_zero() {
            return true;
        }

        let mut last = self.last_forced_refresh.lock().await;
        match *last {
            Some(at) if at.elapsed() < self.refresh_guard_interval => false,
            _ => {
                *last = Some(Instant::now());
                true
            }
        }
    }

    /// Fetch a fresh key set and replace the cache entry.
    ///
    /// Two callers racing here may both fetch; whichever write lands last
    /// stands, and neither can leave a partially updated document behind.
    async fn refresh(&self) -> Result<JwkSet> {
        let response = self
            .transport
            .get(&self.jwks_url)
            .await
            .map_err(map_transport_error)?;

        let jwks: JwkSet = serde_json::from_slice(response.body()).map_err(|e| {
            LockgateError::MalformedKeySet(format!("not a valid key-set document: {}", e))
        })?;

        validate_key_set(&jwks)?;

        let entry = CachedJwks {
            jwks: jwks.clone(),
            fetched_at: Utc::now(),
        };
        self.cache
            .set(&self.cache_key, &entry, Some(self.ttl))
            .await?;

        tracing::debug!(
            keys = jwks.keys.len(),
            url = %self.jwks_url,
            "Stored refreshed key set"
        );

        Ok(jwks)
    }
}

/// Reject documents that could poison the cache: an empty key list, keys
/// without an identifier, or colliding identifiers.
fn validate_key_set(jwks: &JwkSet) -> Result<()> {
    if jwks.keys.is_empty() {
        return Err(LockgateError::MalformedKeySet(
            "document contains no keys".to_string(),
        ));
    }

    let mut seen = std::collections::HashSet::new();
    for jwk in &jwks.keys {
        if jwk.kid.is_empty() {
            return Err(LockgateError::MalformedKeySet(
                "key without a kid".to_string(),
            ));
        }
        if !seen.insert(jwk.kid.as_str()) {
            return Err(LockgateError::MalformedKeySet(format!(
                "duplicate kid '{}'",
                jwk.kid
            )));
        }
    }

    Ok(())
}

fn map_transport_error(err: TransportError) -> LockgateError {
    match err {
        TransportError::Exhausted {
            attempts,
            last_error,
        } => LockgateError::TransportExhausted {
            attempts,
            last_error,
        },
        other => LockgateError::Transport(other.to_string()),
    }
}
