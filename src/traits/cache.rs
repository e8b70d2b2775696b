//! Cache trait for key-value storage with TTL.
//!
//! Abstracts the key-set cache backend, allowing users to swap between the
//! bundled in-memory store and custom implementations backed by whatever
//! their application already runs.

use crate::error::{LockgateError, Result};
use async_trait::async_trait;
use std::time::Duration;

/// Cache trait for key-value storage with per-entry TTL.
///
/// Note: this trait uses type-erased serialization to be object-safe.
/// Use the `CacheExt` helpers `get` and `set` which handle serialization
/// internally.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Get a value from the cache as JSON bytes.
    ///
    /// Returns `Ok(None)` if the key doesn't exist or has expired.
    async fn get_bytes(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Set a value in the cache, replacing any existing entry wholesale.
    ///
    /// If `ttl` is `None` the backend's default TTL applies.
    async fn set_bytes(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()>;

    /// Delete a value from the cache.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Clear all values from the cache.
    async fn clear(&self) -> Result<()>;
}

/// Helper trait for type-safe cache operations.
///
/// Implementations use the object-safe `get_bytes` and `set_bytes` internally.
pub trait CacheExt: Cache {
    /// Get a value from the cache.
    async fn get<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: serde::de::DeserializeOwned,
    {
        if let Some(bytes) = self.get_bytes(key).await? {
            serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| LockgateError::cache(format!("Failed to deserialize: {}", e)))
        } else {
            Ok(None)
        }
    }

    /// Set a value in the cache.
    async fn set<T>(&self, key: &str, value: &T, ttl: Option<Duration>) -> Result<()>
    where
        T: serde::Serialize + Send + Sync,
    {
        let bytes = serde_json::to_vec(value)
            .map_err(|e| LockgateError::cache(format!("Failed to serialize: {}", e)))?;
        self.set_bytes(key, bytes, ttl).await
    }
}

// Blanket implementation - all Cache implementations get CacheExt for free
impl<T: Cache + ?Sized> CacheExt for T {}
