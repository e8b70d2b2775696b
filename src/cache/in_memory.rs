//! In-memory cache implementation backed by moka.

use crate::error::Result;
use crate::traits::cache::Cache;
use async_trait::async_trait;
use moka::future::Cache as MokaCache;
use moka::Expiry;
use std::time::{Duration, Instant};

/// Default TTL for cache entries when none is specified (10 minutes).
///
/// Key sets rotate rarely; the per-entry TTL passed by the JWKS manager
/// normally overrides this.
const DEFAULT_TTL: Duration = Duration::from_secs(600);

/// Cache entry that stores the value with an optional custom TTL.
#[derive(Clone)]
struct CacheEntry {
    value: Vec<u8>,
    custom_ttl: Option<Duration>,
}

/// Expiry implementation that supports per-entry TTL.
struct CacheExpiry {
    default_ttl: Duration,
}

impl Expiry<String, CacheEntry> for CacheExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &CacheEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.custom_ttl.unwrap_or(self.default_ttl))
    }

    fn expire_after_read(
        &self,
        _key: &String,
        _value: &CacheEntry,
        _read_at: Instant,
        duration_until_expiry: Option<Duration>,
        _last_modified_at: Instant,
    ) -> Option<Duration> {
        // TTL, not TTI: reads never extend an entry's life
        duration_until_expiry
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &CacheEntry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.custom_ttl.unwrap_or(self.default_ttl))
    }
}

/// In-memory cache suitable for concurrent verification calls.
///
/// A refresh replaces the whole entry in a single `insert`, so readers either
/// see the previous key set or the new one, never a partial document.
///
/// # Example
///
/// ```rust,ignore
/// use lockgate::cache::InMemoryCache;
///
/// let cache = InMemoryCache::new(16);
/// ```
#[derive(Clone)]
pub struct InMemoryCache {
    inner: MokaCache<String, CacheEntry>,
}

impl InMemoryCache {
    /// Create a new in-memory cache with the specified maximum number of
    /// entries.
    ///
    /// One entry per environment is all the JWKS manager needs, but callers
    /// sharing the cache for their own values can size it up.
    pub fn new(max_entries: u64) -> Self {
        Self::with_ttl(max_entries, DEFAULT_TTL)
    }

    /// Create a cache with a custom default TTL.
    pub fn with_ttl(max_entries: u64, default_ttl: Duration) -> Self {
        let expiry = CacheExpiry { default_ttl };
        let cache = MokaCache::builder()
            .max_capacity(max_entries)
            .expire_after(expiry)
            .build();

        Self { inner: cache }
    }

    /// Run pending maintenance tasks (eviction, expiration).
    pub async fn run_pending_tasks(&self) {
        self.inner.run_pending_tasks().await;
    }

    /// Current number of entries in the cache.
    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new(16)
    }
}

#[async_trait]
impl Cache for InMemoryCache {
    async fn get_bytes(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.inner.get(key).await.map(|entry| entry.value))
    }

    async fn set_bytes(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        let entry = CacheEntry {
            value,
            custom_ttl: ttl,
        };
        self.inner.insert(key.to_string(), entry).await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.inner.remove(key).await;
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.inner.invalidate_all();
        self.inner.run_pending_tasks().await;
        Ok(())
    }
}
