//! No-op cache backend.

use crate::error::Result;
use crate::traits::cache::Cache;
use async_trait::async_trait;
use std::time::Duration;

/// Cache backend that stores nothing.
///
/// Every verification call will fetch a fresh key set, so this is only
/// sensible in tests or behind an aggressive upstream cache.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpCache;

#[async_trait]
impl Cache for NoOpCache {
    async fn get_bytes(&self, _key: &str) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }

    async fn set_bytes(&self, _key: &str, _value: Vec<u8>, _ttl: Option<Duration>) -> Result<()> {
        Ok(())
    }

    async fn delete(&self, _key: &str) -> Result<()> {
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        Ok(())
    }
}
