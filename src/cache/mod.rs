//! Bundled key-cache backends.
//!
//! The JWKS manager works against the [`Cache`](crate::traits::Cache) trait;
//! these are the in-process implementations shipped with the SDK. Anything
//! else (Redis, memcached, a database table) plugs in by implementing the
//! trait in the application.

mod in_memory;
mod noop;

pub use in_memory::InMemoryCache;
pub use noop::NoOpCache;
