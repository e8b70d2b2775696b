//! Bundled transport implementations.
//!
//! `HttpTransport` is the default reqwest-backed capability; wrap it (or any
//! other [`Transport`](crate::traits::Transport)) in `BackoffTransport` to get
//! bounded exponential retry for key-set fetches.

mod backoff;
mod http;

pub use backoff::BackoffTransport;
pub use http::HttpTransport;
