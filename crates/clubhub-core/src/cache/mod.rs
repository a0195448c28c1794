//! In-memory query result cache.
//!
//! `QueryCache` keeps the results of read queries against the backend for a
//! short time (30 seconds unless the caller says otherwise) and holds at most
//! a fixed number of entries, evicting the least recently used one first.
//!
//! Keys are caller-chosen strings. `DataService` starts every key with a
//! bracketed table tag (`[clubs]...`) so one table's reads can be dropped with
//! `invalidate(Some("[clubs]"))` without touching `faculty_clubs`.

pub mod query_cache;

use thiserror::Error;

pub use query_cache::{CacheStats, QueryCache, DEFAULT_TTL};

/// Invalid arguments passed to the cache. Misses and expiry are not errors.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheError {
    #[error("cache key must not be empty")]
    EmptyKey,

    #[error("ttl must be greater than zero")]
    InvalidTtl,

    #[error("cache capacity must be at least 1")]
    ZeroCapacity,
}
