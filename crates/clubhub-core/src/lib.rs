//! Core library for clubhub.
//!
//! Client-side data layer of the clubs and events dashboard:
//!
//! - `cache`: bounded TTL + LRU cache for read query results
//! - `batch`: coalescing of single-id lookups into bulk requests
//! - `api`: the query executor seam and its REST implementation
//! - `service`: the pieces wired together for call sites
//! - `config`: on-disk configuration

pub mod api;
pub mod batch;
pub mod cache;
pub mod config;
pub mod service;

#[cfg(test)]
mod testing;

pub use api::{ApiError, Filter, QueryExecutor, Record, RestExecutor};
pub use batch::BatchCoalescer;
pub use cache::{CacheError, QueryCache};
pub use config::Config;
pub use service::DataService;
