//! Remote query execution.
//!
//! The cache and the batch coalescer only see the `QueryExecutor` trait;
//! `RestExecutor` is the implementation used against the hosted backend.

pub mod client;
pub mod error;
pub mod executor;
pub mod filter;

pub use client::RestExecutor;
pub use error::ApiError;
pub use executor::{record_id, QueryExecutor, Record};
pub use filter::Filter;
