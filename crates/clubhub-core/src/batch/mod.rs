//! Request coalescing for single-record lookups.
//!
//! Pages often ask for one user, club or faculty at a time from many places
//! during the same update. `BatchCoalescer` collects those ids for a few
//! milliseconds and fetches them with a single bulk query.

pub mod coalescer;

pub use coalescer::{BatchCoalescer, BatchResult, DEFAULT_BATCH_DELAY};
