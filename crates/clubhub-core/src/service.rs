//! Data access used by the dashboard's pages.
//!
//! `DataService` combines the shared query cache, the batch coalescer and a
//! query executor. The cache and coalescer are built once by the application
//! and handed in, so every page shares the same instances.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::api::{filter, ApiError, Filter, QueryExecutor, Record};
use crate::batch::BatchCoalescer;
use crate::cache::{CacheStats, QueryCache};

/// Cached value type: the rows of one read query.
pub type Rows = Arc<Vec<Record>>;

pub struct DataService {
    executor: Arc<dyn QueryExecutor>,
    cache: Arc<QueryCache<Rows>>,
    batcher: Arc<BatchCoalescer>,
}

impl DataService {
    pub fn new(
        executor: Arc<dyn QueryExecutor>,
        cache: Arc<QueryCache<Rows>>,
        batcher: Arc<BatchCoalescer>,
    ) -> Self {
        Self {
            executor,
            cache,
            batcher,
        }
    }

    /// Bracketed table tag that starts every cache key for `table`.
    /// `\` and `]` are escaped so the tag always ends at the first bare `]`.
    fn table_tag(table: &str) -> String {
        format!("[{}]", table.replace('\\', "\\\\").replace(']', "\\]"))
    }

    /// Cache key for a table read: the table tag, then the selection and
    /// filters as a JSON array so different queries never share a key.
    pub fn cache_key(table: &str, selection: &str, filters: &[Filter]) -> String {
        format!(
            "{}[{},{}]",
            Self::table_tag(table),
            Value::from(selection),
            filter::describe(filters)
        )
    }

    /// Read rows, answering from the cache while the previous result is fresh.
    pub async fn select(
        &self,
        table: &str,
        selection: &str,
        filters: &[Filter],
        ttl: Option<Duration>,
    ) -> Result<Rows, ApiError> {
        let key = Self::cache_key(table, selection, filters);
        let executor = Arc::clone(&self.executor);
        self.cache
            .cached_query(
                &key,
                move || async move { executor.execute(table, selection, filters).await.map(Arc::new) },
                ttl,
            )
            .await
    }

    /// Fetch one record by id, batched with other lookups on the same table
    /// and field set.
    pub async fn lookup(&self, table: &str, fields: &str, id: &str) -> Result<Option<Record>, ApiError> {
        self.batcher.batched_record(table, id, fields).await
    }

    /// Drop every cached read of `table`. Call after writing to it.
    pub fn invalidate_table(&self, table: &str) -> usize {
        self.cache.invalidate(Some(&Self::table_tag(table)))
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}
