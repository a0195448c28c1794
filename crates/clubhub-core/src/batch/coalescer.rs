use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{debug, trace};

use crate::api::{record_id, ApiError, Filter, QueryExecutor, Record};

/// How long a window stays open collecting ids before its request goes out.
/// Long enough to catch callers from the same update cycle, short enough not
/// to be noticed.
pub const DEFAULT_BATCH_DELAY: Duration = Duration::from_millis(10);

/// Result delivered to every caller of one window.
pub type BatchResult = Result<Arc<Vec<Record>>, ApiError>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct WindowKey {
    batch_key: String,
    fields: String,
}

/// An open coalescing window. Removing it from the registry is what settles it.
struct BatchWindow {
    pending_ids: BTreeSet<String>,
    waiters: Vec<oneshot::Sender<BatchResult>>,
}

type WindowRegistry = Mutex<HashMap<WindowKey, BatchWindow>>;

fn lock_windows(windows: &WindowRegistry) -> MutexGuard<'_, HashMap<WindowKey, BatchWindow>> {
    windows.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Merges single-id lookups against the same table and field set into one
/// bulk request.
///
/// The first lookup for a `(batch_key, fields)` pair opens a window and starts
/// a one-shot timer. Lookups arriving before the timer fires join that window.
/// When it fires the window is taken out of the registry and a single
/// `id IN (...)` query is sent; every caller gets the same record list.
pub struct BatchCoalescer {
    executor: Arc<dyn QueryExecutor>,
    delay: Duration,
    windows: Arc<WindowRegistry>,
}

impl BatchCoalescer {
    pub fn new(executor: Arc<dyn QueryExecutor>) -> Self {
        Self::with_delay(executor, DEFAULT_BATCH_DELAY)
    }

    pub fn with_delay(executor: Arc<dyn QueryExecutor>, delay: Duration) -> Self {
        Self {
            executor,
            delay,
            windows: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Add `id` to the open window for `batch_key`/`fields` (opening one if
    /// needed) and wait for that window's bulk result.
    ///
    /// The returned list holds the records for every id in the window, not
    /// just this caller's; use [`batched_record`](Self::batched_record) to
    /// pick out one record.
    pub async fn batched_query(&self, batch_key: &str, id: &str, fields: &str) -> BatchResult {
        if batch_key.is_empty() {
            return Err(ApiError::InvalidArgument("batch key must not be empty".into()));
        }
        if id.is_empty() {
            return Err(ApiError::InvalidArgument("id must not be empty".into()));
        }

        let (tx, rx) = oneshot::channel();
        {
            let key = WindowKey {
                batch_key: batch_key.to_string(),
                fields: fields.to_string(),
            };
            let mut windows = lock_windows(&self.windows);
            match windows.get_mut(&key) {
                Some(window) => {
                    window.pending_ids.insert(id.to_string());
                    window.waiters.push(tx);
                    trace!(batch_key = batch_key, id = id, pending = window.pending_ids.len(), "Joined batch window");
                }
                None => {
                    let mut pending_ids = BTreeSet::new();
                    pending_ids.insert(id.to_string());
                    windows.insert(
                        key.clone(),
                        BatchWindow {
                            pending_ids,
                            waiters: vec![tx],
                        },
                    );
                    debug!(batch_key = batch_key, fields = fields, "Opened batch window");
                    self.schedule_dispatch(key);
                }
            }
        }

        rx.await
            .map_err(|_| ApiError::InvalidResponse("batch window closed without a result".into()))?
    }

    /// Like [`batched_query`](Self::batched_query) but returns only the record
    /// whose `id` matches. `fields` must include `id` for a match to be found.
    pub async fn batched_record(
        &self,
        batch_key: &str,
        id: &str,
        fields: &str,
    ) -> Result<Option<Record>, ApiError> {
        let records = self.batched_query(batch_key, id, fields).await?;
        Ok(records
            .iter()
            .find(|record| record_id(record).as_deref() == Some(id))
            .cloned())
    }

    /// Number of windows still collecting ids.
    pub fn open_windows(&self) -> usize {
        lock_windows(&self.windows).len()
    }

    fn schedule_dispatch(&self, key: WindowKey) {
        let windows = Arc::clone(&self.windows);
        let executor = Arc::clone(&self.executor);
        let delay = self.delay;

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            // Settle before dispatching: later callers open a fresh window
            let window = lock_windows(&windows).remove(&key);
            let Some(window) = window else {
                return;
            };

            let ids: Vec<String> = window.pending_ids.into_iter().collect();
            debug!(batch_key = %key.batch_key, ids = ids.len(), waiters = window.waiters.len(), "Dispatching batch");

            let result = executor
                .execute(&key.batch_key, &key.fields, &[Filter::In("id".to_string(), ids)])
                .await
                .map(Arc::new);

            for waiter in window.waiters {
                // A caller that stopped waiting is fine to skip
                let _ = waiter.send(result.clone());
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockExecutor;
    use futures::future::join_all;

    fn coalescer(executor: &Arc<MockExecutor>) -> BatchCoalescer {
        BatchCoalescer::new(Arc::clone(executor) as Arc<dyn QueryExecutor>)
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_lookups_share_one_request() {
        let executor = Arc::new(MockExecutor::default());
        let batcher = coalescer(&executor);

        let ids = ["1", "2", "3", "4", "5"];
        let lookups = ids
            .iter()
            .map(|id| batcher.batched_record("users", id, "id,name"));
        let results = join_all(lookups).await;

        assert_eq!(executor.call_count(), 1);
        let call = &executor.calls()[0];
        assert_eq!(call.table, "users");
        assert_eq!(call.selection, "id,name");
        assert_eq!(call.filters, vec![Filter::is_in("id", ids)]);

        for (id, result) in ids.iter().zip(results) {
            let record = result.unwrap().expect("record for own id");
            assert_eq!(record_id(&record).as_deref(), Some(*id));
        }
        assert_eq!(batcher.open_windows(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_caller_receives_full_result() {
        let executor = Arc::new(MockExecutor::default());
        let batcher = coalescer(&executor);

        let (a, b) = tokio::join!(
            batcher.batched_query("clubs", "10", "id,name"),
            batcher.batched_query("clubs", "20", "id,name"),
        );
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_eq!(a.len(), 2);
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_ids_are_requested_once() {
        let executor = Arc::new(MockExecutor::default());
        let batcher = coalescer(&executor);

        let results = join_all(
            ["7", "7", "8"]
                .iter()
                .map(|id| batcher.batched_query("faculties", id, "id,name")),
        )
        .await;

        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(executor.calls()[0].filters, vec![Filter::is_in("id", ["7", "8"])]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_after_dispatch_opens_new_window() {
        let executor = Arc::new(MockExecutor::default());
        let batcher = coalescer(&executor);

        batcher.batched_query("users", "1", "id,name").await.unwrap();
        batcher.batched_query("users", "2", "id,name").await.unwrap();

        assert_eq!(executor.call_count(), 2);
        assert_eq!(executor.calls()[1].filters, vec![Filter::is_in("id", ["2"])]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_different_fields_use_separate_windows() {
        let executor = Arc::new(MockExecutor::default());
        let batcher = coalescer(&executor);

        let (a, b) = tokio::join!(
            batcher.batched_query("users", "1", "id,name"),
            batcher.batched_query("users", "2", "id,email"),
        );
        a.unwrap();
        b.unwrap();

        assert_eq!(executor.call_count(), 2);
        let mut selections: Vec<String> = executor.calls().into_iter().map(|c| c.selection).collect();
        selections.sort();
        assert_eq!(selections, vec!["id,email", "id,name"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_reaches_all_callers_and_discards_window() {
        let executor = Arc::new(MockExecutor::failing(ApiError::ServerError("boom".into())));
        let batcher = coalescer(&executor);

        let results = join_all(
            ["1", "2", "3"]
                .iter()
                .map(|id| batcher.batched_query("events", id, "id")),
        )
        .await;
        for result in results {
            assert_eq!(result.unwrap_err(), ApiError::ServerError("boom".into()));
        }
        assert_eq!(executor.call_count(), 1);
        assert_eq!(batcher.open_windows(), 0);

        executor.set_failure(None);
        let records = batcher.batched_query("events", "1", "id").await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(executor.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_record_yields_none() {
        let executor = Arc::new(MockExecutor::default().without_ids(["404"]));
        let batcher = coalescer(&executor);

        let record = batcher.batched_record("users", "404", "id,name").await.unwrap();
        assert!(record.is_none());
    }

    #[tokio::test]
    async fn test_rejects_empty_arguments() {
        let executor = Arc::new(MockExecutor::default());
        let batcher = coalescer(&executor);

        assert!(matches!(
            batcher.batched_query("", "1", "id").await,
            Err(ApiError::InvalidArgument(_))
        ));
        assert!(matches!(
            batcher.batched_query("users", "", "id").await,
            Err(ApiError::InvalidArgument(_))
        ));
        assert_eq!(executor.call_count(), 0);
        assert_eq!(batcher.open_windows(), 0);
    }
}
