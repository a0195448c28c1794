//! In-memory executor used by unit tests.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::json;

use crate::api::{ApiError, Filter, QueryExecutor, Record};

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub table: String,
    pub selection: String,
    pub filters: Vec<Filter>,
}

/// Records every call. `id IN (...)` queries answer one row per requested id;
/// any other query answers a single row naming the table.
#[derive(Default)]
pub struct MockExecutor {
    calls: Mutex<Vec<RecordedCall>>,
    failure: Mutex<Option<ApiError>>,
    missing_ids: HashSet<String>,
}

impl MockExecutor {
    pub fn failing(err: ApiError) -> Self {
        let executor = Self::default();
        executor.set_failure(Some(err));
        executor
    }

    pub fn without_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.missing_ids.extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn set_failure(&self, err: Option<ApiError>) {
        *self.failure.lock().unwrap() = err;
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl QueryExecutor for MockExecutor {
    async fn execute(
        &self,
        table: &str,
        selection: &str,
        filters: &[Filter],
    ) -> Result<Vec<Record>, ApiError> {
        self.calls.lock().unwrap().push(RecordedCall {
            table: table.to_string(),
            selection: selection.to_string(),
            filters: filters.to_vec(),
        });

        if let Some(err) = self.failure.lock().unwrap().clone() {
            return Err(err);
        }

        let ids = filters.iter().find_map(|f| match f {
            Filter::In(column, values) if column == "id" => Some(values),
            _ => None,
        });

        Ok(match ids {
            Some(ids) => ids
                .iter()
                .filter(|id| !self.missing_ids.contains(*id))
                .map(|id| json!({ "id": id, "name": format!("{}-{}", table, id) }))
                .collect(),
            None => vec![json!({ "id": "1", "table": table })],
        })
    }
}
