use async_trait::async_trait;
use serde_json::Value;

use super::{ApiError, Filter};

/// A single row returned by the backend. Its shape is owned by the backend.
pub type Record = Value;

/// Executes read queries against the remote backend.
///
/// Both the query cache and the batch coalescer delegate here; the wire
/// protocol and authentication are the implementor's concern.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(
        &self,
        table: &str,
        selection: &str,
        filters: &[Filter],
    ) -> Result<Vec<Record>, ApiError>;
}

/// Identifier of a record as a string, whether the backend stores it as a
/// number or a string.
pub fn record_id(record: &Record) -> Option<String> {
    match record.get("id")? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
