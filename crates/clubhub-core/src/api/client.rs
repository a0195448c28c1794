//! REST executor for the hosted backend.
//!
//! Talks to the backend's auto-generated table endpoints
//! (`{base_url}/rest/v1/{table}`) using the project API key and, once a user
//! has signed in elsewhere, their access token.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client};
use tracing::{debug, warn};

use super::{ApiError, Filter, QueryExecutor, Record};

// ============================================================================
// Constants
// ============================================================================

/// Path prefix of the table endpoints
const REST_PATH: &str = "rest/v1";

/// Default HTTP request timeout in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Executor backed by the backend's REST interface.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct RestExecutor {
    client: Client,
    base_url: String,
    api_key: Arc<String>,
    token: Option<Arc<String>>,
}

impl RestExecutor {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, ApiError> {
        Self::with_timeout(base_url, api_key, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn with_timeout(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: Arc::new(api_key.to_string()),
            token: None,
        })
    }

    /// Create a new executor with the given user token, sharing the connection pool.
    pub fn with_token(&self, token: impl Into<Arc<String>>) -> Self {
        Self {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            api_key: Arc::clone(&self.api_key),
            token: Some(token.into()),
        }
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/{}/{}", self.base_url, REST_PATH, table)
    }

    fn query_pairs(selection: &str, filters: &[Filter]) -> Vec<(String, String)> {
        let mut pairs = Vec::with_capacity(filters.len() + 1);
        pairs.push(("select".to_string(), selection.to_string()));
        pairs.extend(filters.iter().map(Filter::to_query_pair));
        pairs
    }

    fn auth_headers(&self) -> Result<header::HeaderMap, ApiError> {
        let invalid = |_| ApiError::InvalidArgument("credential contains invalid characters".into());

        let mut headers = header::HeaderMap::new();
        headers.insert("apikey", header::HeaderValue::from_str(&self.api_key).map_err(invalid)?);
        let bearer = self.token.as_ref().unwrap_or(&self.api_key);
        headers.insert(
            header::AUTHORIZATION,
            header::HeaderValue::from_str(&format!("Bearer {}", bearer)).map_err(invalid)?,
        );
        Ok(headers)
    }

    /// Returns Ok(Some(response)) for success, Ok(None) for rate limit (should retry),
    /// or Err for other errors.
    async fn check_response_for_retry(
        response: reqwest::Response,
    ) -> Result<Option<reqwest::Response>, ApiError> {
        if response.status().is_success() {
            Ok(Some(response))
        } else if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            Ok(None)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }
}

#[async_trait]
impl QueryExecutor for RestExecutor {
    async fn execute(
        &self,
        table: &str,
        selection: &str,
        filters: &[Filter],
    ) -> Result<Vec<Record>, ApiError> {
        let url = self.table_url(table);
        let pairs = Self::query_pairs(selection, filters);
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let response = self
                .client
                .get(&url)
                .headers(self.auth_headers()?)
                .query(&pairs)
                .send()
                .await?;

            match Self::check_response_for_retry(response).await? {
                Some(response) => {
                    let rows: Vec<Record> = response.json().await?;
                    debug!(table = table, rows = rows.len(), "Query executed");
                    return Ok(rows);
                }
                None => {
                    retries += 1;
                    if retries > MAX_RATE_LIMIT_RETRIES {
                        return Err(ApiError::RateLimited);
                    }
                    warn!(table = table, retry = retries, backoff_ms = backoff_ms, "Rate limited, backing off");
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms *= 2; // Exponential backoff
                }
            }
        }
    }
}
