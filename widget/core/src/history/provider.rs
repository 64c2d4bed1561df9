//! History Providers
//!
//! [`HistoryProvider`] is the seam between the paginator and the network.
//! The HTTP implementation talks to the history endpoint; tests script
//! their own implementations.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use super::{HistoryPage, HistoryRecord, PageRequest};

/// Default timeout for one history request
pub const DEFAULT_HISTORY_TIMEOUT: Duration = Duration::from_secs(10);

/// Why a history page could not be fetched
#[derive(Debug, Error)]
pub enum HistoryFetchError {
    /// Request never completed (DNS, refused, timeout, ...)
    #[error("history request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Endpoint answered with a non-success status
    #[error("history endpoint returned status {0}")]
    Status(reqwest::StatusCode),

    /// Body was not a JSON array of records
    #[error("history response is not a list of records: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Source of history pages
#[async_trait]
pub trait HistoryProvider: Send + Sync {
    /// Fetch one window of records for `user_id`
    async fn try_fetch_page(
        &self,
        user_id: &str,
        request: PageRequest,
    ) -> Result<HistoryPage, HistoryFetchError>;

    /// Fetch one window, substituting an empty failed page on error
    ///
    /// Failures are logged and never propagated; the session keeps running
    /// with whatever it already shows.
    async fn fetch_page(&self, user_id: &str, request: PageRequest) -> HistoryPage {
        match self.try_fetch_page(user_id, request).await {
            Ok(page) => {
                tracing::debug!(
                    offset = request.offset,
                    limit = request.limit,
                    received = page.len(),
                    "History page fetched"
                );
                page
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    offset = request.offset,
                    limit = request.limit,
                    "Failed to fetch history"
                );
                HistoryPage::fetch_failed()
            }
        }
    }
}

/// History provider backed by the HTTP history endpoint
///
/// Issues `GET <base>?user_id=..&offset=..&limit=..` and expects a JSON
/// array of `{question, answer}` ordered newest-first.
#[derive(Clone, Debug)]
pub struct HttpHistoryProvider {
    base_url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpHistoryProvider {
    /// Create a provider for the given endpoint
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
            timeout: DEFAULT_HISTORY_TIMEOUT,
        }
    }

    /// Override the per-request timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Endpoint base URL
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn build_request(
        &self,
        user_id: &str,
        request: PageRequest,
    ) -> Result<reqwest::Request, reqwest::Error> {
        self.client
            .get(&self.base_url)
            .query(&[
                ("user_id", user_id.to_string()),
                ("offset", request.offset.to_string()),
                ("limit", request.limit.to_string()),
            ])
            .timeout(self.timeout)
            .build()
    }
}

#[async_trait]
impl HistoryProvider for HttpHistoryProvider {
    async fn try_fetch_page(
        &self,
        user_id: &str,
        request: PageRequest,
    ) -> Result<HistoryPage, HistoryFetchError> {
        let http_request = self.build_request(user_id, request)?;
        let response = self.client.execute(http_request).await?;

        let status = response.status();
        if !status.is_success() {
            return Err(HistoryFetchError::Status(status));
        }

        let body = response.bytes().await?;
        let records: Vec<HistoryRecord> = serde_json::from_slice(&body)?;
        Ok(HistoryPage::from_newest_first(records))
    }
}
