//! HTTP client for the InfoFlow export API.
//!
//! [`InfoFlowClient`] implements [`RemoteSource`] over
//! `GET {endpoint}/api/v1/external/export/items` with bearer authentication.
//! Pagination is driven by [`infoflow_sync_core::remote::fetch_all`].
//!
//! ```ignore
//! use infoflow_sync_core::SyncSettings;
//! use infoflow_sync_http::InfoFlowClient;
//!
//! let settings = SyncSettings::load()?;
//! let client = InfoFlowClient::from_settings(&settings)?;
//! ```

#![warn(missing_docs)]

use infoflow_sync_core::fs::BoxFuture;
use infoflow_sync_core::remote::{FetchQuery, RecordPage, RemoteError, RemoteSource};
use infoflow_sync_core::{SyncError, SyncSettings};
use log::debug;
use url::Url;

/// Path of the export endpoint, relative to the configured endpoint.
pub const EXPORT_ITEMS_PATH: &str = "api/v1/external/export/items";

/// Longest error body carried into a [`RemoteError::Status`].
const MAX_ERROR_BODY: usize = 500;

/// Client for one InfoFlow account.
#[derive(Clone)]
pub struct InfoFlowClient {
    endpoint: String,
    token: String,
    http: reqwest::Client,
}

impl std::fmt::Debug for InfoFlowClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InfoFlowClient")
            .field("endpoint", &self.endpoint)
            .field("token", &"<redacted>")
            .finish()
    }
}

impl InfoFlowClient {
    /// Client for `endpoint` (e.g. `https://www.infoflow.app`) authenticating with `token`.
    pub fn new(endpoint: impl Into<String>, token: impl Into<String>) -> Self {
        Self::with_http(endpoint, token, reqwest::Client::new())
    }

    /// Like [`InfoFlowClient::new`] with a preconfigured `reqwest` client (proxies, timeouts).
    pub fn with_http(
        endpoint: impl Into<String>,
        token: impl Into<String>,
        http: reqwest::Client,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            token: token.into(),
            http,
        }
    }

    /// Client for the endpoint and token in `settings`.
    pub fn from_settings(settings: &SyncSettings) -> Result<Self, SyncError> {
        if !settings.has_credential() {
            return Err(SyncError::MissingCredential);
        }
        Ok(Self::new(
            settings.endpoint.trim(),
            settings.api_token.trim(),
        ))
    }

    /// The configured endpoint.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Full request URL for one page of `query`.
    pub fn request_url(&self, query: &FetchQuery, page: u32) -> Result<Url, RemoteError> {
        let base = format!("{}/{}", self.endpoint.trim_end_matches('/'), EXPORT_ITEMS_PATH);
        let mut url = Url::parse(&base)
            .map_err(|e| RemoteError::Transport(format!("Invalid endpoint {:?}: {}", self.endpoint, e)))?;

        {
            let mut pairs = url.query_pairs_mut();
            if let Some(from) = &query.from {
                pairs.append_pair("from", from);
            }
            if let Some(to) = &query.to {
                pairs.append_pair("to", to);
            }
            for tag in &query.tags {
                pairs.append_pair("tags[]", tag);
            }
            for folder in &query.folders {
                pairs.append_pair("folders[]", folder);
            }
            if let Some(updated) = &query.updated_since {
                pairs.append_pair("updatedAt", updated);
            }
            pairs.append_pair("page", &page.to_string());
            if query.per_page > 0 {
                pairs.append_pair("perPage", &query.per_page.to_string());
            }
        }
        Ok(url)
    }

    async fn fetch(&self, query: &FetchQuery, page: u32) -> Result<RecordPage, RemoteError> {
        let url = self.request_url(query, page)?;
        debug!("GET {} (page {})", EXPORT_ITEMS_PATH, page);

        let response = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| RemoteError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| RemoteError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(status_error(status, &body));
        }
        decode_page(&body)
    }
}

/// Map a non-success response to [`RemoteError::Status`].
fn status_error(status: reqwest::StatusCode, body: &str) -> RemoteError {
    let body = body.trim();
    let message = if body.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("no response body")
            .to_string()
    } else {
        body.chars().take(MAX_ERROR_BODY).collect()
    };
    RemoteError::Status {
        status: status.as_u16(),
        message,
    }
}

/// Decode one page of the export response.
pub fn decode_page(body: &str) -> Result<RecordPage, RemoteError> {
    serde_json::from_str(body).map_err(|e| RemoteError::Decode(e.to_string()))
}

impl RemoteSource for InfoFlowClient {
    fn fetch_page<'a>(
        &'a self,
        query: &'a FetchQuery,
        page: u32,
    ) -> BoxFuture<'a, Result<RecordPage, RemoteError>> {
        Box::pin(self.fetch(query, page))
    }
}
