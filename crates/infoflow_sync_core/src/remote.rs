//! Remote source contract.
//!
//! The engine consumes the InfoFlow export API through [`RemoteSource`]; the
//! HTTP implementation lives in the `infoflow_sync_http` crate. Records are
//! a read-only projection of remote state at fetch time.

use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::fs::BoxFuture;

/// Page size requested from the remote (the API maximum).
pub const PER_PAGE: u32 = 100;

/// A highlight or annotation attached to a record.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    /// Note id
    #[serde(default)]
    pub id: String,
    /// Highlight text
    #[serde(default)]
    pub content: String,
    /// The passage the note refers to
    #[serde(default)]
    pub quoted_text: Option<String>,
    /// Creation timestamp
    #[serde(default)]
    pub created_at: String,
    /// Free-form metadata
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

/// Descriptive metadata of a record.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordMetadata {
    /// Where the item was captured from
    #[serde(default)]
    pub source: Option<String>,
    /// Author of the item
    #[serde(default)]
    pub author: Option<String>,
    /// Reading progress, 0 to 1
    #[serde(default)]
    pub reading_progress: Option<f64>,
}

/// A remote item to be mirrored locally.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    /// Stable, globally unique id
    pub id: String,
    /// Title
    #[serde(default)]
    pub title: String,
    /// Item kind
    #[serde(default)]
    pub item_type: String,
    /// Source url
    #[serde(default)]
    pub url: Option<String>,
    /// HTML or plain text content
    #[serde(default)]
    pub content: Option<String>,
    /// The user's note on the item
    #[serde(default)]
    pub item_note: Option<String>,
    /// Remote folder
    #[serde(default)]
    pub folder_name: Option<String>,
    /// Preview image
    #[serde(default)]
    pub preview_image_url: Option<String>,
    /// Highlights, in remote order
    #[serde(default)]
    pub notes: Vec<Note>,
    /// Tags, in remote order
    #[serde(default)]
    pub tags: Vec<String>,
    /// Descriptive metadata
    #[serde(default)]
    pub metadata: Option<RecordMetadata>,
    /// ISO-8601 creation timestamp
    #[serde(default)]
    pub created_at: String,
    /// ISO-8601 last update timestamp
    #[serde(default)]
    pub updated_at: String,
}

impl Record {
    /// Author from the record metadata.
    pub fn author(&self) -> Option<&str> {
        self.metadata.as_ref().and_then(|m| m.author.as_deref())
    }

    /// Parsed `updated_at`, if it is a valid timestamp.
    pub fn updated_at_time(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.updated_at)
    }
}

/// Parse an RFC 3339 / ISO-8601 timestamp into UTC.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Format a timestamp the way the remote expects cursors (`…T…Z`, millisecond precision).
pub fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Filters for one enumeration of the remote collection.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FetchQuery {
    /// Only items created at or after this date
    pub from: Option<String>,
    /// Only items created at or before this date
    pub to: Option<String>,
    /// Only items carrying one of these tags
    pub tags: Vec<String>,
    /// Only items in one of these folders
    pub folders: Vec<String>,
    /// Only items updated at or after this cursor
    pub updated_since: Option<String>,
    /// Items per page
    pub per_page: u32,
}

/// Pagination block of a page response.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Pagination {
    /// 1-based page index
    pub current_page: u32,
    /// Total number of pages
    pub total_pages: u32,
    /// Total number of matching items
    pub total_items: u64,
    /// Items per page
    pub per_page: u32,
    /// Whether another page follows
    pub has_next_page: bool,
    /// Whether a page precedes
    pub has_previous_page: bool,
}

/// One page of records.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RecordPage {
    /// Records on this page
    #[serde(default)]
    pub items: Vec<Record>,
    /// Pagination info
    #[serde(default)]
    pub pagination: Pagination,
}

/// Failure at the remote boundary.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    /// The server answered with a non-success status
    #[error("InfoFlow returned HTTP {status}: {message}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body or reason
        message: String,
    },

    /// The request never got an answer
    #[error("Network error: {0}")]
    Transport(String),

    /// The answer could not be decoded
    #[error("Unexpected response: {0}")]
    Decode(String),
}

/// Callback receiving `(items_so_far, total_items)` while pages are drained.
pub type FetchProgressCallback<'a> = &'a (dyn Fn(usize, u64) + Send + Sync);

/// Source of remote records.
pub trait RemoteSource: Send + Sync {
    /// Fetch one page (1-based) of records matching `query`.
    fn fetch_page<'a>(
        &'a self,
        query: &'a FetchQuery,
        page: u32,
    ) -> BoxFuture<'a, Result<RecordPage, RemoteError>>;
}

impl<T: RemoteSource + ?Sized> RemoteSource for std::sync::Arc<T> {
    fn fetch_page<'a>(
        &'a self,
        query: &'a FetchQuery,
        page: u32,
    ) -> BoxFuture<'a, Result<RecordPage, RemoteError>> {
        (**self).fetch_page(query, page)
    }
}

/// Drain every page of `query`, concatenating the records in page order.
pub async fn fetch_all<R: RemoteSource + ?Sized>(
    source: &R,
    query: &FetchQuery,
    on_progress: Option<FetchProgressCallback<'_>>,
) -> Result<Vec<Record>, RemoteError> {
    let query = FetchQuery {
        per_page: if query.per_page == 0 { PER_PAGE } else { query.per_page },
        ..query.clone()
    };

    let mut all = Vec::new();
    let mut page = 1;
    loop {
        let response = source.fetch_page(&query, page).await?;
        let received = response.items.len();
        all.extend(response.items);

        if let Some(cb) = on_progress {
            cb(all.len(), response.pagination.total_items);
        }
        debug!(
            "Fetched page {} ({} items, {} total so far)",
            page,
            received,
            all.len()
        );

        if !response.pagination.has_next_page {
            break;
        }
        if received == 0 {
            return Err(RemoteError::Decode(format!(
                "empty page {} with hasNextPage",
                page
            )));
        }
        page += 1;
    }

    Ok(all)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{ScriptedRemote, record};
    use futures_lite::future::block_on;
    use std::sync::Mutex;

    #[test]
    fn test_record_decodes_export_json() {
        let json = r#"{
            "id": "it_1",
            "title": "A title",
            "itemType": "web_page",
            "url": "https://example.com",
            "content": "<p>x</p>",
            "notes": [{"id": "n1", "content": "hl", "quotedText": "q", "createdAt": "2024-01-01T00:00:00Z"}],
            "tags": ["t1"],
            "metadata": {"author": "Ada", "readingProgress": 0.5},
            "createdAt": "2024-01-01T00:00:00Z",
            "updatedAt": "2024-01-02T10:00:00.000Z"
        }"#;
        let rec: Record = serde_json::from_str(json).unwrap();
        assert_eq!(rec.item_type, "web_page");
        assert_eq!(rec.author(), Some("Ada"));
        assert_eq!(rec.notes[0].quoted_text.as_deref(), Some("q"));
        assert_eq!(
            rec.updated_at_time().map(format_timestamp).as_deref(),
            Some("2024-01-02T10:00:00.000Z")
        );
    }

    #[test]
    fn test_parse_timestamp_rejects_garbage() {
        assert!(parse_timestamp("yesterday").is_none());
        assert!(parse_timestamp("2024-01-02T10:00:00+02:00").is_some());
    }

    #[test]
    fn test_fetch_all_drains_pages_and_reports_progress() {
        let remote = ScriptedRemote::new(vec![
            record("a", "A", "2024-01-01T00:00:00Z"),
            record("b", "B", "2024-01-02T00:00:00Z"),
            record("c", "C", "2024-01-03T00:00:00Z"),
        ])
        .with_page_size(2);

        let seen = Mutex::new(Vec::new());
        let cb = |so_far: usize, total: u64| seen.lock().unwrap().push((so_far, total));
        let query = FetchQuery::default();
        let items = block_on(fetch_all(&remote, &query, Some(&cb))).unwrap();

        let ids: Vec<_> = items.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(*seen.lock().unwrap(), vec![(2, 3), (3, 3)]);

        let pages: Vec<u32> = remote.requests().iter().map(|(_, page)| *page).collect();
        assert_eq!(pages, vec![1, 2]);
        assert_eq!(remote.requests()[0].0.per_page, PER_PAGE);
    }

    /// Remote whose second page is empty yet claims another follows.
    struct HollowPages;

    impl RemoteSource for HollowPages {
        fn fetch_page<'a>(
            &'a self,
            _query: &'a FetchQuery,
            page: u32,
        ) -> BoxFuture<'a, Result<RecordPage, RemoteError>> {
            let items = if page == 1 {
                vec![record("a", "A", "2024-01-01T00:00:00Z")]
            } else {
                Vec::new()
            };
            Box::pin(async move {
                Ok(RecordPage {
                    items,
                    pagination: Pagination {
                        total_items: 5,
                        has_next_page: true,
                        has_previous_page: page > 1,
                        ..Default::default()
                    },
                })
            })
        }
    }

    #[test]
    fn test_fetch_all_rejects_empty_page_that_promises_more() {
        let err = block_on(fetch_all(&HollowPages, &FetchQuery::default(), None)).unwrap_err();
        assert_eq!(err, RemoteError::Decode("empty page 2 with hasNextPage".into()));
    }

    #[test]
    fn test_fetch_all_propagates_errors() {
        let remote = ScriptedRemote::new(vec![record("a", "A", "2024-01-01T00:00:00Z")])
            .failing_with(RemoteError::Transport("offline".into()));
        let err = block_on(fetch_all(&remote, &FetchQuery::default(), None)).unwrap_err();
        assert_eq!(err, RemoteError::Transport("offline".into()));
    }
}
