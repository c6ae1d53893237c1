//! Test utilities for infoflow_sync_core
//!
//! Deterministic collaborators for the sync engine: a manual clock, a
//! recording status sink, a scripted remote source and a filesystem wrapper
//! that counts writes and can inject failures.

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::clock::Clock;
use crate::fs::{BoxFuture, FileSystem, InMemoryFileSystem};
use crate::progress::StatusSink;
use crate::remote::{FetchQuery, Pagination, Record, RecordPage, RemoteError, RemoteSource, parse_timestamp};

/// A minimal record fixture.
pub fn record(id: &str, title: &str, updated_at: &str) -> Record {
    Record {
        id: id.to_string(),
        title: title.to_string(),
        item_type: "web_page".to_string(),
        created_at: "2024-01-01T00:00:00Z".to_string(),
        updated_at: updated_at.to_string(),
        ..Default::default()
    }
}

/// A clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Clock set to an RFC 3339 instant.
    pub fn at(rfc3339: &str) -> Self {
        Self {
            now: Mutex::new(parse_timestamp(rfc3339).unwrap()),
        }
    }

    /// Move forward.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += chrono::Duration::from_std(by).unwrap();
    }

    /// Jump to an instant.
    pub fn set(&self, rfc3339: &str) {
        *self.now.lock().unwrap() = parse_timestamp(rfc3339).unwrap();
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// Status sink remembering everything it was given.
#[derive(Default)]
pub struct RecordingSink {
    texts: Mutex<Vec<String>>,
    notices: Mutex<Vec<String>>,
}

impl RecordingSink {
    /// Every status text, in order.
    pub fn texts(&self) -> Vec<String> {
        self.texts.lock().unwrap().clone()
    }

    /// Every notice, in order.
    pub fn notices(&self) -> Vec<String> {
        self.notices.lock().unwrap().clone()
    }
}

impl StatusSink for RecordingSink {
    fn set_text(&self, text: &str) {
        self.texts.lock().unwrap().push(text.to_string());
    }

    fn notice(&self, message: &str) {
        self.notices.lock().unwrap().push(message.to_string());
    }
}

/// Remote source serving a mutable list of records.
///
/// Applies the `updated_since`, tag and folder filters like the real API and
/// paginates with a configurable page size.
#[derive(Default)]
pub struct ScriptedRemote {
    records: Mutex<Vec<Record>>,
    page_size: Option<usize>,
    fail_always: Mutex<Option<RemoteError>>,
    fail_on_page: Mutex<Option<(u32, RemoteError)>>,
    requests: Mutex<Vec<(FetchQuery, u32)>>,
}

impl ScriptedRemote {
    /// Serve `records`.
    pub fn new(records: Vec<Record>) -> Self {
        Self {
            records: Mutex::new(records),
            ..Default::default()
        }
    }

    /// Override the page size requested by queries.
    pub fn with_page_size(mut self, size: usize) -> Self {
        self.page_size = Some(size);
        self
    }

    /// Fail every request.
    pub fn failing_with(self, err: RemoteError) -> Self {
        *self.fail_always.lock().unwrap() = Some(err);
        self
    }

    /// Fail requests for one page.
    pub fn fail_on_page(&self, page: u32, err: RemoteError) {
        *self.fail_on_page.lock().unwrap() = Some((page, err));
    }

    /// Stop failing.
    pub fn heal(&self) {
        *self.fail_always.lock().unwrap() = None;
        *self.fail_on_page.lock().unwrap() = None;
    }

    /// Replace the served records.
    pub fn set_records(&self, records: Vec<Record>) {
        *self.records.lock().unwrap() = records;
    }

    /// Replace or add one record.
    pub fn upsert(&self, record: Record) {
        let mut records = self.records.lock().unwrap();
        match records.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => *existing = record,
            None => records.push(record),
        }
    }

    /// Every `(query, page)` requested, in order.
    pub fn requests(&self) -> Vec<(FetchQuery, u32)> {
        self.requests.lock().unwrap().clone()
    }

    fn matches(query: &FetchQuery, record: &Record) -> bool {
        if let Some(since) = query.updated_since.as_deref().and_then(parse_timestamp)
            && record.updated_at_time().is_some_and(|t| t < since)
        {
            return false;
        }
        if !query.tags.is_empty() && !record.tags.iter().any(|t| query.tags.contains(t)) {
            return false;
        }
        if !query.folders.is_empty()
            && !record
                .folder_name
                .as_ref()
                .is_some_and(|f| query.folders.contains(f))
        {
            return false;
        }
        true
    }

    fn page(&self, query: &FetchQuery, page: u32) -> Result<RecordPage, RemoteError> {
        self.requests.lock().unwrap().push((query.clone(), page));

        if let Some(err) = self.fail_always.lock().unwrap().clone() {
            return Err(err);
        }
        if let Some((failing, err)) = self.fail_on_page.lock().unwrap().clone()
            && failing == page
        {
            return Err(err);
        }

        let matching: Vec<Record> = self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| Self::matches(query, r))
            .cloned()
            .collect();

        let per_page = self.page_size.unwrap_or(query.per_page.max(1) as usize);
        let total_items = matching.len();
        let total_pages = total_items.div_ceil(per_page).max(1);
        let start = (page as usize - 1) * per_page;
        let items: Vec<Record> = matching.into_iter().skip(start).take(per_page).collect();

        Ok(RecordPage {
            items,
            pagination: Pagination {
                current_page: page,
                total_pages: total_pages as u32,
                total_items: total_items as u64,
                per_page: per_page as u32,
                has_next_page: (page as usize) < total_pages,
                has_previous_page: page > 1,
            },
        })
    }
}

impl RemoteSource for ScriptedRemote {
    fn fetch_page<'a>(
        &'a self,
        query: &'a FetchQuery,
        page: u32,
    ) -> BoxFuture<'a, Result<RecordPage, RemoteError>> {
        let result = self.page(query, page);
        Box::pin(async move { result })
    }
}

/// Wraps an [`InMemoryFileSystem`], counting mutations and failing writes to chosen paths.
#[derive(Clone, Default)]
pub struct CountingFs {
    inner: InMemoryFileSystem,
    writes: Arc<AtomicUsize>,
    creates: Arc<AtomicUsize>,
    moves: Arc<AtomicUsize>,
    failing: Arc<Mutex<HashSet<PathBuf>>>,
}

impl CountingFs {
    /// Wrap `inner`.
    pub fn new(inner: InMemoryFileSystem) -> Self {
        Self {
            inner,
            ..Default::default()
        }
    }

    /// The wrapped filesystem.
    pub fn inner(&self) -> &InMemoryFileSystem {
        &self.inner
    }

    /// `write_file` calls so far.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// `create_new` calls so far.
    pub fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    /// `move_file` calls so far.
    pub fn moves(&self) -> usize {
        self.moves.load(Ordering::SeqCst)
    }

    /// Document mutations (writes, creates, moves).
    pub fn mutations(&self) -> usize {
        self.writes() + self.creates() + self.moves()
    }

    /// Reset all counters.
    pub fn reset_counts(&self) {
        self.writes.store(0, Ordering::SeqCst);
        self.creates.store(0, Ordering::SeqCst);
        self.moves.store(0, Ordering::SeqCst);
    }

    /// Make writes and creates at `path` fail.
    pub fn fail_writes_to(&self, path: impl Into<PathBuf>) {
        self.failing.lock().unwrap().insert(path.into());
    }

    fn check(&self, path: &Path) -> io::Result<()> {
        if self.failing.lock().unwrap().contains(path) {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "injected write failure"));
        }
        Ok(())
    }
}

impl FileSystem for CountingFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        self.inner.read_to_string(path)
    }

    fn write_file(&self, path: &Path, content: &str) -> io::Result<()> {
        self.check(path)?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.write_file(path, content)
    }

    fn create_new(&self, path: &Path, content: &str) -> io::Result<()> {
        self.check(path)?;
        self.creates.fetch_add(1, Ordering::SeqCst);
        self.inner.create_new(path, content)
    }

    fn delete_file(&self, path: &Path) -> io::Result<()> {
        self.inner.delete_file(path)
    }

    fn list_md_files(&self, dir: &Path) -> io::Result<Vec<PathBuf>> {
        self.inner.list_md_files(dir)
    }

    fn exists(&self, path: &Path) -> bool {
        self.inner.exists(path)
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        self.inner.create_dir_all(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.inner.is_dir(path)
    }

    fn move_file(&self, from: &Path, to: &Path) -> io::Result<()> {
        self.moves.fetch_add(1, Ordering::SeqCst);
        self.inner.move_file(from, to)
    }

    fn list_files(&self, dir: &Path) -> io::Result<Vec<PathBuf>> {
        self.inner.list_files(dir)
    }
}
