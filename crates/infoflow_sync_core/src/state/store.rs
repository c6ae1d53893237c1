//! Sync state persistence.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::DateTime;
use log::{debug, warn};
use serde_json::{Map, Value};

use super::SyncState;
use crate::error::{Result, SyncError};
use crate::fs::{AsyncFileSystem, BoxFuture};
use crate::remote::format_timestamp;

/// Durable home of the [`SyncState`].
///
/// Whole-state overwrite on every persist; the state is small.
pub trait StateStore: Send + Sync {
    /// Load the state, filling absent or legacy fields with defaults.
    fn load(&self) -> BoxFuture<'_, Result<SyncState>>;

    /// Persist the whole state.
    fn persist<'a>(&'a self, state: &'a SyncState) -> BoxFuture<'a, Result<()>>;
}

impl<T: StateStore + ?Sized> StateStore for std::sync::Arc<T> {
    fn load(&self) -> BoxFuture<'_, Result<SyncState>> {
        (**self).load()
    }

    fn persist<'a>(&'a self, state: &'a SyncState) -> BoxFuture<'a, Result<()>> {
        (**self).persist(state)
    }
}

/// Bring an older or partially written state document up to the current shape.
///
/// - `null` collections become empty
/// - non-string index entries are dropped
/// - a legacy `lastSyncTime` (epoch ms) seeds a missing cursor
fn upgrade(mut value: Value) -> Value {
    let Some(obj) = value.as_object_mut() else {
        warn!("Sync state is not a JSON object; starting from defaults");
        return Value::Object(Map::new());
    };

    match obj.get_mut("itemPathIndex") {
        Some(Value::Object(index)) => index.retain(|_, path| path.is_string()),
        Some(other) => *other = Value::Object(Map::new()),
        None => {}
    }

    for key in ["reimportQueue", "deletedResyncQueue"] {
        match obj.get_mut(key) {
            Some(Value::Array(ids)) => ids.retain(|id| id.as_str().is_some_and(|s| !s.is_empty())),
            Some(other) => *other = Value::Array(Vec::new()),
            None => {}
        }
    }

    if let Some(cursor) = obj.get("lastSuccessfulCursor")
        && !cursor.is_string()
        && !cursor.is_null()
    {
        obj.insert("lastSuccessfulCursor".into(), Value::Null);
    }

    let has_cursor = obj
        .get("lastSuccessfulCursor")
        .is_some_and(|c| c.as_str().is_some_and(|s| !s.is_empty()));
    if !has_cursor
        && let Some(ms) = obj.get("lastSyncTime").and_then(Value::as_i64)
        && let Some(at) = DateTime::from_timestamp_millis(ms)
    {
        debug!("Upgrading legacy lastSyncTime {} to a cursor", ms);
        obj.insert(
            "lastSuccessfulCursor".into(),
            Value::String(format_timestamp(at)),
        );
    }
    obj.remove("lastSyncTime");

    value
}

/// Parse a persisted state document.
pub(crate) fn parse_state(content: &str) -> Result<SyncState> {
    if content.trim().is_empty() {
        return Ok(SyncState::default());
    }
    let value: Value = serde_json::from_str(content)?;
    Ok(serde_json::from_value(upgrade(value))?)
}

/// State stored as a JSON file on the document store.
pub struct FileStateStore<FS: AsyncFileSystem> {
    fs: FS,
    path: PathBuf,
}

impl<FS: AsyncFileSystem> FileStateStore<FS> {
    /// Create a store persisting to `path`.
    pub fn new(fs: FS, path: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            path: path.into(),
        }
    }

    /// Location of the state file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load_inner(&self) -> Result<SyncState> {
        if !self.fs.exists(&self.path).await {
            debug!("No sync state at {:?}; using defaults", self.path);
            return Ok(SyncState::default());
        }
        let content = self
            .fs
            .read_to_string(&self.path)
            .await
            .map_err(|source| SyncError::FileRead {
                path: self.path.clone(),
                source,
            })?;
        parse_state(&content)
    }

    async fn persist_inner(&self, state: &SyncState) -> Result<()> {
        let content = serde_json::to_string_pretty(state)?;
        self.fs
            .write_file(&self.path, &content)
            .await
            .map_err(|source| SyncError::FileWrite {
                path: self.path.clone(),
                source,
            })
    }
}

impl<FS: AsyncFileSystem> StateStore for FileStateStore<FS> {
    fn load(&self) -> BoxFuture<'_, Result<SyncState>> {
        Box::pin(self.load_inner())
    }

    fn persist<'a>(&'a self, state: &'a SyncState) -> BoxFuture<'a, Result<()>> {
        Box::pin(self.persist_inner(state))
    }
}

/// In-memory store that keeps every persisted snapshot.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    snapshots: Mutex<Vec<SyncState>>,
}

impl MemoryStateStore {
    /// Empty store; `load` returns defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store whose `load` returns `state`.
    pub fn with_state(state: SyncState) -> Self {
        Self {
            snapshots: Mutex::new(vec![state]),
        }
    }

    /// Every persisted state, oldest first.
    pub fn snapshots(&self) -> Vec<SyncState> {
        self.snapshots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The most recently persisted state.
    pub fn latest(&self) -> Option<SyncState> {
        self.snapshots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }

    /// Number of snapshots recorded.
    pub fn persist_count(&self) -> usize {
        self.snapshots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self) -> BoxFuture<'_, Result<SyncState>> {
        let state = self.latest().unwrap_or_default();
        Box::pin(async move { Ok(state) })
    }

    fn persist<'a>(&'a self, state: &'a SyncState) -> BoxFuture<'a, Result<()>> {
        self.snapshots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(state.clone());
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::{InMemoryFileSystem, SyncToAsyncFs};
    use crate::state::{InFlightRun, RunStatus, SyncRunOutcome};
    use futures_lite::future::block_on;

    #[test]
    fn test_missing_file_loads_defaults() {
        let fs = SyncToAsyncFs::new(InMemoryFileSystem::new());
        let store = FileStateStore::new(fs, "/vault/.infoflow/state.json");
        assert_eq!(block_on(store.load()).unwrap(), SyncState::default());
    }

    #[test]
    fn test_file_store_round_trip() {
        let fs = SyncToAsyncFs::new(InMemoryFileSystem::new());
        let store = FileStateStore::new(fs.clone(), "/vault/.infoflow/state.json");

        let mut state = SyncState::default();
        state.last_successful_cursor = Some("2024-01-01T00:00:00.000Z".into());
        state.set_path("a", "InfoFlow/A.md");
        state.enqueue_reimport("b");
        state.in_flight_run = Some(InFlightRun {
            run_id: "r1".into(),
            started_at_ms: 1_700_000_000_000,
            cursor: None,
            processed: 10,
        });
        state.last_run = Some(SyncRunOutcome {
            status: RunStatus::Success,
            at_ms: 1,
            error: None,
        });

        block_on(store.persist(&state)).unwrap();
        assert_eq!(block_on(store.load()).unwrap(), state);

        let raw = block_on(fs.read_to_string(store.path())).unwrap();
        assert!(raw.contains("\"itemPathIndex\""));
        assert!(raw.contains("\"startedAtMs\": 1700000000000"));
    }

    #[test]
    fn test_partial_and_null_fields_default() {
        let state = parse_state(
            r#"{"lastSuccessfulCursor":"2024-01-01T00:00:00Z","itemPathIndex":null,"reimportQueue":null,"deletedResyncQueue":["x", 3, ""]}"#,
        )
        .unwrap();
        assert_eq!(state.last_successful_cursor.as_deref(), Some("2024-01-01T00:00:00Z"));
        assert!(state.item_path_index.is_empty());
        assert!(state.reimport_queue.is_empty());
        assert_eq!(state.deleted_resync_queue, vec!["x"]);
        assert!(state.in_flight_run.is_none());
        assert!(state.last_run.is_none());
    }

    #[test]
    fn test_legacy_last_sync_time_seeds_cursor() {
        let state = parse_state(r#"{"lastSyncTime":1704067200000,"itemPathIndex":{"a":"A.md","b":5}}"#).unwrap();
        assert_eq!(state.last_successful_cursor.as_deref(), Some("2024-01-01T00:00:00.000Z"));
        assert_eq!(state.item_path_index.len(), 1);
    }

    #[test]
    fn test_garbage_shapes() {
        assert_eq!(parse_state("").unwrap(), SyncState::default());
        assert_eq!(parse_state("[1,2]").unwrap(), SyncState::default());
        assert!(parse_state("{not json").is_err());
    }

    #[test]
    fn test_memory_store_records_snapshots() {
        let store = MemoryStateStore::new();
        let mut state = SyncState::default();
        block_on(store.persist(&state)).unwrap();
        state.enqueue_reimport("x");
        block_on(store.persist(&state)).unwrap();

        assert_eq!(store.persist_count(), 2);
        assert!(store.snapshots()[0].reimport_queue.is_empty());
        assert_eq!(block_on(store.load()).unwrap(), state);
    }
}
