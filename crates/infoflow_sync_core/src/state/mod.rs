//! Persisted sync state.
//!
//! [`SyncState`] is the whole durable state of the engine: the cursor, the
//! advisory in-flight lock, the id→path index and the forced reimport queues.
//! It is small and always persisted whole through a [`StateStore`].

mod store;

pub use store::{FileStateStore, MemoryStateStore, StateStore};

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// The advisory lock held while a run executes.
///
/// Present only while a run is executing, or after a run crashed without
/// clearing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "camelCase")]
pub struct InFlightRun {
    /// Unique id of the run
    pub run_id: String,
    /// When the run took the lock (epoch milliseconds)
    #[ts(type = "number")]
    pub started_at_ms: i64,
    /// Lower fetch bound this run used, if any
    pub cursor: Option<String>,
    /// Records processed at the last checkpoint
    pub processed: u32,
}

/// Outcome of a finished run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// The run completed
    Success,
    /// The run aborted
    Failed,
}

/// Diagnostic record of the most recent run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "camelCase")]
pub struct SyncRunOutcome {
    /// Success or failure
    pub status: RunStatus,
    /// When the run finished (epoch milliseconds)
    #[ts(type = "number")]
    pub at_ms: i64,
    /// Human-readable error of a failed run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub error: Option<String>,
}

/// The full durable state of the sync engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "camelCase", default)]
pub struct SyncState {
    /// Highest `updatedAt` fully processed by the last successful run
    pub last_successful_cursor: Option<String>,
    /// Lock of the run in progress (or of a crashed run)
    pub in_flight_run: Option<InFlightRun>,
    /// Record id → last known document path. A cache; always revalidated.
    pub item_path_index: BTreeMap<String, String>,
    /// Ids the user asked to reimport
    pub reimport_queue: Vec<String>,
    /// Ids whose documents were deleted locally
    pub deleted_resync_queue: Vec<String>,
    /// Outcome of the most recent run
    pub last_run: Option<SyncRunOutcome>,
}

fn push_unique(queue: &mut Vec<String>, id: &str) -> bool {
    if id.is_empty() || queue.iter().any(|queued| queued == id) {
        return false;
    }
    queue.push(id.to_string());
    true
}

impl SyncState {
    /// Queue a record for forced reimport. Returns whether it was newly queued.
    pub fn enqueue_reimport(&mut self, id: &str) -> bool {
        push_unique(&mut self.reimport_queue, id)
    }

    /// Queue a locally deleted record for re-creation. Returns whether it was newly queued.
    pub fn enqueue_deleted_resync(&mut self, id: &str) -> bool {
        push_unique(&mut self.deleted_resync_queue, id)
    }

    /// Union of both forced queues, in queue order.
    pub fn forced_ids(&self) -> Vec<String> {
        let mut ids = Vec::new();
        for id in self.reimport_queue.iter().chain(&self.deleted_resync_queue) {
            push_unique(&mut ids, id);
        }
        ids
    }

    /// Whether the next run is a forced reimport.
    pub fn is_forced(&self) -> bool {
        !self.reimport_queue.is_empty() || !self.deleted_resync_queue.is_empty()
    }

    /// Indexed path of a record.
    pub fn path_for(&self, id: &str) -> Option<&str> {
        self.item_path_index
            .get(id)
            .map(String::as_str)
            .filter(|p| !p.is_empty())
    }

    /// Reverse lookup: the record indexed at `path`.
    pub fn id_for_path(&self, path: &str) -> Option<&str> {
        self.item_path_index
            .iter()
            .find(|(_, indexed)| indexed.as_str() == path)
            .map(|(id, _)| id.as_str())
    }

    /// Record where a document lives. Returns whether the index changed.
    pub fn set_path(&mut self, id: &str, path: &str) -> bool {
        if self.item_path_index.get(id).map(String::as_str) == Some(path) {
            return false;
        }
        self.item_path_index.insert(id.to_string(), path.to_string());
        true
    }

    /// Milliseconds the current lock has been held, if any.
    pub fn lock_age_ms(&self, now_ms: i64) -> Option<i64> {
        self.in_flight_run
            .as_ref()
            .map(|run| now_ms.saturating_sub(run.started_at_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state_shape() {
        let json = serde_json::to_value(SyncState::default()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "lastSuccessfulCursor": null,
                "inFlightRun": null,
                "itemPathIndex": {},
                "reimportQueue": [],
                "deletedResyncQueue": [],
                "lastRun": null
            })
        );
    }

    #[test]
    fn test_queues_deduplicate() {
        let mut state = SyncState::default();
        assert!(state.enqueue_reimport("a"));
        assert!(!state.enqueue_reimport("a"));
        assert!(!state.enqueue_reimport(""));
        assert!(state.enqueue_deleted_resync("a"));
        assert!(state.enqueue_deleted_resync("b"));
        assert!(state.is_forced());
        assert_eq!(state.forced_ids(), vec!["a", "b"]);
    }

    #[test]
    fn test_index_lookups() {
        let mut state = SyncState::default();
        assert!(state.set_path("x", "InfoFlow/X.md"));
        assert!(!state.set_path("x", "InfoFlow/X.md"));
        assert_eq!(state.path_for("x"), Some("InfoFlow/X.md"));
        assert_eq!(state.id_for_path("InfoFlow/X.md"), Some("x"));
        assert_eq!(state.id_for_path("InfoFlow/Y.md"), None);

        state.item_path_index.insert("empty".into(), String::new());
        assert_eq!(state.path_for("empty"), None);
    }

    #[test]
    fn test_outcome_serialization() {
        let outcome = SyncRunOutcome {
            status: RunStatus::Failed,
            at_ms: 5,
            error: Some("boom".into()),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json, serde_json::json!({"status": "failed", "atMs": 5, "error": "boom"}));

        let ok: SyncRunOutcome = serde_json::from_str(r#"{"status":"success","atMs":7}"#).unwrap();
        assert_eq!(ok.error, None);
    }

    #[test]
    fn test_lock_age() {
        let mut state = SyncState::default();
        assert_eq!(state.lock_age_ms(10), None);
        state.in_flight_run = Some(InFlightRun {
            run_id: "r".into(),
            started_at_ms: 4,
            cursor: None,
            processed: 0,
        });
        assert_eq!(state.lock_age_ms(10), Some(6));
    }
}
