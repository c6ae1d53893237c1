//! Document events reported by the host.
//!
//! The host (vault UI, file watcher) observes renames and deletions that
//! happen outside a sync run and forwards them to
//! [`SyncManager::handle_event`](crate::sync::SyncManager::handle_event) so
//! the identity index stays valid without a full rescan.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// A change to a document made outside a sync run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(tag = "type")]
pub enum DocumentEvent {
    /// A document was renamed or moved.
    Renamed {
        /// Vault-relative path before the rename.
        #[serde(rename = "oldPath")]
        old_path: String,
        /// Vault-relative path after the rename.
        #[serde(rename = "newPath")]
        new_path: String,
    },

    /// A document was deleted (or moved to the trash).
    Deleted {
        /// Vault-relative path of the deleted document.
        path: String,
        /// Record id from the document's frontmatter, if the host still had it cached.
        #[serde(default, rename = "frontmatterId")]
        frontmatter_id: Option<String>,
    },
}

impl DocumentEvent {
    /// The path the event is about (the new path for renames).
    pub fn path(&self) -> &str {
        match self {
            DocumentEvent::Renamed { new_path, .. } => new_path,
            DocumentEvent::Deleted { path, .. } => path,
        }
    }
}
