#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

/// Wall clock abstraction
pub mod clock;

/// Settings (credential, templates, filters)
pub mod config;

/// Error (common error types)
pub mod error;

/// Document store abstraction
pub mod fs;

/// Frontmatter parsing helpers
pub mod frontmatter;

/// HTML to markdown conversion for record content
pub mod html;

/// Identity and managed-region merge protocol
pub mod managed;

/// Path utilities (normalisation, collision candidates)
pub mod path_utils;

/// Throttled status messages
pub mod progress;

/// Remote source contract and record types
pub mod remote;

/// Persisted sync state and state stores
pub mod state;

/// Sync orchestrator, reconciliation and event hooks
pub mod sync;

/// Mustache-subset templates for file names and note bodies
pub mod template;

#[cfg(test)]
pub mod test_utils;

pub use clock::{Clock, SystemClock};
pub use config::SyncSettings;
pub use error::{Result, SyncError};
pub use state::{FileStateStore, MemoryStateStore, StateStore, SyncState};
pub use sync::{SyncManager, SyncOptions, SyncOutcome};
