//! Sync orchestration.
//!
//! [`SyncManager::sync`] drives one pull from the remote into the vault:
//! lock acquisition, fetch window computation, per-record reconciliation,
//! checkpointing, cursor advancement and outcome recording. The rename and
//! delete hooks in [`hooks`] keep the id→path index honest between runs.
//!
//! # Run modes
//!
//! - **Full**: no cursor yet, every record matching the filters is fetched.
//! - **Incremental**: records updated since `cursor - CURSOR_OVERLAP`.
//! - **Forced**: the reimport or deleted-resync queue is non-empty. The
//!   fetch ignores the cursor, only queued ids are processed and the cursor
//!   is left unchanged.

pub mod hooks;
mod manager;
pub mod reconcile;
#[cfg(feature = "scheduler")]
pub mod scheduler;

pub use manager::SyncManager;
pub use reconcile::{Reconciled, Reconciler};

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::remote::{format_timestamp, parse_timestamp};

/// A lock younger than this blocks new runs; an older one is presumed crashed.
pub const LOCK_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Subtracted from the cursor to form the fetch lower bound.
pub const CURSOR_OVERLAP: Duration = Duration::from_secs(5 * 60);

/// Persist a checkpoint every this many processed records.
pub const CHECKPOINT_INTERVAL: u32 = 10;

/// Post a progress status every this many processed records.
pub const STATUS_INTERVAL: u32 = 25;

/// Numbered alternatives tried before falling back to a timestamp suffix.
pub const MAX_COLLISION_SUFFIX: u32 = 50;

/// How a run was triggered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOptions {
    /// Timer-driven. Auto runs that meet a live lock skip quietly.
    pub auto: bool,
}

impl SyncOptions {
    /// A user-triggered run.
    pub fn manual() -> Self {
        Self { auto: false }
    }

    /// A timer-triggered run.
    pub fn auto() -> Self {
        Self { auto: true }
    }
}

/// Which records a run fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// No cursor; everything matching the filters
    Full,
    /// Records updated since the cursor (minus the overlap)
    Incremental,
    /// Only the queued reimport / deleted ids
    Forced,
}

/// What happened to one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RecordOutcome {
    /// A new document was created
    Created {
        /// Where
        path: String,
    },
    /// An existing document was renamed and/or its managed region rewritten
    Updated {
        /// Current path
        path: String,
        /// Previous path, when the document moved
        renamed_from: Option<String>,
    },
    /// Nothing to write
    Unchanged {
        /// Current path
        path: String,
    },
}

impl RecordOutcome {
    /// Document path after reconciliation.
    pub fn path(&self) -> &str {
        match self {
            RecordOutcome::Created { path }
            | RecordOutcome::Updated { path, .. }
            | RecordOutcome::Unchanged { path } => path,
        }
    }
}

/// A record that could not be written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordFailure {
    /// Record id
    pub id: String,
    /// Record title, for messages
    pub title: String,
    /// Remote `updatedAt` of the record
    pub updated_at: String,
    /// Human-readable error
    pub message: String,
}

/// Summary of a completed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Run id (also the lock id)
    pub run_id: String,
    /// Fetch mode
    pub mode: SyncMode,
    /// Records returned by the remote
    pub fetched: usize,
    /// Records processed (after the forced-id filter)
    pub processed: usize,
    /// Documents created
    pub created: usize,
    /// Documents whose managed region or path changed
    pub updated: usize,
    /// Documents moved to a new desired path
    pub renamed: usize,
    /// Documents already up to date
    pub unchanged: usize,
    /// Records that failed
    pub failures: Vec<RecordFailure>,
    /// Cursor before the run
    pub cursor_before: Option<String>,
    /// Cursor after the run
    pub cursor_after: Option<String>,
}

impl RunSummary {
    pub(crate) fn new(run_id: String, mode: SyncMode, cursor_before: Option<String>) -> Self {
        Self {
            run_id,
            mode,
            fetched: 0,
            processed: 0,
            created: 0,
            updated: 0,
            renamed: 0,
            unchanged: 0,
            failures: Vec::new(),
            cursor_after: cursor_before.clone(),
            cursor_before,
        }
    }

    pub(crate) fn record(&mut self, outcome: &RecordOutcome) {
        match outcome {
            RecordOutcome::Created { .. } => self.created += 1,
            RecordOutcome::Updated { renamed_from, .. } => {
                self.updated += 1;
                if renamed_from.is_some() {
                    self.renamed += 1;
                }
            }
            RecordOutcome::Unchanged { .. } => self.unchanged += 1,
        }
    }

    /// One-line human summary.
    pub fn describe(&self) -> String {
        let mut text = format!(
            "{} created, {} updated, {} unchanged",
            self.created, self.updated, self.unchanged
        );
        if !self.failures.is_empty() {
            text.push_str(&format!(", {} failed", self.failures.len()));
        }
        text
    }
}

/// Result of a `sync` call that did not error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The run finished
    Completed(RunSummary),
    /// An automatic run found another run holding the lock
    Skipped {
        /// Id of the run holding the lock
        running: String,
    },
}

/// Fetch lower bound for a cursor: `cursor - CURSOR_OVERLAP`, never before the epoch.
///
/// An unparseable cursor is passed through untouched; `None` means a full fetch.
pub fn compute_cursor_start(cursor: Option<&str>) -> Option<String> {
    let cursor = cursor.map(str::trim).filter(|c| !c.is_empty())?;
    match parse_timestamp(cursor) {
        Some(t) => {
            let overlap = chrono::Duration::from_std(CURSOR_OVERLAP).unwrap_or_else(|_| chrono::Duration::zero());
            let start = (t - overlap).max(DateTime::<Utc>::UNIX_EPOCH);
            Some(format_timestamp(start))
        }
        None => Some(cursor.to_string()),
    }
}

/// Cursor after a non-forced run.
///
/// The highest `updatedAt` among successfully processed records, never
/// below the previous cursor. When records failed, the cursor stops at the
/// earliest failed `updatedAt` so the next run fetches them again.
pub fn advance_cursor(
    previous: Option<&str>,
    succeeded: impl IntoIterator<Item = DateTime<Utc>>,
    failed: &[Option<DateTime<Utc>>],
) -> Option<String> {
    let previous_time = previous.and_then(parse_timestamp);

    let mut candidate = succeeded.into_iter().max();
    if !failed.is_empty() {
        // A failed record without a usable timestamp pins the cursor
        if failed.iter().any(Option::is_none) {
            return previous.map(str::to_string);
        }
        let earliest_failed = failed.iter().flatten().min().copied();
        candidate = match (candidate, earliest_failed) {
            (Some(c), Some(f)) => Some(c.min(f)),
            (None, _) => None,
            (c, None) => c,
        };
    }

    match (candidate, previous_time) {
        (Some(c), Some(p)) if c <= p => previous.map(str::to_string),
        (Some(c), _) => Some(format_timestamp(c)),
        (None, _) => previous.map(str::to_string),
    }
}
