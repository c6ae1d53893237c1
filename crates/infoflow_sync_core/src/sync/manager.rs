//! The sync orchestrator.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};

use super::reconcile::Reconciler;
use super::{
    CHECKPOINT_INTERVAL, LOCK_TIMEOUT, RecordFailure, RunSummary, STATUS_INTERVAL, SyncMode,
    SyncOptions, SyncOutcome, advance_cursor, compute_cursor_start,
};
use crate::clock::{Clock, from_millis};
use crate::config::SyncSettings;
use crate::error::{Result, SyncError};
use crate::fs::AsyncFileSystem;
use crate::path_utils::{normalize_path, to_store_path};
use crate::progress::StatusQueue;
use crate::remote::{FetchProgressCallback, RemoteSource, fetch_all};
use crate::state::{InFlightRun, RunStatus, StateStore, SyncRunOutcome, SyncState};

/// Drives synchronization runs.
///
/// Constructed once per process with every collaborator injected. The
/// manager itself holds no sync state; callers own the [`SyncState`] (usually
/// loaded through [`SyncManager::store`]) and pass it to every operation, so
/// a run and a hook can never mutate it at the same time.
pub struct SyncManager<FS, R, S>
where
    FS: AsyncFileSystem,
    R: RemoteSource,
    S: StateStore,
{
    pub(super) fs: FS,
    pub(super) vault_root: PathBuf,
    remote: R,
    pub(super) store: S,
    clock: Arc<dyn Clock>,
    pub(super) status: StatusQueue,
}

impl<FS, R, S> SyncManager<FS, R, S>
where
    FS: AsyncFileSystem,
    R: RemoteSource,
    S: StateStore,
{
    /// Create a manager for the vault at `vault_root`.
    pub fn new(
        fs: FS,
        vault_root: impl Into<PathBuf>,
        remote: R,
        store: S,
        clock: Arc<dyn Clock>,
        status: StatusQueue,
    ) -> Self {
        Self {
            fs,
            vault_root: vault_root.into(),
            remote,
            store,
            clock,
            status,
        }
    }

    /// The document store.
    pub fn fs(&self) -> &FS {
        &self.fs
    }

    /// The vault root on the document store.
    pub fn vault_root(&self) -> &Path {
        &self.vault_root
    }

    /// The state store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The status queue.
    pub fn status(&self) -> &StatusQueue {
        &self.status
    }

    /// Persist `state`, logging failures.
    pub(super) async fn persist(&self, state: &SyncState) -> Result<()> {
        self.store.persist(state).await.inspect_err(|e| {
            error!("Failed to persist sync state: {}", e);
        })
    }

    /// Run one synchronization.
    ///
    /// Configuration errors and lock contention return before any state is
    /// touched. Once the lock is taken every exit path clears it again.
    pub async fn sync(
        &self,
        state: &mut SyncState,
        settings: &SyncSettings,
        options: SyncOptions,
    ) -> Result<SyncOutcome> {
        if !settings.has_credential() {
            return Err(SyncError::MissingCredential);
        }

        let now_ms = self.clock.now_ms();
        let mut stale_lock = None;
        if let Some(run) = &state.in_flight_run
            && let Some(age_ms) = state.lock_age_ms(now_ms)
        {
            if age_ms < LOCK_TIMEOUT.as_millis() as i64 {
                if options.auto {
                    info!("Auto sync skipped: run {} is still in progress", run.run_id);
                    return Ok(SyncOutcome::Skipped {
                        running: run.run_id.clone(),
                    });
                }
                return Err(SyncError::AlreadyRunning {
                    run_id: run.run_id.clone(),
                    started_at: from_millis(run.started_at_ms),
                });
            }
            stale_lock = Some((run.run_id.clone(), age_ms));
        }

        let (file_name_template, note_template) = settings.validate_templates()?;
        self.ensure_target_folder(&settings.target_folder).await?;

        if let Some((run_id, age_ms)) = stale_lock {
            warn!(
                "Clearing stale sync lock {} held for {}s (presumed crashed)",
                run_id,
                age_ms / 1000
            );
            state.in_flight_run = None;
        }

        // Fetch window
        let forced = state.is_forced();
        let forced_ids: HashSet<String> = state.forced_ids().into_iter().collect();
        let cursor_before = state.last_successful_cursor.clone();
        let cursor_start = compute_cursor_start(cursor_before.as_deref());
        let mode = if forced {
            SyncMode::Forced
        } else if cursor_start.is_some() {
            SyncMode::Incremental
        } else {
            SyncMode::Full
        };
        let run_cursor = if forced { None } else { cursor_start };
        let query = settings.fetch_query(run_cursor.clone());

        // Acquire the lock
        let run_id = uuid::Uuid::new_v4().to_string();
        state.in_flight_run = Some(InFlightRun {
            run_id: run_id.clone(),
            started_at_ms: now_ms,
            cursor: run_cursor,
            processed: 0,
        });
        if let Err(e) = self.persist(state).await {
            state.in_flight_run = None;
            return Err(e);
        }
        info!(
            "Sync {} started ({:?}, auto={}, cursor={:?})",
            run_id, mode, options.auto, query.updated_since
        );
        self.status.enqueue(
            if options.auto {
                "Auto sync started"
            } else {
                "Sync started"
            },
            Duration::from_secs(2),
            true,
        );

        // Fetch everything up front
        let on_progress: FetchProgressCallback<'_> = &|so_far, total| {
            self.status.enqueue(
                &format!("Fetching items {}/{}", so_far, total),
                Duration::from_secs(1),
                false,
            );
        };
        let mut records = match fetch_all(&self.remote, &query, Some(on_progress)).await {
            Ok(records) => records,
            Err(e) => {
                let err = SyncError::Remote(e);
                self.fail_run(state, &err).await;
                return Err(err);
            }
        };

        let mut summary = RunSummary::new(run_id, mode, cursor_before.clone());
        summary.fetched = records.len();
        if forced {
            records.retain(|record| forced_ids.contains(&record.id));
            debug!(
                "Forced run: processing {} of {} fetched records",
                records.len(),
                summary.fetched
            );
        }

        let reconciler = Reconciler::new(
            &self.fs,
            &self.vault_root,
            self.clock.as_ref(),
            &settings.target_folder,
            &file_name_template,
            &note_template,
        );

        let total = records.len();
        let mut succeeded = Vec::new();
        let mut failed = Vec::new();
        for (index, record) in records.iter().enumerate() {
            let processed = (index + 1) as u32;

            let index_changed = match reconciler.upsert(state, record).await {
                Ok(reconciled) => {
                    debug!("{}: {:?}", record.id, reconciled.outcome);
                    summary.record(&reconciled.outcome);
                    if let Some(t) = record.updated_at_time() {
                        succeeded.push(t);
                    }
                    reconciled.index_changed
                }
                Err(e) => {
                    warn!("Failed to sync {} ({}): {}", record.id, record.title, e);
                    self.status
                        .notice(&format!("InfoFlow: failed to sync \"{}\": {}", record.title, e));
                    failed.push(record.updated_at_time());
                    summary.failures.push(RecordFailure {
                        id: record.id.clone(),
                        title: record.title.clone(),
                        updated_at: record.updated_at.clone(),
                        message: e.to_string(),
                    });
                    false
                }
            };

            if let Some(run) = state.in_flight_run.as_mut() {
                run.processed = processed;
            }
            if (index_changed || processed % CHECKPOINT_INTERVAL == 0)
                && let Err(e) = self.persist(state).await
            {
                self.fail_run(state, &e).await;
                return Err(e);
            }

            if processed % STATUS_INTERVAL == 0 {
                self.status.enqueue(
                    &format!("Synced {}/{}", processed, total),
                    Duration::from_secs(2),
                    false,
                );
            }
        }
        summary.processed = total;

        // Finish
        let cursor_after = if forced {
            cursor_before
        } else {
            advance_cursor(cursor_before.as_deref(), succeeded, &failed)
        };
        summary.cursor_after = cursor_after.clone();

        // Committed only once persisted; a failed write leaves cursor and queues as they were
        let mut finished = state.clone();
        finished.last_successful_cursor = cursor_after;
        finished.reimport_queue.clear();
        finished.deleted_resync_queue.clear();
        finished.in_flight_run = None;
        finished.last_run = Some(SyncRunOutcome {
            status: RunStatus::Success,
            at_ms: self.clock.now_ms(),
            error: None,
        });
        if let Err(e) = self.persist(&finished).await {
            self.fail_run(state, &e).await;
            return Err(e);
        }
        *state = finished;

        info!("Sync {} complete: {}", summary.run_id, summary.describe());
        self.status
            .enqueue("Sync complete", Duration::from_secs(3), true);
        self.status
            .notice(&format!("InfoFlow sync completed ({})", summary.describe()));

        Ok(SyncOutcome::Completed(summary))
    }

    async fn ensure_target_folder(&self, folder: &str) -> Result<()> {
        let path = to_store_path(&self.vault_root, &normalize_path(folder));
        if self.fs.exists(&path).await {
            return Ok(());
        }
        debug!("Creating target folder {:?}", path);
        self.fs
            .create_dir_all(&path)
            .await
            .map_err(|source| SyncError::CreateFolder { path, source })
    }

    /// Abort a run: clear the lock, record the failure, tell the user.
    async fn fail_run(&self, state: &mut SyncState, err: &SyncError) {
        let message = err.to_string();
        error!("Sync failed: {}", message);

        state.in_flight_run = None;
        state.last_run = Some(SyncRunOutcome {
            status: RunStatus::Failed,
            at_ms: self.clock.now_ms(),
            error: Some(message.clone()),
        });
        // Already logged; the original error is what the caller sees
        let _ = self.persist(state).await;

        self.status.enqueue(
            &format!("Sync failed: {}", message),
            Duration::from_secs(5),
            true,
        );
        self.status
            .notice(&format!("InfoFlow sync failed: {}", message));
    }
}
