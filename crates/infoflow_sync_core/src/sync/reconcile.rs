//! Document reconciliation.
//!
//! Given a record and its rendered body, locate or create the one document
//! that serves it, move it to its desired path when that path is free, and
//! merge the body into the managed region. Re-running with identical remote
//! data writes nothing.

use std::path::{Path, PathBuf};

use log::{debug, warn};

use super::{MAX_COLLISION_SUFFIX, RecordOutcome};
use crate::clock::Clock;
use crate::error::{Result, SyncError};
use crate::fs::AsyncFileSystem;
use crate::managed::{self, build_new_document, upsert_managed_block};
use crate::path_utils::{
    collision_candidates, desired_document_path, normalize_path, timestamp_candidate,
    to_store_path, to_vault_path,
};
use crate::remote::Record;
use crate::state::SyncState;
use crate::template::{RenderContext, Template, render_file_name};

/// Result of reconciling one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciled {
    /// What happened to the document
    pub outcome: RecordOutcome,
    /// Whether `item_path_index` changed
    pub index_changed: bool,
}

/// A document located for a record.
struct Located {
    path: String,
    text: String,
}

/// Reconciles records against the document store.
pub struct Reconciler<'a, FS: AsyncFileSystem> {
    fs: &'a FS,
    vault_root: &'a Path,
    clock: &'a dyn Clock,
    target_folder: String,
    file_name_template: &'a Template,
    note_template: &'a Template,
}

impl<'a, FS: AsyncFileSystem> Reconciler<'a, FS> {
    /// Create a reconciler for one run.
    pub fn new(
        fs: &'a FS,
        vault_root: &'a Path,
        clock: &'a dyn Clock,
        target_folder: &str,
        file_name_template: &'a Template,
        note_template: &'a Template,
    ) -> Self {
        Self {
            fs,
            vault_root,
            clock,
            target_folder: normalize_path(target_folder),
            file_name_template,
            note_template,
        }
    }

    fn store_path(&self, vault_path: &str) -> PathBuf {
        to_store_path(self.vault_root, vault_path)
    }

    async fn exists(&self, vault_path: &str) -> bool {
        self.fs.exists(&self.store_path(vault_path)).await
    }

    /// Read a document and return it if its frontmatter carries `id`.
    async fn read_if_owned(&self, vault_path: &str, id: &str) -> Option<Located> {
        let store_path = self.store_path(vault_path);
        if !self.fs.exists(&store_path).await {
            return None;
        }
        match self.fs.read_to_string(&store_path).await {
            Ok(text) if managed::frontmatter_id(&text).as_deref() == Some(id) => Some(Located {
                path: vault_path.to_string(),
                text,
            }),
            Ok(_) => None,
            Err(e) => {
                warn!("Could not read {}: {}", vault_path, e);
                None
            }
        }
    }

    /// Exhaustive scan of every markdown document in the vault for `id`.
    async fn scan_for(&self, id: &str) -> Result<Option<Located>> {
        let files = self.fs.list_md_files_recursive(self.vault_root).await?;
        for store_path in files {
            let Some(vault_path) = to_vault_path(self.vault_root, &store_path) else {
                continue;
            };
            let Ok(text) = self.fs.read_to_string(&store_path).await else {
                continue;
            };
            if managed::frontmatter_id(&text).as_deref() == Some(id) {
                return Ok(Some(Located {
                    path: vault_path,
                    text,
                }));
            }
        }
        Ok(None)
    }

    /// Locate the document serving `id`: the cached index path if it still
    /// holds the record, otherwise a full scan.
    async fn locate(&self, state: &SyncState, id: &str) -> Result<Option<Located>> {
        if let Some(cached) = state.path_for(id) {
            if let Some(found) = self.read_if_owned(cached, id).await {
                return Ok(Some(found));
            }
            debug!("Index entry for {} at {} is stale; scanning", id, cached);
        }
        self.scan_for(id).await
    }

    /// First free path among the desired one, numbered alternatives and a timestamped name.
    async fn available_path(&self, base_name: &str, desired: &str) -> String {
        if !self.exists(desired).await {
            return desired.to_string();
        }
        for candidate in collision_candidates(&self.target_folder, base_name, MAX_COLLISION_SUFFIX) {
            if !self.exists(&candidate).await {
                return candidate;
            }
        }
        timestamp_candidate(&self.target_folder, base_name, self.clock.now_ms())
    }

    /// Reconcile one record, updating `state.item_path_index`.
    pub async fn upsert(&self, state: &mut SyncState, record: &Record) -> Result<Reconciled> {
        let ctx = RenderContext::from_record(record);
        let base_name = render_file_name(self.file_name_template, &ctx);
        let desired = desired_document_path(&self.target_folder, &base_name);
        let body = self.note_template.render_context(&ctx);

        let Some(located) = self.locate(state, &record.id).await? else {
            let path = self.available_path(&base_name, &desired).await;
            let contents = build_new_document(record, &body);
            self.fs
                .create_new(&self.store_path(&path), &contents)
                .await
                .map_err(|source| SyncError::FileWrite {
                    path: PathBuf::from(&path),
                    source,
                })?;
            debug!("Created {} for {}", path, record.id);
            let index_changed = state.set_path(&record.id, &path);
            return Ok(Reconciled {
                outcome: RecordOutcome::Created { path },
                index_changed,
            });
        };

        let mut path = located.path;
        let mut renamed_from = None;
        if path != desired {
            if self.exists(&desired).await {
                debug!(
                    "Keeping {} for {}: desired path {} is taken",
                    path, record.id, desired
                );
            } else {
                self.fs
                    .move_file(&self.store_path(&path), &self.store_path(&desired))
                    .await
                    .map_err(|source| SyncError::Rename {
                        from: PathBuf::from(&path),
                        to: PathBuf::from(&desired),
                        source,
                    })?;
                debug!("Renamed {} to {}", path, desired);
                renamed_from = Some(std::mem::replace(&mut path, desired));
            }
        }
        let index_changed = state.set_path(&record.id, &path);

        if !managed::has_managed_block(&located.text) {
            debug!("{} has no managed region; appending one", path);
        }
        let merged = upsert_managed_block(&located.text, &body);
        let content_changed = merged != located.text;
        if content_changed {
            self.fs
                .write_file(&self.store_path(&path), &merged)
                .await
                .map_err(|source| SyncError::FileWrite {
                    path: PathBuf::from(&path),
                    source,
                })?;
        }

        let outcome = if content_changed || renamed_from.is_some() {
            RecordOutcome::Updated { path, renamed_from }
        } else {
            RecordOutcome::Unchanged { path }
        };
        Ok(Reconciled {
            outcome,
            index_changed,
        })
    }
}
