//! Event hooks applied outside a sync run.
//!
//! Each hook is a small transaction on the caller's [`SyncState`]: mutate,
//! then persist through the same store the orchestrator uses. Because every
//! hook and every run borrows the state mutably, a hook cannot interleave
//! with a run's checkpoints.

use log::{debug, info};

use super::SyncManager;
use crate::config::SyncSettings;
use crate::error::Result;
use crate::fs::{AsyncFileSystem, DocumentEvent};
use crate::managed;
use crate::path_utils::{normalize_path, to_store_path};
use crate::remote::RemoteSource;
use crate::state::{StateStore, SyncState};

impl<FS, R, S> SyncManager<FS, R, S>
where
    FS: AsyncFileSystem,
    R: RemoteSource,
    S: StateStore,
{
    /// A document was renamed locally.
    ///
    /// Only an index entry pointing at `old_path` is moved, so renames of
    /// unmanaged documents are ignored. Returns whether the index changed.
    pub async fn handle_rename(
        &self,
        state: &mut SyncState,
        old_path: &str,
        new_path: &str,
    ) -> Result<bool> {
        let old_path = normalize_path(old_path);
        let new_path = normalize_path(new_path);
        let Some(id) = state.id_for_path(&old_path).map(str::to_string) else {
            return Ok(false);
        };
        if !state.set_path(&id, &new_path) {
            return Ok(false);
        }
        debug!("Index: {} moved {} -> {}", id, old_path, new_path);
        self.persist(state).await?;
        Ok(true)
    }

    /// A document was deleted locally.
    ///
    /// With `resync_deleted` enabled the record is queued for forced
    /// re-acquisition on the next run. The id comes from `frontmatter_id`
    /// when the host still had it, then from the document itself if it is
    /// still readable, then from the index. Returns the queued id.
    pub async fn handle_delete(
        &self,
        state: &mut SyncState,
        settings: &SyncSettings,
        path: &str,
        frontmatter_id: Option<&str>,
    ) -> Result<Option<String>> {
        if !settings.resync_deleted {
            return Ok(None);
        }
        let path = normalize_path(path);

        let mut id = frontmatter_id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string);
        if id.is_none() {
            let store_path = to_store_path(&self.vault_root, &path);
            if let Ok(text) = self.fs.read_to_string(&store_path).await {
                id = managed::frontmatter_id(&text);
            }
        }
        if id.is_none() {
            id = state.id_for_path(&path).map(str::to_string);
        }
        let Some(id) = id else {
            return Ok(None);
        };

        let queued = state.enqueue_deleted_resync(&id);
        let unindexed = state.path_for(&id) == Some(path.as_str())
            && state.item_path_index.remove(&id).is_some();
        if queued || unindexed {
            info!("Queued deleted document {} ({}) for re-creation", path, id);
            self.persist(state).await?;
        }
        Ok(Some(id))
    }

    /// Dispatch a host event to the matching hook. Returns whether state changed.
    pub async fn handle_event(
        &self,
        state: &mut SyncState,
        settings: &SyncSettings,
        event: &DocumentEvent,
    ) -> Result<bool> {
        match event {
            DocumentEvent::Renamed { old_path, new_path } => {
                self.handle_rename(state, old_path, new_path).await
            }
            DocumentEvent::Deleted {
                path,
                frontmatter_id,
            } => Ok(self
                .handle_delete(state, settings, path, frontmatter_id.as_deref())
                .await?
                .is_some()),
        }
    }

    /// Queue records for a forced reimport on the next run. Returns how many were newly queued.
    pub async fn request_reimport<I, T>(&self, state: &mut SyncState, ids: I) -> Result<usize>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        let mut queued = 0;
        for id in ids {
            let id = id.as_ref().trim();
            if !id.is_empty() && state.enqueue_reimport(id) {
                queued += 1;
            }
        }
        if queued > 0 {
            info!("Queued {} records for reimport", queued);
            self.persist(state).await?;
        }
        Ok(queued)
    }

    /// Forget the cursor so the next run fetches everything.
    pub async fn reset_cursor(&self, state: &mut SyncState) -> Result<()> {
        if state.last_successful_cursor.take().is_some() {
            info!("Sync cursor reset; next run is a full fetch");
            self.persist(state).await?;
        }
        Ok(())
    }
}
