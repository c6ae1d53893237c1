//! Document store abstraction.
//!
//! The sync engine never touches `std::fs` directly. Everything it reads or
//! writes goes through the [`AsyncFileSystem`] trait, so the same engine can
//! run against a real vault on disk ([`RealFileSystem`]), an in-memory vault
//! ([`InMemoryFileSystem`]) or a host-provided implementation.
//!
//! Synchronous implementations are lifted with [`SyncToAsyncFs`].

mod async_fs;
mod events;
mod memory;
#[cfg(not(target_arch = "wasm32"))]
mod native;

pub use async_fs::{AsyncFileSystem, BoxFuture, SyncToAsyncFs};
pub use events::DocumentEvent;
pub use memory::InMemoryFileSystem;
#[cfg(not(target_arch = "wasm32"))]
pub use native::RealFileSystem;

use std::io::Result;
use std::path::{Path, PathBuf};

/// Primitive operations of a synchronous document store.
///
/// Paths are absolute store paths (vault root joined with a vault path).
/// Every call stands alone; the engine never needs more than single-call
/// atomicity from an implementation.
pub trait FileSystem: Send + Sync {
    /// Document text.
    fn read_to_string(&self, path: &Path) -> Result<String>;

    /// Replace a document's text, creating it if needed.
    fn write_file(&self, path: &Path, content: &str) -> Result<()>;

    /// Create a document, failing with `AlreadyExists` if the path is taken.
    fn create_new(&self, path: &Path, content: &str) -> Result<()>;

    /// Remove a document.
    fn delete_file(&self, path: &Path) -> Result<()>;

    /// `.md` documents directly inside `dir`.
    fn list_md_files(&self, dir: &Path) -> Result<Vec<PathBuf>>;

    /// Whether a document or folder exists at `path`.
    fn exists(&self, path: &Path) -> bool;

    /// Create a folder and its missing parents.
    fn create_dir_all(&self, path: &Path) -> Result<()>;

    /// Whether `path` is a folder.
    fn is_dir(&self, path: &Path) -> bool;

    /// Rename a document. Fails if `from` is missing or `to` is taken.
    fn move_file(&self, from: &Path, to: &Path) -> Result<()>;

    /// Every entry (documents and folders) directly inside `dir`.
    fn list_files(&self, dir: &Path) -> Result<Vec<PathBuf>>;

    /// Every `.md` document under `dir`, at any depth.
    ///
    /// Folders that cannot be listed are skipped rather than failing the walk;
    /// only an unreadable `dir` itself is an error.
    fn list_md_files_recursive(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let mut documents = self.list_md_files(dir)?;
        let mut pending = vec![dir.to_path_buf()];
        while let Some(folder) = pending.pop() {
            let Ok(entries) = self.list_files(&folder) else {
                continue;
            };
            for entry in entries.into_iter().filter(|e| self.is_dir(e)) {
                if let Ok(found) = self.list_md_files(&entry) {
                    documents.extend(found);
                }
                pending.push(entry);
            }
        }
        Ok(documents)
    }
}
