//! Async document store abstraction.
//!
//! `AsyncFileSystem` is object-safe (every method returns a boxed future) so
//! it can sit behind `dyn AsyncFileSystem` as well as be used generically.
//! Hosts whose storage is inherently async (plugin APIs, IndexedDB) implement
//! it directly; synchronous stores are wrapped in [`SyncToAsyncFs`].

use std::future::Future;
use std::io::Result;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use super::FileSystem;

/// A boxed future for object-safe async methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Async counterpart of [`FileSystem`]; each call is a suspension point of a sync run.
pub trait AsyncFileSystem: Send + Sync {
    /// Document text.
    fn read_to_string<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<String>>;

    /// Replace a document's text, creating it if needed.
    fn write_file<'a>(&'a self, path: &'a Path, content: &'a str) -> BoxFuture<'a, Result<()>>;

    /// Create a document, failing with `AlreadyExists` if the path is taken.
    fn create_new<'a>(&'a self, path: &'a Path, content: &'a str) -> BoxFuture<'a, Result<()>>;

    /// Remove a document.
    fn delete_file<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<()>>;

    /// `.md` documents directly inside `dir`.
    fn list_md_files<'a>(&'a self, dir: &'a Path) -> BoxFuture<'a, Result<Vec<PathBuf>>>;

    /// Whether a document or folder exists at `path`.
    fn exists<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, bool>;

    /// Create a folder and its missing parents.
    fn create_dir_all<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<()>>;

    /// Whether `path` is a folder.
    fn is_dir<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, bool>;

    /// Rename a document. Fails if `from` is missing or `to` is taken.
    fn move_file<'a>(&'a self, from: &'a Path, to: &'a Path) -> BoxFuture<'a, Result<()>>;

    /// Every entry (documents and folders) directly inside `dir`.
    fn list_files<'a>(&'a self, dir: &'a Path) -> BoxFuture<'a, Result<Vec<PathBuf>>>;

    /// Every `.md` document under `dir`, at any depth. Unlistable subfolders are skipped.
    fn list_md_files_recursive<'a>(&'a self, dir: &'a Path) -> BoxFuture<'a, Result<Vec<PathBuf>>> {
        Box::pin(async move {
            let mut documents = self.list_md_files(dir).await?;
            let mut pending = vec![dir.to_path_buf()];
            while let Some(folder) = pending.pop() {
                let Ok(entries) = self.list_files(&folder).await else {
                    continue;
                };
                for entry in entries {
                    if !self.is_dir(&entry).await {
                        continue;
                    }
                    if let Ok(found) = self.list_md_files(&entry).await {
                        documents.extend(found);
                    }
                    pending.push(entry);
                }
            }
            Ok(documents)
        })
    }
}

/// Lifts a synchronous [`FileSystem`] into an [`AsyncFileSystem`]. Every
/// future is ready on first poll.
///
/// ```ignore
/// use infoflow_sync_core::fs::{InMemoryFileSystem, SyncToAsyncFs};
///
/// let vault = SyncToAsyncFs::new(InMemoryFileSystem::new());
/// ```
#[derive(Clone)]
pub struct SyncToAsyncFs<F: FileSystem> {
    inner: F,
}

impl<F: FileSystem> SyncToAsyncFs<F> {
    /// Wrap `fs`.
    pub fn new(fs: F) -> Self {
        Self { inner: fs }
    }

    /// The wrapped store.
    pub fn inner(&self) -> &F {
        &self.inner
    }

    /// Unwrap.
    pub fn into_inner(self) -> F {
        self.inner
    }
}

impl<F: FileSystem> AsyncFileSystem for SyncToAsyncFs<F> {
    fn read_to_string<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move { self.inner.read_to_string(path) })
    }

    fn write_file<'a>(&'a self, path: &'a Path, content: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move { self.inner.write_file(path, content) })
    }

    fn create_new<'a>(&'a self, path: &'a Path, content: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move { self.inner.create_new(path, content) })
    }

    fn delete_file<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move { self.inner.delete_file(path) })
    }

    fn list_md_files<'a>(&'a self, dir: &'a Path) -> BoxFuture<'a, Result<Vec<PathBuf>>> {
        Box::pin(async move { self.inner.list_md_files(dir) })
    }

    fn exists<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, bool> {
        Box::pin(async move { self.inner.exists(path) })
    }

    fn create_dir_all<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move { self.inner.create_dir_all(path) })
    }

    fn is_dir<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, bool> {
        Box::pin(async move { self.inner.is_dir(path) })
    }

    fn move_file<'a>(&'a self, from: &'a Path, to: &'a Path) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move { self.inner.move_file(from, to) })
    }

    fn list_files<'a>(&'a self, dir: &'a Path) -> BoxFuture<'a, Result<Vec<PathBuf>>> {
        Box::pin(async move { self.inner.list_files(dir) })
    }

    fn list_md_files_recursive<'a>(&'a self, dir: &'a Path) -> BoxFuture<'a, Result<Vec<PathBuf>>> {
        Box::pin(async move { self.inner.list_md_files_recursive(dir) })
    }
}
