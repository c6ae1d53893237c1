//! In-memory document store.

use std::collections::{BTreeMap, BTreeSet};
use std::io::{Error, ErrorKind, Result};
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::FileSystem;

/// A vault held entirely in memory. Clones share storage.
#[derive(Clone, Default)]
pub struct InMemoryFileSystem {
    files: Arc<RwLock<BTreeMap<PathBuf, String>>>,
    /// Folders, including every ancestor of a stored document
    directories: Arc<RwLock<BTreeSet<PathBuf>>>,
}

impl InMemoryFileSystem {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// A store seeded with `(path, text)` documents.
    pub fn with_documents<P, T>(documents: impl IntoIterator<Item = (P, T)>) -> Self
    where
        P: AsRef<Path>,
        T: Into<String>,
    {
        let fs = Self::new();
        for (path, text) in documents {
            let path = normalize_path(path.as_ref());
            fs.insert_parents(&path);
            fs.files_mut().insert(path, text.into());
        }
        fs
    }

    /// Every document path, sorted.
    pub fn document_paths(&self) -> Vec<PathBuf> {
        self.files().keys().cloned().collect()
    }

    fn files(&self) -> RwLockReadGuard<'_, BTreeMap<PathBuf, String>> {
        self.files.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn files_mut(&self) -> RwLockWriteGuard<'_, BTreeMap<PathBuf, String>> {
        self.files.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn dirs(&self) -> RwLockReadGuard<'_, BTreeSet<PathBuf>> {
        self.directories.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn dirs_mut(&self) -> RwLockWriteGuard<'_, BTreeSet<PathBuf>> {
        self.directories
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn insert_parents(&self, path: &Path) {
        let mut dirs = self.dirs_mut();
        let mut current = path;
        while let Some(parent) = current.parent() {
            if !parent.as_os_str().is_empty() {
                dirs.insert(parent.to_path_buf());
            }
            current = parent;
        }
    }
}

/// Remove `.` and `..` components where possible.
fn normalize_path(path: &Path) -> PathBuf {
    let mut components = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                components.pop();
            }
            c => components.push(c),
        }
    }
    components.iter().collect()
}

impl FileSystem for InMemoryFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        self.files()
            .get(&normalize_path(path))
            .cloned()
            .ok_or_else(|| Error::new(ErrorKind::NotFound, format!("File not found: {:?}", path)))
    }

    fn write_file(&self, path: &Path, content: &str) -> Result<()> {
        let normalized = normalize_path(path);
        self.insert_parents(&normalized);
        self.files_mut().insert(normalized, content.to_string());
        Ok(())
    }

    fn create_new(&self, path: &Path, content: &str) -> Result<()> {
        let normalized = normalize_path(path);
        if self.files().contains_key(&normalized) || self.dirs().contains(&normalized) {
            return Err(Error::new(
                ErrorKind::AlreadyExists,
                format!("File already exists: {:?}", path),
            ));
        }
        self.insert_parents(&normalized);
        self.files_mut().insert(normalized, content.to_string());
        Ok(())
    }

    fn delete_file(&self, path: &Path) -> Result<()> {
        match self.files_mut().remove(&normalize_path(path)) {
            Some(_) => Ok(()),
            None => Err(Error::new(
                ErrorKind::NotFound,
                format!("File not found: {:?}", path),
            )),
        }
    }

    fn list_md_files(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let normalized = normalize_path(dir);
        Ok(self
            .files()
            .keys()
            .filter(|path| {
                path.parent() == Some(normalized.as_path())
                    && path.extension().is_some_and(|ext| ext == "md")
            })
            .cloned()
            .collect())
    }

    fn exists(&self, path: &Path) -> bool {
        let normalized = normalize_path(path);
        self.files().contains_key(&normalized) || self.dirs().contains(&normalized)
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        let normalized = normalize_path(path);
        if self.files().contains_key(&normalized) {
            return Err(Error::new(
                ErrorKind::AlreadyExists,
                format!("A file exists at {:?}", path),
            ));
        }
        self.insert_parents(&normalized);
        if !normalized.as_os_str().is_empty() {
            self.dirs_mut().insert(normalized);
        }
        Ok(())
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.dirs().contains(&normalize_path(path))
    }

    fn move_file(&self, from: &Path, to: &Path) -> Result<()> {
        let from_norm = normalize_path(from);
        let to_norm = normalize_path(to);

        if from_norm == to_norm {
            return Ok(());
        }

        {
            let files = self.files();
            if !files.contains_key(&from_norm) {
                return Err(Error::new(
                    ErrorKind::NotFound,
                    format!("Source file not found: {:?}", from),
                ));
            }
            if files.contains_key(&to_norm) || self.dirs().contains(&to_norm) {
                return Err(Error::new(
                    ErrorKind::AlreadyExists,
                    format!("Destination already exists: {:?}", to),
                ));
            }
        }

        self.insert_parents(&to_norm);
        let mut files = self.files_mut();
        let content = files.remove(&from_norm).ok_or_else(|| {
            Error::new(
                ErrorKind::NotFound,
                format!("Source file not found: {:?}", from),
            )
        })?;
        files.insert(to_norm, content);
        Ok(())
    }

    fn list_files(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let normalized = normalize_path(dir);
        let is_child = |path: &&PathBuf| path.parent() == Some(normalized.as_path());

        let mut result: Vec<PathBuf> = self.dirs().iter().filter(is_child).cloned().collect();
        result.extend(self.files().keys().filter(is_child).cloned());
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_operations() {
        let fs = InMemoryFileSystem::new();

        fs.write_file(Path::new("test.md"), "Hello, World!").unwrap();
        assert_eq!(
            fs.read_to_string(Path::new("test.md")).unwrap(),
            "Hello, World!"
        );
        assert!(fs.exists(Path::new("test.md")));
        assert!(!fs.exists(Path::new("nonexistent.md")));

        fs.delete_file(Path::new("test.md")).unwrap();
        assert!(!fs.exists(Path::new("test.md")));
    }

    #[test]
    fn test_create_new_refuses_existing() {
        let fs = InMemoryFileSystem::new();

        fs.create_new(Path::new("new.md"), "Content").unwrap();
        assert!(fs.create_new(Path::new("new.md"), "Other").is_err());
        assert_eq!(fs.read_to_string(Path::new("new.md")).unwrap(), "Content");
    }

    #[test]
    fn test_parent_directories_are_implicit() {
        let fs = InMemoryFileSystem::new();
        fs.write_file(Path::new("a/b/c/file.md"), "Content").unwrap();

        assert!(fs.is_dir(Path::new("a")));
        assert!(fs.is_dir(Path::new("a/b")));
        assert!(fs.is_dir(Path::new("a/b/c")));
    }

    #[test]
    fn test_list_md_files_recursive() {
        let fs = InMemoryFileSystem::new();
        fs.write_file(Path::new("vault/one.md"), "1").unwrap();
        fs.write_file(Path::new("vault/notes.txt"), "x").unwrap();
        fs.write_file(Path::new("vault/deep/two.md"), "2").unwrap();
        fs.write_file(Path::new("vault/deep/er/three.md"), "3").unwrap();

        let flat = fs.list_md_files(Path::new("vault")).unwrap();
        assert_eq!(flat, vec![PathBuf::from("vault/one.md")]);

        let mut all = fs.list_md_files_recursive(Path::new("vault")).unwrap();
        all.sort();
        assert_eq!(
            all,
            vec![
                PathBuf::from("vault/deep/er/three.md"),
                PathBuf::from("vault/deep/two.md"),
                PathBuf::from("vault/one.md"),
            ]
        );
    }

    #[test]
    fn test_move_file_never_overwrites() {
        let fs = InMemoryFileSystem::new();
        fs.write_file(Path::new("a.md"), "A").unwrap();
        fs.write_file(Path::new("b.md"), "B").unwrap();

        let err = fs.move_file(Path::new("a.md"), Path::new("b.md")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
        assert_eq!(fs.read_to_string(Path::new("b.md")).unwrap(), "B");

        fs.move_file(Path::new("a.md"), Path::new("dir/c.md")).unwrap();
        assert!(!fs.exists(Path::new("a.md")));
        assert_eq!(fs.read_to_string(Path::new("dir/c.md")).unwrap(), "A");
    }

    #[test]
    fn test_path_normalization() {
        let fs = InMemoryFileSystem::new();
        fs.write_file(Path::new("dir/file.md"), "Content").unwrap();

        assert!(fs.exists(Path::new("dir/./file.md")));
        assert!(fs.exists(Path::new("dir/subdir/../file.md")));
    }

    #[test]
    fn test_seeded_documents() {
        let fs = InMemoryFileSystem::with_documents([
            ("/vault/InfoFlow/a.md", "A"),
            ("/vault/./Notes/b.md", "B"),
        ]);
        assert_eq!(
            fs.document_paths(),
            vec![
                PathBuf::from("/vault/InfoFlow/a.md"),
                PathBuf::from("/vault/Notes/b.md"),
            ]
        );
        assert!(fs.is_dir(Path::new("/vault/Notes")));
    }
}
