//! Path utilities for vault-relative document paths.
//!
//! Document paths are `/`-separated and relative to the vault root, the same
//! shape the host uses when it reports renames and deletions.

use std::path::{Path, PathBuf};

/// Normalise a vault path the way the host does: backslashes become `/`,
/// repeated separators collapse, `.` segments are dropped and leading or
/// trailing slashes are trimmed.
pub fn normalize_path(path: &str) -> String {
    path.replace('\\', "/")
        .split('/')
        .filter(|seg| !seg.is_empty() && *seg != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/// Join a folder and a file name into a normalised vault path.
pub fn join(folder: &str, file_name: &str) -> String {
    let folder = normalize_path(folder);
    if folder.is_empty() {
        normalize_path(file_name)
    } else {
        normalize_path(&format!("{}/{}", folder, file_name))
    }
}

/// The vault path a record would ideally live at: `{folder}/{base}.md`.
pub fn desired_document_path(folder: &str, base_name: &str) -> String {
    join(folder, &format!("{}.md", base_name))
}

/// Numbered alternatives tried when `{folder}/{base}.md` is taken:
/// `{base} (1).md` up to `{base} ({max}).md`.
pub fn collision_candidates(folder: &str, base_name: &str, max: u32) -> Vec<String> {
    (1..=max)
        .map(|n| join(folder, &format!("{} ({}).md", base_name, n)))
        .collect()
}

/// Last-resort name when every numbered alternative is taken.
pub fn timestamp_candidate(folder: &str, base_name: &str, epoch_ms: i64) -> String {
    join(folder, &format!("{} ({}).md", base_name, epoch_ms))
}

/// Resolve a vault path against the vault root on the document store.
pub fn to_store_path(vault_root: &Path, vault_path: &str) -> PathBuf {
    if vault_path.is_empty() {
        vault_root.to_path_buf()
    } else {
        vault_root.join(vault_path)
    }
}

/// Express a document store path relative to the vault root.
///
/// Returns `None` for paths outside the vault.
pub fn to_vault_path(vault_root: &Path, store_path: &Path) -> Option<String> {
    let relative = store_path.strip_prefix(vault_root).ok()?;
    Some(normalize_path(&relative.to_string_lossy()))
}
