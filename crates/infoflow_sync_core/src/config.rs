//! Sync settings.
//!
//! [`SyncSettings`] holds the credential, the two templates, the target
//! folder and the optional remote filters. Settings are persisted as TOML
//! (typically at `~/.config/infoflow-sync/settings.toml` on Unix systems).
//!
//! Every field has a default, so partially written or older settings files
//! load without error.
//!
//! # Example
//!
//! ```ignore
//! use infoflow_sync_core::config::SyncSettings;
//!
//! let mut settings = SyncSettings::load()?;
//! settings.api_token = "if_...".into();
//! settings.validate_templates()?;
//! settings.save()?;
//! ```

use std::fmt;
use std::path::Path;
#[cfg(not(target_arch = "wasm32"))]
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError, TemplateKind};
use crate::fs::AsyncFileSystem;
#[cfg(not(target_arch = "wasm32"))]
use crate::fs::{FileSystem, SyncToAsyncFs};
use crate::remote::{FetchQuery, PER_PAGE};
use crate::template::{self, DEFAULT_FILE_NAME_TEMPLATE, DEFAULT_NOTE_TEMPLATE, Template};

/// Default InfoFlow server
pub const DEFAULT_ENDPOINT: &str = "https://www.infoflow.app";

/// Default vault folder for synced documents
pub const DEFAULT_TARGET_FOLDER: &str = "InfoFlow";

/// Default auto sync interval in minutes
pub const DEFAULT_SYNC_FREQUENCY_MINUTES: u32 = 60;

/// User-facing sync settings.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// InfoFlow server base url
    pub endpoint: String,

    /// API token (required)
    pub api_token: String,

    /// Vault folder new documents are created in
    pub target_folder: String,

    /// Template rendering a record's file name (without `.md`)
    pub file_name_template: String,

    /// Template rendering the managed region of a document
    pub note_template: String,

    /// Minutes between automatic syncs; 0 disables them
    pub sync_frequency_minutes: u32,

    /// Re-create documents the user deletes locally
    pub resync_deleted: bool,

    /// Only items created at or after this date
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,

    /// Only items created at or before this date
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,

    /// Only items with one of these tags
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    /// Only items in one of these folders
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub folders: Vec<String>,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_token: String::new(),
            target_folder: DEFAULT_TARGET_FOLDER.to_string(),
            file_name_template: DEFAULT_FILE_NAME_TEMPLATE.to_string(),
            note_template: DEFAULT_NOTE_TEMPLATE.to_string(),
            sync_frequency_minutes: DEFAULT_SYNC_FREQUENCY_MINUTES,
            resync_deleted: true,
            from: None,
            to: None,
            tags: Vec::new(),
            folders: Vec::new(),
        }
    }
}

impl fmt::Debug for SyncSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncSettings")
            .field("endpoint", &self.endpoint)
            .field("api_token", &if self.api_token.is_empty() { "" } else { "***" })
            .field("target_folder", &self.target_folder)
            .field("file_name_template", &self.file_name_template)
            .field("note_template", &self.note_template)
            .field("sync_frequency_minutes", &self.sync_frequency_minutes)
            .field("resync_deleted", &self.resync_deleted)
            .field("from", &self.from)
            .field("to", &self.to)
            .field("tags", &self.tags)
            .field("folders", &self.folders)
            .finish()
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn non_empty_list(values: &[String]) -> Vec<String> {
    values
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}

impl SyncSettings {
    /// Whether an API token is configured.
    pub fn has_credential(&self) -> bool {
        !self.api_token.trim().is_empty()
    }

    /// Compile both templates, reporting which one is broken.
    ///
    /// Call on every settings change and before every run.
    pub fn validate_templates(&self) -> Result<(Template, Template)> {
        let file_name = Template::compile(&self.file_name_template)
            .map_err(|e| e.into_sync_error(TemplateKind::FileName))?;
        let note = Template::compile(&self.note_template)
            .map_err(|e| e.into_sync_error(TemplateKind::Note))?;
        Ok((file_name, note))
    }

    /// Validate one template source without touching the settings.
    pub fn validate_template(kind: TemplateKind, source: &str) -> Result<()> {
        template::validate(source).map_err(|e| e.into_sync_error(kind))
    }

    /// Remote query for the configured filters and an optional cursor.
    pub fn fetch_query(&self, updated_since: Option<String>) -> FetchQuery {
        FetchQuery {
            from: non_empty(&self.from),
            to: non_empty(&self.to),
            tags: non_empty_list(&self.tags),
            folders: non_empty_list(&self.folders),
            updated_since,
            per_page: PER_PAGE,
        }
    }

    /// Interval between automatic syncs, or `None` when disabled.
    pub fn auto_sync_interval(&self) -> Option<Duration> {
        match self.sync_frequency_minutes {
            0 => None,
            minutes => Some(Duration::from_secs(u64::from(minutes) * 60)),
        }
    }

    /// Load settings from a specific path using an AsyncFileSystem.
    pub async fn load_from<FS: AsyncFileSystem>(fs: &FS, path: &Path) -> Result<Self> {
        let contents = fs
            .read_to_string(path)
            .await
            .map_err(|e| SyncError::FileRead {
                path: path.to_path_buf(),
                source: e,
            })?;

        let settings: SyncSettings = toml::from_str(&contents)?;
        Ok(settings)
    }

    /// Save settings to a specific path using an AsyncFileSystem.
    pub async fn save_to<FS: AsyncFileSystem>(&self, fs: &FS, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs.create_dir_all(parent).await?;
        }

        let contents = toml::to_string_pretty(self)?;
        fs.write_file(path, &contents).await?;
        Ok(())
    }

    /// Load settings, falling back to defaults if the file is missing or unreadable.
    pub async fn load_from_or_default<FS: AsyncFileSystem>(fs: &FS, path: &Path) -> Self {
        match Self::load_from(fs, path).await {
            Ok(settings) => settings,
            Err(e) => {
                log::debug!("Using default settings ({})", e);
                Self::default()
            }
        }
    }

    /// Sync wrapper for [`Self::load_from`]
    #[cfg(not(target_arch = "wasm32"))]
    pub fn load_from_sync<FS: FileSystem>(fs: FS, path: &Path) -> Result<Self> {
        futures_lite::future::block_on(Self::load_from(&SyncToAsyncFs::new(fs), path))
    }

    /// Sync wrapper for [`Self::save_to`]
    #[cfg(not(target_arch = "wasm32"))]
    pub fn save_to_sync<FS: FileSystem>(&self, fs: FS, path: &Path) -> Result<()> {
        futures_lite::future::block_on(self.save_to(&SyncToAsyncFs::new(fs), path))
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl SyncSettings {
    /// Get the settings file path (~/.config/infoflow-sync/settings.toml)
    /// Only available on native platforms
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("infoflow-sync").join("settings.toml"))
    }

    /// Load settings from the default location, or defaults if the file doesn't exist
    pub fn load() -> Result<Self> {
        if let Some(path) = Self::config_path()
            && path.exists()
        {
            let contents = std::fs::read_to_string(&path)?;
            let settings: SyncSettings = toml::from_str(&contents)?;
            return Ok(settings);
        }

        Ok(SyncSettings::default())
    }

    /// Save settings to the default location
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path().ok_or(SyncError::NoConfigDir)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;
        Ok(())
    }
}
