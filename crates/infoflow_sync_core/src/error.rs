use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::remote::RemoteError;

/// Which of the two user templates an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateKind {
    /// The file name template
    FileName,
    /// The note body template
    Note,
}

impl fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplateKind::FileName => write!(f, "file name"),
            TemplateKind::Note => write!(f, "note"),
        }
    }
}

/// Unified error type for sync operations
#[derive(Debug, Error)]
pub enum SyncError {
    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read file '{path}': {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    FileWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to create folder '{path}': {source}")]
    CreateFolder {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to rename '{from}' to '{to}': {source}")]
    Rename {
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },

    // Serialization errors
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Sync state error: {0}")]
    State(#[from] serde_json::Error),

    #[error("Settings parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Settings serialize error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    #[error("Could not determine config directory")]
    NoConfigDir,

    // Configuration errors
    #[error("No API token configured. Add your InfoFlow API token in the sync settings.")]
    MissingCredential,

    #[error("Invalid {kind} template: {message}")]
    InvalidTemplate { kind: TemplateKind, message: String },

    // Contention
    #[error("A sync is already running (started at {started_at})")]
    AlreadyRunning {
        run_id: String,
        started_at: DateTime<Utc>,
    },

    // Transport
    #[error("Failed to fetch items from InfoFlow: {0}")]
    Remote(#[from] RemoteError),
}

/// Result type alias for sync operations
pub type Result<T> = std::result::Result<T, SyncError>;

impl SyncError {
    /// Errors the user fixes by correcting settings. Raised before any state is mutated.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            SyncError::MissingCredential | SyncError::InvalidTemplate { .. }
        )
    }

    /// Another run holds the lock. A deferral rather than a failure.
    pub fn is_contention(&self) -> bool {
        matches!(self, SyncError::AlreadyRunning { .. })
    }

    /// The remote fetch failed. Safe to retry.
    pub fn is_transport(&self) -> bool {
        matches!(self, SyncError::Remote(_))
    }

    /// Convert to a serializable representation for IPC
    pub fn to_serializable(&self) -> SerializableError {
        SerializableError::from(self)
    }
}

/// A serializable representation of SyncError for the host UI
#[derive(Debug, Clone, Serialize)]
pub struct SerializableError {
    /// Error kind/variant name
    pub kind: String,
    /// Human-readable error message
    pub message: String,
    /// Associated path (if applicable)
    pub path: Option<PathBuf>,
}

impl From<&SyncError> for SerializableError {
    fn from(err: &SyncError) -> Self {
        let kind = match err {
            SyncError::Io(_) => "Io",
            SyncError::FileRead { .. } => "FileRead",
            SyncError::FileWrite { .. } => "FileWrite",
            SyncError::CreateFolder { .. } => "CreateFolder",
            SyncError::Rename { .. } => "Rename",
            SyncError::Yaml(_) => "Yaml",
            SyncError::State(_) => "State",
            SyncError::ConfigParse(_) => "ConfigParse",
            SyncError::ConfigSerialize(_) => "ConfigSerialize",
            SyncError::NoConfigDir => "NoConfigDir",
            SyncError::MissingCredential => "MissingCredential",
            SyncError::InvalidTemplate { .. } => "InvalidTemplate",
            SyncError::AlreadyRunning { .. } => "AlreadyRunning",
            SyncError::Remote(_) => "Remote",
        }
        .to_string();

        let path = match err {
            SyncError::FileRead { path, .. }
            | SyncError::FileWrite { path, .. }
            | SyncError::CreateFolder { path, .. } => Some(path.clone()),
            SyncError::Rename { from, .. } => Some(from.clone()),
            _ => None,
        };

        Self {
            kind,
            message: err.to_string(),
            path,
        }
    }
}

impl From<SyncError> for SerializableError {
    fn from(err: SyncError) -> Self {
        SerializableError::from(&err)
    }
}
