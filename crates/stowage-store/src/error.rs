//! Error types for storage, codec and archive operations.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur while working inside a storage root.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Missing file or folder.
    #[error("not found: {path}")]
    NotFound { path: String },

    /// Create-with-FailIfExists hit an existing target, or a file occupies
    /// the place of a folder.
    #[error("already exists: {path}")]
    Collision { path: String },

    /// Path would resolve outside the sandbox root or is otherwise unusable.
    #[error("invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    /// Container metadata (central directory, local headers) is unreadable.
    #[error("corrupt archive: {message}")]
    CorruptArchive { message: String },

    /// No entry with this name in the container.
    #[error("entry not found: {name}")]
    EntryNotFound { name: String },

    /// Fewer bytes available than the entry declares.
    #[error("entry '{name}' declared {expected} bytes but only {actual} were readable")]
    SizeMismatch {
        name: String,
        expected: u64,
        actual: u64,
    },

    /// Write-session protocol violation.
    #[error("invalid session state: {message}")]
    InvalidSessionState { message: String },

    /// Entry name already written in the current session.
    #[error("duplicate entry name: {name}")]
    DuplicateEntry { name: String },

    /// Malformed or shape-mismatched JSON payload.
    #[error("serialization error: {0}")]
    Serialization(#[source] serde_json::Error),

    /// Extraction limit exceeded.
    #[error("limit exceeded: {message}")]
    LimitExceeded { message: String },

    /// Operation aborted through its cancellation token.
    #[error("operation cancelled")]
    Cancelled,

    /// I/O passthrough.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub(crate) fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn session(message: impl Into<String>) -> Self {
        Self::InvalidSessionState {
            message: message.into(),
        }
    }

    pub(crate) fn corrupt(message: impl Into<String>) -> Self {
        Self::CorruptArchive {
            message: message.into(),
        }
    }

    /// Returns true for missing files, folders and entries.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::EntryNotFound { .. })
    }

    /// Returns true if the operation was cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Suggested exit code for CLI front-ends.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::NotFound { .. } | Self::EntryNotFound { .. } => 2,
            Self::Collision { .. } | Self::DuplicateEntry { .. } => 3,
            Self::InvalidPath { .. } => 4,
            Self::CorruptArchive { .. } | Self::SizeMismatch { .. } => 5,
            Self::LimitExceeded { .. } => 6,
            Self::Cancelled => 130,
            _ => 1,
        }
    }

    /// Map a `zip` error raised while reading an entry named `name`.
    pub(crate) fn from_zip(err: zip::result::ZipError, name: &str) -> Self {
        match err {
            zip::result::ZipError::FileNotFound => Self::EntryNotFound {
                name: name.to_string(),
            },
            zip::result::ZipError::Io(e) => Self::Io(e),
            other => Self::corrupt(format!("{}: {}", name, other)),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        // serde_json wraps reader failures; keep those as I/O.
        if err.is_io() {
            return Self::Io(err.into());
        }
        Self::Serialization(err)
    }
}

impl From<zip::result::ZipError> for StoreError {
    fn from(err: zip::result::ZipError) -> Self {
        match err {
            zip::result::ZipError::Io(e) => Self::Io(e),
            other => Self::corrupt(other.to_string()),
        }
    }
}
