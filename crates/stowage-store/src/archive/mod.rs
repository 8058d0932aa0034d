//! ZIP container engine.
//!
//! - [`reader`]: random-access reading with [`ArchiveReader`]
//! - [`extract`]: bulk extraction, seekable or streamed
//! - [`session`]: incremental creation with [`ArchiveWriteSession`]
//!
//! # Example
//!
//! ```no_run
//! use stowage_store::archive::{Compression, EntryPayload};
//! use stowage_store::StorageRoot;
//!
//! # fn main() -> stowage_store::StoreResult<()> {
//! let root = StorageRoot::new("/tmp/stowage")?;
//!
//! let mut session = root.write_session();
//! session.begin("out.zip")?;
//! session.write_entry("hello.txt", EntryPayload::Bytes(b"hi"), Compression::Stored)?;
//! session.write_object("data.json", &serde_json::json!({"x": 1}), Compression::Deflated)?;
//! session.finalize()?;
//!
//! let mut reader = root.open_archive("out.zip")?;
//! assert_eq!(reader.read_entry("hello.txt")?, b"hi");
//! # Ok(())
//! # }
//! ```

pub mod extract;
pub mod limits;
mod local;
mod names;
pub mod reader;
pub mod session;

use zip::write::FileOptions;
use zip::CompressionMethod;

pub use extract::{extract_stream, ExtractOptions, ExtractSummary};
pub use limits::{ExtractLimits, ExtractLimitsOverrides};
pub use reader::{ArchiveReader, EntryStream};
pub use session::{ArchiveWriteSession, EntryPayload, FinalizedArchive, SessionState};

/// DEFLATE level for compressed entries. Chosen for speed over ratio.
pub const DEFLATE_LEVEL: i32 = 3;

/// Per-entry compression policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    /// Level 0. Best for payloads that are already compressed (JPEG, PNG).
    #[default]
    Stored,
    /// DEFLATE at [`DEFLATE_LEVEL`].
    Deflated,
}

impl Compression {
    pub fn from_flag(compressed: bool) -> Self {
        if compressed {
            Self::Deflated
        } else {
            Self::Stored
        }
    }

    pub fn is_compressed(self) -> bool {
        self == Self::Deflated
    }

    pub(crate) fn file_options(self) -> FileOptions {
        // Fixed DOS timestamp keeps identical inputs byte-identical.
        let options = FileOptions::default()
            .last_modified_time(zip::DateTime::default())
            .unix_permissions(0o644);
        match self {
            Self::Stored => options
                .compression_method(CompressionMethod::Stored)
                .compression_level(None),
            Self::Deflated => options
                .compression_method(CompressionMethod::Deflated)
                .compression_level(Some(DEFLATE_LEVEL)),
        }
    }
}

/// Metadata for one entry of an opened container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Path inside the container, forward-slash separated.
    pub name: String,
    /// Declared uncompressed size.
    pub size: u64,
    pub compressed_size: u64,
    /// True unless the entry is stored.
    pub compressed: bool,
    pub is_dir: bool,
}

impl ArchiveEntry {
    pub(crate) fn from_zip(file: &zip::read::ZipFile<'_>) -> Self {
        Self {
            name: file.name().to_string(),
            size: file.size(),
            compressed_size: file.compressed_size(),
            compressed: file.compression() != CompressionMethod::Stored,
            is_dir: file.is_dir(),
        }
    }
}
