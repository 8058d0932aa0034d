//! Sandboxed file storage with a JSON object codec and ZIP archive support.
//!
//! This crate provides:
//!
//! - [`StorageRoot`]: a base directory that every path is resolved against;
//!   traversal outside it is rejected
//! - [`ObjectCodec`]: JSON encoding of any serde type over byte streams
//! - [`ArchiveReader`]: random access to the entries of a ZIP container
//! - [`ArchiveWriteSession`]: incremental container creation with a checked
//!   `Closed -> Open -> Closed` lifecycle
//! - [`extract_stream`]: extraction straight from a non-seekable stream
//!
//! # Quick Start
//!
//! ```no_run
//! use stowage_store::{Compression, EntryPayload, StorageRoot};
//!
//! # fn main() -> stowage_store::StoreResult<()> {
//! let root = StorageRoot::from_env()?;
//!
//! let mut session = root.write_session();
//! session.begin("bundles/out.zip")?;
//! session.write_entry("hello.txt", EntryPayload::Bytes(b"hi"), Compression::Stored)?;
//! session.finalize()?;
//!
//! let summary = root.extract_archive("bundles/out.zip", "content")?;
//! println!("extracted {} files", summary.files);
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration
//!
//! | Environment Variable | Description |
//! |---------------------|-------------|
//! | `STOWAGE_ROOT` | Sandbox base directory (default: `<local data dir>/stowage`) |

pub mod archive;
pub mod codec;
pub mod error;
mod io;
pub mod root;

pub use archive::{
    extract_stream, ArchiveEntry, ArchiveReader, ArchiveWriteSession, Compression, EntryPayload,
    EntryStream, ExtractLimits, ExtractLimitsOverrides, ExtractOptions, ExtractSummary,
    FinalizedArchive, SessionState, DEFLATE_LEVEL,
};
pub use codec::ObjectCodec;
pub use error::{StoreError, StoreResult};
pub use io::CHUNK_SIZE;
pub use root::{CollisionPolicy, Existence, NameFilter, StorageRoot, ROOT_ENV};

// Cancellation token type accepted by extraction.
pub use tokio_util::sync::CancellationToken;
