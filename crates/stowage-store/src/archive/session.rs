//! Incremental container creation.
//!
//! ```text
//! Closed --begin--> Open --write_entry--> Open --finalize--> Closed
//! ```
//!
//! Every transition is checked at runtime; a call in the wrong state is an
//! `InvalidSessionState` error and leaves the session untouched.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Read};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};
use zip::ZipWriter;

use crate::archive::names::validate_entry_name;
use crate::archive::Compression;
use crate::codec::ObjectCodec;
use crate::error::{StoreError, StoreResult};
use crate::io::copy_chunked;
use crate::root::{SessionSlot, StorageRoot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Closed,
    Open,
}

/// Content of one entry.
pub enum EntryPayload<'a> {
    Bytes(&'a [u8]),
    Stream(&'a mut dyn Read),
    Object(&'a serde_json::Value),
}

impl std::fmt::Debug for EntryPayload<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bytes(bytes) => write!(f, "Bytes({} bytes)", bytes.len()),
            Self::Stream(_) => f.write_str("Stream"),
            Self::Object(value) => write!(f, "Object({})", value),
        }
    }
}

/// A container that was finalized successfully.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizedArchive {
    /// Logical path inside the root.
    pub path: PathBuf,
    pub entries: usize,
}

struct OpenArchive {
    // Dropped before the slot, so the container is closed by the time
    // another session can start.
    writer: ZipWriter<BufWriter<File>>,
    names: HashSet<String>,
    path: PathBuf,
    _slot: SessionSlot,
}

/// Builds one container at a time inside a [`StorageRoot`].
pub struct ArchiveWriteSession {
    root: StorageRoot,
    codec: ObjectCodec,
    open: Option<OpenArchive>,
}

impl ArchiveWriteSession {
    pub(crate) fn new(root: StorageRoot) -> Self {
        Self {
            root,
            codec: ObjectCodec::default(),
            open: None,
        }
    }

    /// Codec used by `write_object` and `EntryPayload::Object`.
    pub fn with_codec(mut self, codec: ObjectCodec) -> Self {
        self.codec = codec;
        self
    }

    pub fn state(&self) -> SessionState {
        if self.open.is_some() {
            SessionState::Open
        } else {
            SessionState::Closed
        }
    }

    /// Destination of the open container.
    pub fn path(&self) -> Option<&Path> {
        self.open.as_ref().map(|open| open.path.as_path())
    }

    /// Entries written since `begin`; zero when closed.
    pub fn entry_count(&self) -> usize {
        self.open.as_ref().map_or(0, |open| open.names.len())
    }

    /// Create (or replace) the container at `path` and open the session.
    pub fn begin(&mut self, path: impl AsRef<Path>) -> StoreResult<()> {
        if self.open.is_some() {
            return Err(StoreError::session(
                "begin called while the session is already open",
            ));
        }

        let path = path.as_ref();
        let slot = self.root.acquire_session_slot()?;
        let file = self.root.create_file(path)?;

        self.open = Some(OpenArchive {
            writer: ZipWriter::new(BufWriter::new(file)),
            names: HashSet::new(),
            path: path.to_path_buf(),
            _slot: slot,
        });

        debug!(path = %path.display(), "write session opened");
        Ok(())
    }

    /// Append one entry.
    pub fn write_entry(
        &mut self,
        name: &str,
        payload: EntryPayload<'_>,
        compression: Compression,
    ) -> StoreResult<()> {
        match payload {
            EntryPayload::Bytes(bytes) => self.write_bytes(name, bytes, compression),
            EntryPayload::Stream(reader) => self.write_stream(name, reader, compression),
            EntryPayload::Object(value) => self.write_object(name, value, compression),
        }
    }

    pub fn write_bytes(
        &mut self,
        name: &str,
        mut bytes: &[u8],
        compression: Compression,
    ) -> StoreResult<()> {
        self.write_stream(name, &mut bytes, compression)
    }

    /// Copy `reader` to its end into a new entry, one chunk at a time.
    pub fn write_stream<R: Read + ?Sized>(
        &mut self,
        name: &str,
        reader: &mut R,
        compression: Compression,
    ) -> StoreResult<()> {
        let open = self.start_entry(name, compression)?;
        let written = copy_chunked(reader, &mut open.writer, u64::MAX, None)?;
        debug!(entry = %name, bytes = written, "wrote entry");
        Ok(())
    }

    /// Encode `value` with the session's codec straight into a new entry.
    pub fn write_object<T: Serialize + ?Sized>(
        &mut self,
        name: &str,
        value: &T,
        compression: Compression,
    ) -> StoreResult<()> {
        let codec = self.codec;
        let open = self.start_entry(name, compression)?;
        codec.serialize(&mut open.writer, value)?;
        debug!(entry = %name, "wrote object entry");
        Ok(())
    }

    /// Write the central directory, sync and close.
    pub fn finalize(&mut self) -> StoreResult<FinalizedArchive> {
        let Some(mut open) = self.open.take() else {
            return Err(StoreError::session("finalize called on a closed session"));
        };

        let buffered = open.writer.finish()?;
        let file = buffered.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        drop(file);

        let finalized = FinalizedArchive {
            path: open.path,
            entries: open.names.len(),
        };
        info!(
            path = %finalized.path.display(),
            entries = finalized.entries,
            "archive finalized"
        );
        Ok(finalized)
    }

    fn start_entry(&mut self, name: &str, compression: Compression) -> StoreResult<&mut OpenArchive> {
        let open = self
            .open
            .as_mut()
            .ok_or_else(|| StoreError::session("write_entry called on a closed session"))?;

        validate_entry_name(name)?;
        if open.names.contains(name) {
            return Err(StoreError::DuplicateEntry {
                name: name.to_string(),
            });
        }

        open.writer.start_file(name, compression.file_options())?;
        open.names.insert(name.to_string());
        Ok(open)
    }
}

impl Drop for ArchiveWriteSession {
    fn drop(&mut self) {
        if let Some(open) = &self.open {
            warn!(
                path = %open.path.display(),
                entries = open.names.len(),
                "write session dropped while open; container closed without sync"
            );
        }
    }
}

impl std::fmt::Debug for ArchiveWriteSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveWriteSession")
            .field("root", &self.root.base_path())
            .field("state", &self.state())
            .field("path", &self.path())
            .field("entries", &self.entry_count())
            .finish()
    }
}
