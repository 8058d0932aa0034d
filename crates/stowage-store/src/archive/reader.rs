//! Random-access container reader.
//!
//! The reader owns its source. Entry streams borrow the reader mutably, so
//! the single container cursor can only ever serve one entry at a time.

use std::fs::File;
use std::io::{BufReader, ErrorKind, Read, Seek};
use std::path::Path;

use serde::de::DeserializeOwned;
use tracing::debug;
use zip::result::ZipError;
use zip::ZipArchive;

use crate::archive::extract::{extract_archive, ExtractOptions, ExtractSummary};
use crate::archive::ArchiveEntry;
use crate::codec::ObjectCodec;
use crate::error::{StoreError, StoreResult};
use crate::io::{read_retrying, CHUNK_SIZE};
use crate::root::StorageRoot;

/// Upper bound for the up-front allocation in `read_entry`; declared sizes
/// are not trusted beyond this.
const PREALLOC_CAP: u64 = 1024 * 1024;

/// Container reader over a seekable source.
///
/// # Example
///
/// ```no_run
/// use stowage_store::archive::ArchiveReader;
/// use std::fs::File;
///
/// let reader = ArchiveReader::open(File::open("bundle.zip").unwrap()).unwrap();
/// for entry in reader.entries() {
///     println!("{} ({} bytes)", entry.name, entry.size);
/// }
/// ```
pub struct ArchiveReader<R: Read + Seek> {
    archive: ZipArchive<R>,
    entries: Vec<ArchiveEntry>,
}

impl<R: Read + Seek> ArchiveReader<R> {
    /// Parse the central directory and every local header.
    pub fn open(source: R) -> StoreResult<Self> {
        let mut archive = ZipArchive::new(source).map_err(open_error)?;

        let mut entries = Vec::with_capacity(archive.len());
        for index in 0..archive.len() {
            let file = archive.by_index_raw(index).map_err(open_error)?;
            entries.push(ArchiveEntry::from_zip(&file));
        }

        debug!(entries = entries.len(), "opened archive");
        Ok(Self { archive, entries })
    }

    /// Entries in container order.
    pub fn entries(&self) -> &[ArchiveEntry] {
        &self.entries
    }

    /// Entry names in container order.
    pub fn entry_names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    /// Metadata for `name`. With duplicate names the last entry wins,
    /// matching what `open_entry_stream` returns.
    pub fn entry(&self, name: &str) -> Option<&ArchiveEntry> {
        self.entries.iter().rev().find(|e| e.name == name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Lazily decompressing stream over one entry.
    pub fn open_entry_stream(&mut self, name: &str) -> StoreResult<EntryStream<'_>> {
        let file = self
            .archive
            .by_name(name)
            .map_err(|e| StoreError::from_zip(e, name))?;

        Ok(EntryStream {
            entry: ArchiveEntry::from_zip(&file),
            inner: file,
        })
    }

    /// Read exactly the declared number of bytes of `name`.
    ///
    /// A short entry is a `SizeMismatch`, never a short buffer.
    pub fn read_entry(&mut self, name: &str) -> StoreResult<Vec<u8>> {
        let mut stream = self.open_entry_stream(name)?;
        let expected = stream.entry().size;

        let mut buffer = Vec::with_capacity(expected.min(PREALLOC_CAP) as usize);
        let mut chunk = [0u8; CHUNK_SIZE];

        while (buffer.len() as u64) < expected {
            let want = (expected - buffer.len() as u64).min(CHUNK_SIZE as u64) as usize;
            match read_retrying(&mut stream, &mut chunk[..want]) {
                Ok(0) => break,
                Ok(n) => buffer.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }
        }

        let actual = buffer.len() as u64;
        if actual < expected {
            return Err(StoreError::SizeMismatch {
                name: name.to_string(),
                expected,
                actual,
            });
        }

        // One more read lets the decoder verify the checksum and catches
        // entries longer than declared.
        if read_retrying(&mut stream, &mut chunk[..1])? != 0 {
            return Err(StoreError::corrupt(format!(
                "entry '{}' is longer than its declared {} bytes",
                name, expected
            )));
        }

        Ok(buffer)
    }

    /// Decode `name` as JSON into `T`.
    pub fn read_object<T: DeserializeOwned>(&mut self, name: &str) -> StoreResult<T> {
        self.read_object_with(name, &ObjectCodec::default())
    }

    pub fn read_object_with<T: DeserializeOwned>(
        &mut self,
        name: &str,
        codec: &ObjectCodec,
    ) -> StoreResult<T> {
        let stream = self.open_entry_stream(name)?;
        codec.deserialize(stream)
    }

    /// Extract every file entry below `folder` with default options.
    ///
    /// Consumes the reader: the container and its source are released when
    /// this returns, whichever way it returns.
    pub fn extract_all(
        self,
        root: &StorageRoot,
        folder: impl AsRef<Path>,
    ) -> StoreResult<ExtractSummary> {
        self.extract_all_with(root, folder, &ExtractOptions::default())
    }

    pub fn extract_all_with(
        mut self,
        root: &StorageRoot,
        folder: impl AsRef<Path>,
        options: &ExtractOptions,
    ) -> StoreResult<ExtractSummary> {
        extract_archive(&mut self.archive, root, folder.as_ref(), options)
    }

    /// Release the container and hand back the source.
    pub fn close(self) -> R {
        self.archive.into_inner()
    }
}

impl ArchiveReader<BufReader<File>> {
    /// Open a container stored inside `root`.
    pub fn open_file(root: &StorageRoot, path: impl AsRef<Path>) -> StoreResult<Self> {
        let file = root.open_file(path)?;
        Self::open(BufReader::new(file))
    }
}

impl<R: Read + Seek> std::fmt::Debug for ArchiveReader<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveReader")
            .field("entries", &self.entries)
            .finish()
    }
}

/// Decompressing stream over one entry; borrows its reader.
pub struct EntryStream<'a> {
    entry: ArchiveEntry,
    inner: zip::read::ZipFile<'a>,
}

impl EntryStream<'_> {
    pub fn entry(&self) -> &ArchiveEntry {
        &self.entry
    }
}

impl std::fmt::Debug for EntryStream<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryStream")
            .field("entry", &self.entry)
            .finish_non_exhaustive()
    }
}

impl Read for EntryStream<'_> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.read(buf)
    }
}

fn open_error(err: ZipError) -> StoreError {
    match err {
        ZipError::Io(e) if e.kind() != ErrorKind::UnexpectedEof => StoreError::Io(e),
        other => StoreError::corrupt(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{Compression, EntryPayload};
    use std::io::Cursor;
    use tempfile::TempDir;

    fn build_archive(entries: &[(&str, &[u8], Compression)]) -> (StorageRoot, TempDir, Vec<u8>) {
        let temp_dir = TempDir::new().unwrap();
        let root = StorageRoot::new(temp_dir.path()).unwrap();

        let mut session = root.write_session();
        session.begin("test.zip").unwrap();
        for (name, bytes, compression) in entries {
            session
                .write_entry(name, EntryPayload::Bytes(bytes), *compression)
                .unwrap();
        }
        session.finalize().unwrap();

        let bytes = std::fs::read(root.resolve("test.zip").unwrap()).unwrap();
        (root, temp_dir, bytes)
    }

    /// Overwrite the declared uncompressed size in the (single) central
    /// directory record.
    fn patch_declared_size(archive: &mut [u8], size: u32) {
        let signature = [0x50, 0x4b, 0x01, 0x02];
        let start = archive
            .windows(4)
            .position(|w| w == signature)
            .expect("central directory header");
        archive[start + 24..start + 28].copy_from_slice(&size.to_le_bytes());
    }

    #[test]
    fn test_entries_in_container_order() {
        let (_root, _temp_dir, bytes) = build_archive(&[
            ("zeta.txt", b"z", Compression::Stored),
            ("alpha.txt", b"a", Compression::Deflated),
            ("mid/beta.txt", b"b", Compression::Stored),
        ]);

        let reader = ArchiveReader::open(Cursor::new(bytes)).unwrap();
        assert_eq!(
            reader.entry_names(),
            vec!["zeta.txt", "alpha.txt", "mid/beta.txt"]
        );

        let alpha = reader.entry("alpha.txt").unwrap();
        assert!(alpha.compressed);
        assert_eq!(alpha.size, 1);
        assert!(!reader.entry("zeta.txt").unwrap().compressed);
    }

    #[test]
    fn test_read_entry_exact_bytes() {
        let payload: Vec<u8> = (0..10_000u32).map(|i| (i % 7) as u8).collect();
        let (_root, _temp_dir, bytes) = build_archive(&[
            ("stored.bin", &payload, Compression::Stored),
            ("deflated.bin", &payload, Compression::Deflated),
        ]);

        let mut reader = ArchiveReader::open(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.read_entry("stored.bin").unwrap(), payload);
        assert_eq!(reader.read_entry("deflated.bin").unwrap(), payload);
    }

    #[test]
    fn test_missing_entry() {
        let (_root, _temp_dir, bytes) = build_archive(&[("a.txt", b"a", Compression::Stored)]);
        let mut reader = ArchiveReader::open(Cursor::new(bytes)).unwrap();

        let err = reader.open_entry_stream("b.txt").unwrap_err();
        assert!(matches!(err, StoreError::EntryNotFound { ref name } if name == "b.txt"));

        let stream = reader.open_entry_stream("a.txt").unwrap();
        assert!(format!("{:?}", stream).contains("a.txt"));
    }

    #[test]
    fn test_declared_size_larger_than_data_is_size_mismatch() {
        let (_root, _temp_dir, mut bytes) =
            build_archive(&[("hello.txt", b"hi", Compression::Stored)]);
        patch_declared_size(&mut bytes, 10);

        let mut reader = ArchiveReader::open(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.entry("hello.txt").unwrap().size, 10);

        let err = reader.read_entry("hello.txt").unwrap_err();
        match err {
            StoreError::SizeMismatch {
                name,
                expected,
                actual,
            } => {
                assert_eq!(name, "hello.txt");
                assert_eq!(expected, 10);
                assert_eq!(actual, 2);
            }
            other => panic!("expected SizeMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_garbage_is_corrupt_archive() {
        let err = ArchiveReader::open(Cursor::new(b"definitely not a zip file".to_vec()))
            .unwrap_err();
        assert!(matches!(err, StoreError::CorruptArchive { .. }));

        let err = ArchiveReader::open(Cursor::new(Vec::new())).unwrap_err();
        assert!(matches!(err, StoreError::CorruptArchive { .. }));
    }

    #[test]
    fn test_entry_stream_reports_metadata() {
        let (_root, _temp_dir, bytes) =
            build_archive(&[("notes.txt", b"some notes", Compression::Deflated)]);
        let mut reader = ArchiveReader::open(Cursor::new(bytes)).unwrap();

        let mut stream = reader.open_entry_stream("notes.txt").unwrap();
        assert_eq!(stream.entry().size, 10);

        let mut text = String::new();
        stream.read_to_string(&mut text).unwrap();
        assert_eq!(text, "some notes");
    }

    #[test]
    fn test_close_returns_source() {
        let (_root, _temp_dir, bytes) = build_archive(&[("a.txt", b"a", Compression::Stored)]);
        let len = bytes.len();

        let reader = ArchiveReader::open(Cursor::new(bytes)).unwrap();
        let source = reader.close();
        assert_eq!(source.into_inner().len(), len);
    }
}
