//! Bulk extraction into a storage root.
//!
//! Two front-ends share one per-entry path:
//!
//! - [`extract_archive`] walks a seekable container in central-directory
//!   order (used by `ArchiveReader::extract_all`).
//! - [`extract_stream`] walks local headers of a non-seekable stream, so a
//!   network body can be extracted as it arrives without being buffered.
//!   Entries sized only by a trailing data descriptor are accepted.
//!
//! Directory entries are skipped; folders are recreated from file paths.
//! Files extracted before a failure stay on disk.

use std::io::{Read, Seek, Write};
use std::path::Path;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use zip::ZipArchive;

use crate::archive::limits::ExtractLimits;
use crate::archive::local::LocalReader;
use crate::archive::names::sanitize_entry_name;
use crate::error::{StoreError, StoreResult};
use crate::io::copy_chunked;
use crate::root::{non_empty_parent, CollisionPolicy, StorageRoot};

/// Limits and cancellation for one extraction.
#[derive(Debug, Clone, Default)]
pub struct ExtractOptions {
    pub limits: ExtractLimits,
    pub cancel: CancellationToken,
}

impl ExtractOptions {
    pub fn with_limits(mut self, limits: ExtractLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// What an extraction wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractSummary {
    pub files: usize,
    pub directories_skipped: usize,
    pub bytes: u64,
}

/// Extract a container from a non-seekable stream.
///
/// Stops at the central directory, so a container with no entries yields
/// an empty summary. Each entry's CRC-32 and sizes are checked once its
/// data ends. The source is dropped before this returns.
pub fn extract_stream<R: Read>(
    source: R,
    root: &StorageRoot,
    folder: impl AsRef<Path>,
    options: &ExtractOptions,
) -> StoreResult<ExtractSummary> {
    let mut extractor = Extractor::new(root, folder.as_ref(), options)?;
    let mut source = LocalReader::new(source);

    loop {
        extractor.check_cancelled()?;

        let Some(header) = source.next_header()? else {
            break;
        };

        let mut body = source.body(&header);
        extractor.entry(&header.name, header.is_dir(), header.declared_size(), &mut body)?;
        body.finish(&header.name)?;
    }

    Ok(extractor.finish())
}

pub(crate) fn extract_archive<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    root: &StorageRoot,
    folder: &Path,
    options: &ExtractOptions,
) -> StoreResult<ExtractSummary> {
    let mut extractor = Extractor::new(root, folder, options)?;

    for index in 0..archive.len() {
        extractor.check_cancelled()?;

        let mut file = archive
            .by_index(index)
            .map_err(|e| StoreError::from_zip(e, &format!("entry #{}", index)))?;

        let name = file.name().to_string();
        let is_dir = file.is_dir();
        let declared = file.size();
        extractor.entry(&name, is_dir, declared, &mut file)?;
    }

    Ok(extractor.finish())
}

struct Extractor<'a> {
    root: &'a StorageRoot,
    folder: &'a Path,
    limits: ExtractLimits,
    cancel: &'a CancellationToken,
    summary: ExtractSummary,
}

impl<'a> Extractor<'a> {
    fn new(
        root: &'a StorageRoot,
        folder: &'a Path,
        options: &'a ExtractOptions,
    ) -> StoreResult<Self> {
        // Validates the folder itself before any entry is touched.
        root.resolve(folder)?;

        Ok(Self {
            root,
            folder,
            limits: options.limits,
            cancel: &options.cancel,
            summary: ExtractSummary::default(),
        })
    }

    fn check_cancelled(&self) -> StoreResult<()> {
        if self.cancel.is_cancelled() {
            warn!(
                folder = %self.folder.display(),
                files = self.summary.files,
                "extraction cancelled"
            );
            return Err(StoreError::Cancelled);
        }
        Ok(())
    }

    fn entry<E: Read + ?Sized>(
        &mut self,
        name: &str,
        is_dir: bool,
        declared: u64,
        reader: &mut E,
    ) -> StoreResult<()> {
        if is_dir {
            self.summary.directories_skipped += 1;
            return Ok(());
        }

        if self.summary.files >= self.limits.max_entries {
            return Err(StoreError::LimitExceeded {
                message: format!("more than {} file entries", self.limits.max_entries),
            });
        }

        if declared > self.limits.max_entry_bytes {
            return Err(StoreError::LimitExceeded {
                message: format!(
                    "entry '{}' declared size {} exceeds limit {}",
                    name, declared, self.limits.max_entry_bytes
                ),
            });
        }

        let relative = self
            .folder
            .join(sanitize_entry_name(name, self.limits.max_name_len)?);

        if let Some(parent) = non_empty_parent(&relative) {
            self.root
                .create_folder(parent, CollisionPolicy::OpenIfExists)?;
        }

        let mut file = self.root.create_file_in_place(&relative)?;

        let remaining_total = self.limits.max_total_bytes.saturating_sub(self.summary.bytes);
        let limit = self.limits.max_entry_bytes.min(remaining_total);
        let written = copy_chunked(reader, &mut file, limit, Some(self.cancel))?;
        file.flush()?;

        debug!(entry = %name, bytes = written, "extracted entry");

        self.summary.files += 1;
        self.summary.bytes += written;
        Ok(())
    }

    fn finish(self) -> ExtractSummary {
        info!(
            folder = %self.folder.display(),
            files = self.summary.files,
            bytes = self.summary.bytes,
            "extraction complete"
        );
        self.summary
    }
}
