//! Sandboxed storage root.
//!
//! Every logical path handed to a [`StorageRoot`] is relative to one base
//! directory. Absolute paths, `..` components and platform prefixes are
//! rejected before anything touches the filesystem.
//!
//! # Layout
//!
//! ```text
//! $STOWAGE_ROOT/            # or <data_local_dir>/stowage
//!   bundles/
//!     content.zip
//!   content/                # extraction target
//!     a/b/c.txt
//!   settings.json           # save_object / load_object
//! ```

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::archive::{ArchiveReader, ArchiveWriteSession, ExtractOptions, ExtractSummary};
use crate::codec::ObjectCodec;
use crate::error::{StoreError, StoreResult};

/// Environment variable naming the sandbox base directory.
pub const ROOT_ENV: &str = "STOWAGE_ROOT";

/// Result of an existence check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Existence {
    File,
    Folder,
    None,
}

/// What `create_folder` does when the folder is already there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CollisionPolicy {
    FailIfExists,
    #[default]
    OpenIfExists,
}

/// Name filter for [`StorageRoot::list_files`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum NameFilter {
    #[default]
    All,
    /// Substring match on the file name.
    Contains(String),
    /// Case-insensitive extension match, with or without the leading dot.
    Extension(String),
}

impl NameFilter {
    pub fn contains(needle: impl Into<String>) -> Self {
        Self::Contains(needle.into())
    }

    pub fn extension(ext: impl Into<String>) -> Self {
        Self::Extension(ext.into())
    }

    pub fn matches(&self, name: &str) -> bool {
        match self {
            Self::All => true,
            Self::Contains(needle) => name.contains(needle.as_str()),
            Self::Extension(ext) => {
                let ext = ext.trim_start_matches('.');
                Path::new(name)
                    .extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case(ext))
            }
        }
    }
}

#[derive(Debug)]
struct RootInner {
    base: PathBuf,
    session_open: AtomicBool,
}

/// A sandboxed base directory.
///
/// Cloning is cheap; clones share the base path and the single
/// write-session slot, so only one [`ArchiveWriteSession`] can be open
/// across all of them at a time.
#[derive(Debug, Clone)]
pub struct StorageRoot {
    inner: Arc<RootInner>,
}

impl StorageRoot {
    /// Open (and create if missing) a root at `base`.
    pub fn new(base: impl Into<PathBuf>) -> StoreResult<Self> {
        let base = base.into();
        fs::create_dir_all(&base)?;
        let base = base.canonicalize()?;
        debug!(root = %base.display(), "storage root ready");

        Ok(Self {
            inner: Arc::new(RootInner {
                base,
                session_open: AtomicBool::new(false),
            }),
        })
    }

    /// Open the root named by `STOWAGE_ROOT`, falling back to the
    /// platform's local data directory.
    pub fn from_env() -> StoreResult<Self> {
        let base = match std::env::var_os(ROOT_ENV) {
            Some(value) if !value.is_empty() => PathBuf::from(value),
            _ => default_base_dir()?,
        };
        Self::new(base)
    }

    /// Absolute base directory. Read-only, for diagnostics.
    pub fn base_path(&self) -> &Path {
        &self.inner.base
    }

    /// Resolve a logical path to its absolute location inside the root.
    pub fn resolve(&self, path: impl AsRef<Path>) -> StoreResult<PathBuf> {
        let path = path.as_ref();
        let mut resolved = self.inner.base.clone();

        for component in path.components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::CurDir => {}
                Component::ParentDir => {
                    return Err(StoreError::invalid_path(
                        display(path),
                        "parent directory components are not allowed",
                    ))
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(StoreError::invalid_path(
                        display(path),
                        "absolute paths are not allowed",
                    ))
                }
            }
        }

        Ok(resolved)
    }

    /// Check what, if anything, lives at `path`. Missing is not an error.
    pub fn exists(&self, path: impl AsRef<Path>) -> StoreResult<Existence> {
        let full = self.resolve(path)?;
        existence_at(&full)
    }

    pub fn is_file(&self, path: impl AsRef<Path>) -> StoreResult<bool> {
        Ok(self.exists(path)? == Existence::File)
    }

    pub fn is_folder(&self, path: impl AsRef<Path>) -> StoreResult<bool> {
        Ok(self.exists(path)? == Existence::Folder)
    }

    /// Create a folder (and any missing parents).
    ///
    /// A file occupying `path` is a collision under either policy.
    pub fn create_folder(
        &self,
        path: impl AsRef<Path>,
        policy: CollisionPolicy,
    ) -> StoreResult<PathBuf> {
        let path = path.as_ref();
        let full = self.resolve(path)?;

        match existence_at(&full)? {
            Existence::Folder => match policy {
                CollisionPolicy::OpenIfExists => Ok(full),
                CollisionPolicy::FailIfExists => Err(StoreError::Collision {
                    path: display(path),
                }),
            },
            Existence::File => Err(StoreError::Collision {
                path: display(path),
            }),
            Existence::None => {
                fs::create_dir_all(&full)?;
                debug!(path = %path.display(), "created folder");
                Ok(full)
            }
        }
    }

    /// Delete a file. Returns `false` if there was no file to delete.
    pub fn delete_file(&self, path: impl AsRef<Path>) -> StoreResult<bool> {
        let full = self.resolve(path.as_ref())?;
        if existence_at(&full)? != Existence::File {
            return Ok(false);
        }

        match fs::remove_file(&full) {
            Ok(()) => {
                debug!(path = %path.as_ref().display(), "deleted file");
                Ok(true)
            }
            // Raced with another deleter.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Names of the files directly inside `folder` that pass `filter`.
    ///
    /// Order is whatever the filesystem returns.
    pub fn list_files(
        &self,
        folder: impl AsRef<Path>,
        filter: &NameFilter,
    ) -> StoreResult<Vec<String>> {
        let folder = folder.as_ref();
        let full = self.resolve(folder)?;

        let dir = match fs::read_dir(&full) {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound {
                    path: display(folder),
                })
            }
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        for entry in dir {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(raw) => {
                    debug!(name = ?raw, "skipping file name that is not UTF-8");
                    continue;
                }
            };
            if filter.matches(&name) {
                names.push(name);
            }
        }

        Ok(names)
    }

    /// ZIP containers directly inside `folder`.
    pub fn list_archives(&self, folder: impl AsRef<Path>) -> StoreResult<Vec<String>> {
        self.list_files(folder, &NameFilter::extension("zip"))
    }

    /// Create or replace a file, creating missing parent folders.
    pub fn create_file(&self, path: impl AsRef<Path>) -> StoreResult<File> {
        let path = path.as_ref();
        if let Some(parent) = non_empty_parent(path) {
            self.create_folder(parent, CollisionPolicy::OpenIfExists)?;
        }
        self.create_file_in_place(path)
    }

    /// Create or replace a file whose parent folder already exists.
    pub(crate) fn create_file_in_place(&self, path: &Path) -> StoreResult<File> {
        let full = self.resolve(path)?;
        if existence_at(&full)? == Existence::Folder {
            return Err(StoreError::Collision {
                path: display(path),
            });
        }
        Ok(File::create(full)?)
    }

    /// Open an existing file for reading.
    pub fn open_file(&self, path: impl AsRef<Path>) -> StoreResult<File> {
        let path = path.as_ref();
        let full = self.resolve(path)?;
        File::open(full).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StoreError::NotFound {
                    path: display(path),
                }
            } else {
                e.into()
            }
        })
    }

    /// Serialize `value` as JSON into a standalone file (replacing it).
    pub fn save_object<T: Serialize + ?Sized>(
        &self,
        path: impl AsRef<Path>,
        value: &T,
    ) -> StoreResult<()> {
        let file = self.create_file(path.as_ref())?;
        let mut writer = BufWriter::new(file);
        ObjectCodec::default().serialize(&mut writer, value)?;
        writer.flush()?;
        Ok(())
    }

    /// Deserialize a standalone JSON file into `T`.
    pub fn load_object<T: DeserializeOwned>(&self, path: impl AsRef<Path>) -> StoreResult<T> {
        let file = self.open_file(path)?;
        ObjectCodec::default().deserialize(file)
    }

    /// A fresh, closed write session bound to this root.
    pub fn write_session(&self) -> ArchiveWriteSession {
        ArchiveWriteSession::new(self.clone())
    }

    /// Open a container stored inside this root.
    pub fn open_archive(
        &self,
        path: impl AsRef<Path>,
    ) -> StoreResult<ArchiveReader<BufReader<File>>> {
        ArchiveReader::open_file(self, path)
    }

    /// Extract a container stored inside this root into `folder`.
    pub fn extract_archive(
        &self,
        path: impl AsRef<Path>,
        folder: impl AsRef<Path>,
    ) -> StoreResult<ExtractSummary> {
        self.open_archive(path)?
            .extract_all_with(self, folder, &ExtractOptions::default())
    }

    pub(crate) fn acquire_session_slot(&self) -> StoreResult<SessionSlot> {
        self.inner
            .session_open
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| {
                StoreError::session("another write session is already open on this storage root")
            })?;

        Ok(SessionSlot {
            inner: Arc::clone(&self.inner),
        })
    }
}

/// Held by an open write session; frees the root's slot on drop.
#[derive(Debug)]
pub(crate) struct SessionSlot {
    inner: Arc<RootInner>,
}

impl Drop for SessionSlot {
    fn drop(&mut self) {
        self.inner.session_open.store(false, Ordering::Release);
    }
}

fn existence_at(full: &Path) -> StoreResult<Existence> {
    match fs::metadata(full) {
        Ok(meta) if meta.is_dir() => Ok(Existence::Folder),
        Ok(_) => Ok(Existence::File),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Existence::None),
        Err(e) => Err(e.into()),
    }
}

pub(crate) fn non_empty_parent(path: &Path) -> Option<&Path> {
    path.parent().filter(|p| !p.as_os_str().is_empty())
}

fn display(path: &Path) -> String {
    path.display().to_string()
}

fn default_base_dir() -> StoreResult<PathBuf> {
    dirs::data_local_dir()
        .map(|dir| dir.join("stowage"))
        .or_else(|| dirs::home_dir().map(|home| home.join(".stowage")))
        .ok_or_else(|| {
            StoreError::invalid_path(
                "",
                format!("could not determine a data directory; set {}", ROOT_ENV),
            )
        })
}
