//! Local filesystem storage backend.
//!
//! This module provides a storage backend implementation for the local filesystem.
//! Files are stored in a configured directory and accessed using standard filesystem
//! operations via `tokio::fs` for async I/O.

use crate::backend::FileInfoStream;
use crate::error::ErrorKind;
use crate::{FileInfo, StorageBackend, error::Result, path::validate as validate_path};
use async_stream::stream;
use async_trait::async_trait;
use exn::ResultExt;
use std::ffi::OsString;
use std::fs::{Metadata, create_dir_all as sync_create_dir};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs::{self, DirEntry};

/// Distinguishes temporary files of concurrent writers within this process.
static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

enum WalkEntry {
    File(FileInfo),
    Descend(PathBuf),
    Skip,
}

/// Local filesystem storage backend.
///
/// Stores files in a directory on the local filesystem. All paths are relative
/// to the configured root directory. Writes are atomic: data lands in a
/// hidden temporary sibling first and is renamed over the destination.
///
/// # Examples
///
/// ```no_run
/// use almanac_storage::backend::LocalBackend;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let cache = LocalBackend::new("cache", "/var/cache/almanac")?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct LocalBackend {
    name: String,
    root: PathBuf,
}
impl LocalBackend {
    /// Create a new local filesystem backend.
    ///
    /// The root directory is created if it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is not absolute, or exists but is not a
    /// directory.
    pub fn new(name: impl Into<String>, root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_absolute() {
            exn::bail!(ErrorKind::InvalidPath(root));
        }

        if root.exists() {
            if !root.is_dir() {
                exn::bail!(ErrorKind::InvalidPath(root));
            }
        } else {
            // Use non-async here; it only happens once per run and it's not
            // worth the hassle of making the constructor async.
            sync_create_dir(&root).map_err(|e| Self::map_io_error(e, &root))?;
        }

        Ok(Self { name: name.into(), root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the absolute path for a relative storage path.
    ///
    /// Validates the path and joins it with the root directory.
    fn absolute_path(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let validated = validate_path(path.as_ref())?;
        Ok(self.root.join(validated))
    }

    /// Convert an absolute path back to a relative storage path.
    fn relative_path(&self, absolute: impl AsRef<Path>) -> Result<PathBuf> {
        let absolute = absolute.as_ref();
        if !absolute.is_absolute() {
            exn::bail!(ErrorKind::BackendError(format!(
                "attempting to get relative path of non-absolute path `{:?}`",
                absolute
            )))
        }
        let relative = absolute.strip_prefix(&self.root).or_raise(|| {
            ErrorKind::BackendError(format!("path `{:?}` is not within root `{:?}`", absolute, self.root))
        })?;
        // Validate path will also canonicalize it.
        validate_path(relative)
    }

    /// Hidden sibling of `destination` that a write goes to before being
    /// renamed into place.
    fn temporary_path(destination: &Path) -> PathBuf {
        let mut name = OsString::from(".");
        name.push(destination.file_name().unwrap_or_default());
        name.push(format!(".{}.{}.tmp", std::process::id(), TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)));
        destination.with_file_name(name)
    }

    fn is_hidden(path: &Path) -> bool {
        path.file_name().and_then(|n| n.to_str()).is_some_and(|n| n.starts_with('.'))
    }

    fn metadata(path: &Path, metadata: Metadata) -> Result<FileInfo> {
        let modified = metadata.modified().map_err(ErrorKind::Io)?;
        Ok(FileInfo::new(PathBuf::from(path), metadata.len(), modified))
    }

    fn map_io_error(e: std::io::Error, path: &Path) -> ErrorKind {
        match e.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied(path.to_path_buf()),
            _ => ErrorKind::Io(e),
        }
    }

    /// Inside the stream loop you can't `?` errors, so everything fallible
    /// about a single directory entry lives here instead.
    async fn process_entry(&self, entry: DirEntry, prefix: Option<&Path>) -> Result<WalkEntry> {
        let path = entry.path();
        if Self::is_hidden(&path) {
            return Ok(WalkEntry::Skip);
        }
        let metadata = entry.metadata().await.map_err(|e| Self::map_io_error(e, &path))?;
        let relative = self.relative_path(&path)?;
        if let Some(pfx) = prefix
            && !relative.starts_with(pfx)
        {
            return Ok(WalkEntry::Skip);
        }
        if metadata.is_dir() {
            return Ok(WalkEntry::Descend(path));
        }
        if metadata.is_file() {
            return Ok(WalkEntry::File(Self::metadata(&relative, metadata)?));
        }
        // Note: silently drop what is most likely a broken symlink.
        Ok(WalkEntry::Skip)
    }
}

#[async_trait]
impl StorageBackend for LocalBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> FileInfoStream<'a> {
        let validated_prefix = match prefix.map(validate_path).transpose() {
            Ok(pfx) => pfx,
            Err(e) => return Box::pin(futures::stream::once(async { Result::Err(e) })),
        };

        // Walk from the parent directory of the prefix path, so the prefix
        // "blog/2024" starts in "blog" and matches "blog/2024/post.md" and a
        // file called "blog/2024", but not "blog/2024-drafts/post.md"
        // (Path::starts_with is component-based).
        let start_dir = validated_prefix
            .as_ref()
            .map(|prefix| self.root.join(prefix).parent().unwrap_or(&self.root).to_path_buf())
            .unwrap_or_else(|| self.root.clone());
        let mut stack = vec![start_dir];

        Box::pin(stream! {
            'dirs: while let Some(current) = stack.pop() {
                let mut entries = match fs::read_dir(&current).await {
                    Ok(entries) => entries,
                    // Same as S3: listing a directory that doesn't exist
                    // is an empty list, not an error.
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                    Err(err) => {
                        yield Err(exn::Exn::from(Self::map_io_error(err, &current)));
                        continue 'dirs;
                    }
                };

                'entries: loop {
                    let entry = match entries.next_entry().await {
                        Ok(Some(entry)) => entry,
                        Ok(None) => break 'entries,
                        Err(e) => { yield Err(exn::Exn::from(Self::map_io_error(e, &current))); continue 'entries; },
                    };
                    match self.process_entry(entry, validated_prefix.as_deref()).await {
                        Ok(WalkEntry::File(f)) => yield Ok(f),
                        Ok(WalkEntry::Descend(d)) => stack.push(d),
                        Ok(WalkEntry::Skip) => {},
                        Err(e) => yield Err(e),
                    };
                }
            }
        })
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        let abs_path = self.absolute_path(path)?;
        Ok(fs::try_exists(&abs_path).await.map_err(ErrorKind::Io)?)
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let abs_path = self.absolute_path(path)?;
        Ok(fs::read(&abs_path).await.map_err(|e| Self::map_io_error(e, path))?)
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        let abs_path = self.absolute_path(path)?;
        // Create parent directories if needed, to keep behaviour
        // consistent with S3-compatible storage.
        if let Some(parent) = abs_path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| Self::map_io_error(e, path))?;
        }
        let temporary = Self::temporary_path(&abs_path);
        fs::write(&temporary, data).await.map_err(|e| Self::map_io_error(e, path))?;
        if let Err(e) = fs::rename(&temporary, &abs_path).await {
            if let Err(cleanup) = fs::remove_file(&temporary).await {
                tracing::warn!(path = %temporary.display(), error = %cleanup, "Could not remove temporary file");
            }
            exn::bail!(Self::map_io_error(e, path));
        }
        Ok(())
    }
}
