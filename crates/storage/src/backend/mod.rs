//! Storage backend trait and implementations.
//!
//! This module defines the `StorageBackend` trait, which provides a unified
//! interface for storage operations across different backends (local filesystem,
//! S3-compatible services, etc.).

mod local;
#[cfg(any(test, feature = "mock"))]
mod mock;
mod ro;
#[cfg(feature = "s3")]
mod s3;

pub use self::local::LocalBackend;
#[cfg(any(test, feature = "mock"))]
pub use self::mock::MockBackend;
pub use self::ro::ReadOnlyBackend;
#[cfg(feature = "s3")]
pub use self::s3::S3Backend;
use crate::error::Result;
use crate::models::FileInfo;
use async_trait::async_trait;
use futures::{Stream, TryStreamExt};
use std::path::Path;
use std::pin::Pin;

type FileInfoStream<'a> = Pin<Box<dyn Stream<Item = Result<FileInfo>> + Send + 'a>>;

/// Unified interface for storage backends.
///
/// All storage operations are asynchronous to efficiently handle network
/// operations and concurrent access. It's a glorified CRUD interface, minus
/// the D: nothing almanac stores is ever deleted.
///
/// # Path Handling
/// All paths are relative to the storage root and must be validated using
/// [`validate_path`](crate::validate_path) before use. Implementations should
/// enforce this validation.
///
/// # Examples
///
/// Put-if-absent, which is how derived images get published:
///
/// ```
/// use std::path::Path;
/// use almanac_storage::{backend::StorageBackend, error::Result};
///
/// async fn publish(target: &dyn StorageBackend, path: &Path, data: &[u8]) -> Result<bool> {
///     if target.exists(path).await? {
///         return Ok(false);
///     }
///     target.write(path, data).await?;
///     Ok(true)
/// }
/// ```
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Name of the configured backend. Used for logging only.
    fn name(&self) -> &str;

    /// List all files matching an optional prefix.
    ///
    /// Default implementation of this method is to collect all the results
    /// from [`list_stream()`](Self::list_stream) into a [`Vec`] before
    /// returning.
    async fn list(&self, prefix: Option<&Path>) -> Result<Vec<FileInfo>> {
        self.list_stream(prefix).try_collect().await
    }

    /// Stream file metadata matching an optional prefix.
    ///
    /// If a prefix is provided, only files whose paths start with the prefix
    /// (component-wise) are returned. Listing a prefix that doesn't exist
    /// yields nothing rather than an error. Ordering is unspecified; callers
    /// that need a stable order must sort.
    ///
    /// # Examples
    ///
    /// ```
    /// use futures::TryStreamExt;
    /// use std::path::Path;
    /// # use almanac_storage::{backend::StorageBackend, error::Result};
    /// # async fn example(backend: &dyn StorageBackend) -> Result<()> {
    /// let mut stream = backend.list_stream(Some(Path::new("blog")));
    /// while let Some(info) = stream.try_next().await? {
    ///     println!("{}: {} bytes", info.path.display(), info.size);
    /// }
    /// # Ok(())
    /// # }
    /// ```
    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> FileInfoStream<'a>;

    /// Check if a file exists.
    async fn exists(&self, path: &Path) -> Result<bool>;

    /// Read file contents.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the file
    /// does not exist.
    async fn read(&self, path: &Path) -> Result<Vec<u8>>;

    /// Write file contents.
    ///
    /// Creates a new file or overwrites an existing file with the provided
    /// data. Readers must never observe a half-written file: backends write
    /// somewhere private first and move the result into place (or rely on a
    /// remote store that does the same).
    ///
    /// # Notes
    /// - Implementations should create parent directories as needed.
    async fn write(&self, path: &Path, data: &[u8]) -> Result<()>;
}
