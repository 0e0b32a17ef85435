//! In-memory storage backend for testing.

use super::FileInfoStream;
use crate::StorageBackend;
use crate::error::{ErrorKind, Result};
use crate::models::FileInfo;
use crate::path::validate as validate_path;
use async_stream::stream;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use time::UtcDateTime;
use tokio::sync::RwLock;

/// In-memory storage backend for testing.
///
/// Files are stored in a `HashMap` behind a [`RwLock`], so all trait methods
/// can operate on `&self` without external synchronisation. Every call to
/// [`write()`](StorageBackend::write) is counted, which is how tests assert
/// that a publish target was (or wasn't) uploaded to.
///
/// # Examples
///
/// ```
/// use almanac_storage::backend::{MockBackend, StorageBackend};
/// use std::path::Path;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = MockBackend::with_files([
///     ("2024/03/01/abc-large.jpg", b"jpeg bytes"),
/// ]);
/// assert!(backend.exists(Path::new("2024/03/01/abc-large.jpg")).await?);
///
/// backend.write(Path::new("2024/03/01/abc-small.jpg"), b"jpeg bytes").await?;
/// assert_eq!(backend.write_count(), 1);
/// # Ok(())
/// # }
/// ```
pub struct MockBackend {
    name: String,
    storage: RwLock<HashMap<PathBuf, (UtcDateTime, Vec<u8>)>>,
    writes: AtomicUsize,
}

impl MockBackend {
    /// Create a mock backend pre-populated with files.
    ///
    /// Panics if any path fails validation (e.g. path traversal). If test
    /// setup is wrong, then test should not pass.
    pub fn with_files(files: impl IntoIterator<Item = (impl Into<PathBuf>, impl Into<Vec<u8>>)>) -> Self {
        let mut map = HashMap::new();
        let now = UtcDateTime::now();
        for (path, data) in files {
            let path = path.into();
            let Ok(validated) = validate_path(&path) else {
                // The panic here is DELIBERATE. MockBackend is intended to be
                // used in tests; panics are expected. There is no error result.
                panic!("MockBackend::with_files: invalid path {}", path.display());
            };
            map.insert(validated, (now, data.into()));
        }
        Self {
            name: "mock".to_string(),
            storage: RwLock::new(map),
            writes: AtomicUsize::new(0),
        }
    }

    /// Change the name of the mock backend.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Number of writes performed since construction. Files passed to
    /// [`with_files()`](Self::with_files) don't count.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}
impl Default for MockBackend {
    fn default() -> Self {
        let files: [(&str, &str); 0] = [];
        Self::with_files(files)
    }
}

#[async_trait]
impl StorageBackend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> FileInfoStream<'a> {
        let validated_prefix = match prefix.map(validate_path).transpose() {
            Ok(pfx) => pfx,
            Err(e) => return Box::pin(futures::stream::once(async { Err(e) })),
        };

        Box::pin(stream! {
            // Snapshot matching entries under the read lock, then drop it
            // before yielding to avoid holding the lock across yield points.
            let entries: Vec<(PathBuf, UtcDateTime, u64)> = {
                let guard = self.storage.read().await;
                guard
                    .iter()
                    .filter(|(path, _)| match &validated_prefix {
                        Some(pfx) => path.starts_with(pfx),
                        None => true,
                    })
                    .map(|(path, (inserted, data))| (path.clone(), *inserted, data.len() as u64))
                    .collect()
            };
            for (path, inserted, size) in entries {
                yield Ok(FileInfo::new(path, size, inserted));
            }
        })
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        let path = validate_path(path)?;
        Ok(self.storage.read().await.contains_key(&path))
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let path = validate_path(path)?;
        let (_inserted, data) =
            self.storage.read().await.get(&path).cloned().ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(path)))?;
        Ok(data)
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        let path = validate_path(path)?;
        self.storage.write().await.insert(path, (UtcDateTime::now(), data.to_vec()));
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_and_read() {
        let backend = MockBackend::default();
        backend.write(Path::new("snapshot.json"), b"{}").await.unwrap();
        assert_eq!(backend.read(Path::new("snapshot.json")).await.unwrap(), b"{}");
        assert_eq!(backend.write_count(), 1);
    }

    #[tokio::test]
    async fn test_with_files_are_not_counted() {
        let backend = MockBackend::with_files([
            ("2024/03/01/abc-large.jpg", Vec::from(*b"large")),
            ("2024/03/01/abc-small.jpg", Vec::from(*b"small")),
        ]);
        assert!(backend.exists(Path::new("2024/03/01/abc-large.jpg")).await.unwrap());
        assert!(!backend.exists(Path::new("2024/03/02/abc-large.jpg")).await.unwrap());
        assert_eq!(backend.write_count(), 0);
    }

    #[tokio::test]
    async fn test_read_not_found() {
        let backend = MockBackend::default();
        let err = backend.read(Path::new("missing.txt")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_list_with_prefix() {
        let backend = MockBackend::with_files([
            ("blog/first.md", Vec::from(*b"a")),
            ("blog/second.md", Vec::from(*b"b")),
            ("micros/third.md", Vec::from(*b"c")),
        ]);
        let files = backend.list(Some(Path::new("blog"))).await.unwrap();
        assert_eq!(files.len(), 2);
        let paths: Vec<_> = files.iter().map(|f| &f.path).collect();
        assert!(paths.contains(&&PathBuf::from("blog/first.md")));
        assert!(paths.contains(&&PathBuf::from("blog/second.md")));
    }

    #[tokio::test]
    async fn test_path_traversal_rejected() {
        let backend = MockBackend::default();
        assert!(backend.read(Path::new("../etc/passwd")).await.is_err());
        assert!(backend.write(Path::new("../escape"), b"bad").await.is_err());
        assert_eq!(backend.write_count(), 0);
    }

    #[test]
    #[should_panic(expected = "invalid path")]
    fn test_with_files_panics_on_bad_path() {
        MockBackend::with_files([("../escape", Vec::from(*b"bad"))]);
    }
}
