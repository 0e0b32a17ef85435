//! Read-only storage backend.
//!
//! Wraps another backend and drops write operations while still reporting
//! success. `almanac sync --dry-run` wraps the publish target in this so a
//! run can be rehearsed without uploading anything.

use async_trait::async_trait;
use std::path::Path;

use crate::{BackendHandle, StorageBackend, backend::FileInfoStream, error::Result};

/// Read-only storage backend.
///
/// Reads and existence checks go to the wrapped backend; writes are logged
/// as an [`info event`](tracing::Event) and skipped.
#[derive(Clone)]
pub struct ReadOnlyBackend {
    inner: BackendHandle,
}
impl ReadOnlyBackend {
    pub fn new(inner: BackendHandle) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl StorageBackend for ReadOnlyBackend {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> FileInfoStream<'a> {
        self.inner.list_stream(prefix)
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        self.inner.exists(path).await
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        self.inner.read(path).await
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        tracing::info!(
            target = self.inner.name(),
            path = %path.display(),
            bytes = data.len(),
            "Skipping write during read-only mode"
        );
        Ok(())
    }
}
