//! Reading and writing the output directory.
//!
//! The snapshot is the only state carried between runs. The three index
//! documents are derived from it and regenerated in full every time, and
//! only once the snapshot itself has been written.

use crate::error::{ErrorKind, Result};
use crate::index::Indexes;
use almanac_model::Snapshot;
use almanac_storage::StorageBackend;
use almanac_storage::error::ErrorKind as StorageErrorKind;
use exn::ResultExt;
use serde::Serialize;
use std::path::Path;

pub const SNAPSHOT_PATH: &str = "snapshot.json";
pub const TIMELINE_PATH: &str = "timeline.json";
pub const TAGS_PATH: &str = "tags.json";
pub const YEARS_PATH: &str = "years.json";

/// Read the snapshot left by the previous run.
///
/// Returns [`MissingSnapshot`](ErrorKind::MissingSnapshot) when there is
/// none and [`ReadSnapshot`](ErrorKind::ReadSnapshot) when there is one but
/// it cannot be read or parsed.
pub async fn load_snapshot(output: &(dyn StorageBackend + Send + Sync)) -> Result<Snapshot> {
    let bytes = match output.read(Path::new(SNAPSHOT_PATH)).await {
        Ok(bytes) => bytes,
        Err(err) if matches!(&*err, StorageErrorKind::NotFound(_)) => exn::bail!(ErrorKind::MissingSnapshot),
        Err(err) => return Err(err.raise(ErrorKind::ReadSnapshot)),
    };
    serde_json::from_slice(&bytes).or_raise(|| ErrorKind::ReadSnapshot)
}

/// Like [`load_snapshot`], but a missing or unreadable snapshot is logged
/// and treated as "no previous data".
pub async fn read_previous(output: &(dyn StorageBackend + Send + Sync)) -> Snapshot {
    match load_snapshot(output).await {
        Ok(snapshot) => {
            tracing::debug!(backend = output.name(), entities = snapshot.len(), "Read previous snapshot");
            snapshot
        },
        Err(err) if matches!(&*err, ErrorKind::MissingSnapshot) => {
            tracing::info!(backend = output.name(), "No previous snapshot, starting from scratch");
            Snapshot::default()
        },
        Err(err) => {
            tracing::warn!(backend = output.name(), error = ?err, "Ignoring unreadable snapshot");
            Snapshot::default()
        },
    }
}

/// Write the snapshot, pretty-printed. Backends replace the file
/// atomically, so a failed write leaves the previous snapshot in place.
pub async fn write_snapshot(output: &(dyn StorageBackend + Send + Sync), snapshot: &Snapshot) -> Result<()> {
    let bytes = to_json(snapshot)?;
    output.write(Path::new(SNAPSHOT_PATH), &bytes).await.or_raise(|| ErrorKind::Persist)?;
    tracing::debug!(backend = output.name(), bytes = bytes.len(), "Wrote snapshot");
    Ok(())
}

/// Write the timeline, tag and year documents.
pub async fn write_indexes(output: &(dyn StorageBackend + Send + Sync), indexes: &Indexes) -> Result<()> {
    write_index(output, TIMELINE_PATH, &indexes.timeline).await?;
    write_index(output, TAGS_PATH, &indexes.tags).await?;
    write_index(output, YEARS_PATH, &indexes.years).await?;
    Ok(())
}

async fn write_index<T: Serialize>(
    output: &(dyn StorageBackend + Send + Sync),
    name: &'static str,
    index: &T,
) -> Result<()> {
    let bytes = to_json(index)?;
    output.write(Path::new(name), &bytes).await.or_raise(|| ErrorKind::Index(name))
}

fn to_json<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut bytes = serde_json::to_vec_pretty(value).or_raise(|| ErrorKind::Serialize)?;
    bytes.push(b'\n');
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use almanac_model::{Digest, Meta, MicroPost, OrderedEntitySet, Tags};
    use almanac_storage::backend::{LocalBackend, MockBackend};
    use time::macros::datetime;

    fn snapshot() -> Snapshot {
        Snapshot {
            micro_posts: OrderedEntitySet::from_entities([MicroPost {
                meta: Meta {
                    key: "a".to_string(),
                    date: datetime!(2024-03-01 00:00 UTC),
                    content_digest: Digest::of("a"),
                    tags: Tags::default(),
                    media: vec![],
                },
                body: "Hello".to_string(),
                description: "Hello".to_string(),
                permalink: "/micros/2024/03/01/a".to_string(),
            }]),
            last_updated: Some(datetime!(2024-03-02 08:00 UTC)),
            ..Snapshot::default()
        }
    }

    #[tokio::test]
    async fn test_roundtrip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let output = LocalBackend::new("output", dir.path()).unwrap();
        write_snapshot(&output, &snapshot()).await.unwrap();
        assert_eq!(load_snapshot(&output).await.unwrap(), snapshot());

        let text = std::fs::read_to_string(dir.path().join(SNAPSHOT_PATH)).unwrap();
        assert!(text.starts_with("{\n  "), "snapshot is pretty-printed");
    }

    #[tokio::test]
    async fn test_missing_snapshot() {
        let output = MockBackend::default();
        let err = load_snapshot(&output).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::MissingSnapshot));
        assert_eq!(read_previous(&output).await, Snapshot::default());
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_is_ignored() {
        let output = MockBackend::with_files([(SNAPSHOT_PATH, b"{\"micro_posts\": [".to_vec())]);
        let err = load_snapshot(&output).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::ReadSnapshot));
        assert_eq!(read_previous(&output).await, Snapshot::default());
    }

    #[tokio::test]
    async fn test_write_indexes() {
        let output = MockBackend::default();
        write_indexes(&output, &Indexes::build(&snapshot())).await.unwrap();
        for path in [TIMELINE_PATH, TAGS_PATH, YEARS_PATH] {
            assert!(output.exists(Path::new(path)).await.unwrap(), "{path} written");
        }
        let years = output.read(Path::new(YEARS_PATH)).await.unwrap();
        let years: serde_json::Value = serde_json::from_slice(&years).unwrap();
        assert_eq!(years, serde_json::json!([{"year": 2024, "keys": ["micro-post:a"]}]));
    }
}
