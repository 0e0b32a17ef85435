//! Path validation.
//!
//! Every path handed to a backend is relative to that backend's root (a
//! cache directory, an output directory, a bucket prefix). Validation makes
//! sure nothing computed from remote data can climb out of that root.

use std::path::{Component, Path, PathBuf};

use crate::error::{ErrorKind, Result};

/// Validates and normalizes a storage path.
///
/// `.` components and repeated or trailing separators are dropped, `..` is
/// resolved as long as it never leaves the root. Null bytes, Windows path
/// prefixes and paths that normalize to nothing are rejected with
/// [`InvalidPath`](crate::error::ErrorKind::InvalidPath).
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use almanac_storage::validate_path;
///
/// assert!(validate_path("2024/03/01/0f3a9c-large.jpg").is_ok());
/// assert!(validate_path("variants/../0f3a9c.png").is_ok());
/// assert!(validate_path("../snapshot.json").is_err());
/// assert!(validate_path("a\0b").is_err());
/// assert_eq!(
///     validate_path("./variants//0f3a9c-small.jpg/").unwrap(),
///     Path::new("variants/0f3a9c-small.jpg")
/// );
/// ```
pub fn validate(path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    let mut components = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(s) => {
                // Null bytes survive Path::components() on Unix but truncate
                // in C-based syscalls.
                if s.as_encoded_bytes().contains(&0) {
                    exn::bail!(ErrorKind::InvalidPath(path.to_path_buf()));
                }
                components.push(s)
            },
            Component::CurDir | Component::RootDir => {},
            Component::Prefix(_) => exn::bail!(ErrorKind::InvalidPath(path.to_path_buf())),
            Component::ParentDir => {
                if components.pop().is_none() {
                    exn::bail!(ErrorKind::InvalidPath(path.to_path_buf()));
                }
            },
        }
    }
    match components.is_empty() {
        true => exn::bail!(ErrorKind::InvalidPath(path.to_path_buf())),
        false => Ok(components.into_iter().collect()),
    }
}
