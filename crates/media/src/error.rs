//! Media Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use almanac_cache::error::{Error as CacheError, ErrorKind as CacheErrorKind};
use derive_more::{Display, Error};

/// A media error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for media operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("unable to get file extension: {_0}")]
    UnableToGetFileExtension(#[error(not(source))] String),
    #[display("unable to download file: {_0}")]
    UnableToDownloadFile(#[error(not(source))] String),
    /// Not an image, or an image without a usable width and height
    #[display("unable to get image size: {_0}")]
    UnableToGetImageSize(#[error(not(source))] String),
    #[display("unable to resize image: {_0}")]
    UnableToResizeImage(#[error(not(source))] String),
    #[display("unable to upload file: {_0}")]
    UnableToUploadFile(#[error(not(source))] String),
    /// Reading or writing the local cache failed
    #[display("local cache error")]
    Cache,
    #[display("media pipeline shut down")]
    Shutdown,
}

impl ErrorKind {
    /// Convert a cache error into a media error, keeping the cache crate's
    /// `Exn` frame as a child in the error tree.
    #[track_caller]
    pub fn cache(err: CacheError) -> Error {
        let kind = match &*err {
            CacheErrorKind::UnableToGetFileExtension(src) => Self::UnableToGetFileExtension(src.clone()),
            CacheErrorKind::UnableToDownloadFile(url) | CacheErrorKind::InvalidUrl(url) => {
                Self::UnableToDownloadFile(url.clone())
            },
            _ => Self::Cache,
        };
        err.raise(kind)
    }

    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::UnableToDownloadFile(_) | Self::UnableToUploadFile(_) | Self::Cache)
    }
}
