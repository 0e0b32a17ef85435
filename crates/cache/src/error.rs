//! Cache Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A cache error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for cache operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Source locator has no usable file extension (nothing was fetched)
    #[display("unable to get file extension: {_0}")]
    UnableToGetFileExtension(#[error(not(source))] String),
    /// Source locator is neither absolute nor relative to a configured base
    #[display("invalid url: {_0}")]
    InvalidUrl(#[error(not(source))] String),
    /// HTTP client could not be configured
    #[display("unable to build HTTP client")]
    Client,
    /// Network failure or non-success status
    #[display("unable to download file: {_0}")]
    UnableToDownloadFile(#[error(not(source))] String),
    /// Response arrived but its body is not what was expected
    #[display("unexpected response from {_0}")]
    UnexpectedResponse(#[error(not(source))] String),
    /// Reading or writing the local cache failed
    #[display("cache storage error")]
    Storage,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::UnableToDownloadFile(_) | Self::Storage)
    }
}
