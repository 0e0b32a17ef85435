//! Error types for the [`load`](super) module.
//!
//! Uses [`exn`] for automatic location tracking and error tree construction.

use derive_more::{Display, Error};

/// A load error with automatic location tracking via [`exn::Exn`].
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for load operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Classifies the origin of a load failure.
///
/// ### Operational Errors
/// Raised for a single record; the source's record policy decides whether
/// the record is skipped or the whole source fails.
/// - [`ErrorKind::MissingField`]
/// - [`ErrorKind::InvalidDate`]
/// - [`ErrorKind::InvalidRecord`]
///
/// ### Dependency Errors
/// - [`ErrorKind::Fetch`] - the raw records could not be listed or fetched;
///   always fails the whole source.
/// - [`ErrorKind::Storage`]
/// - [`ErrorKind::Media`] - an image of a record could not be resolved.
///
/// ### Wrappers
/// - [`ErrorKind::Record`] - names the record an operational or media error
///   belongs to.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("unable to fetch records")]
    Fetch,
    /// Reading the content directory (or one of its files) failed.
    Storage,
    #[display("unable to resolve media")]
    Media,
    #[display("missing required field `{_0}`")]
    MissingField(#[error(not(source))] &'static str),
    #[display("unrecognised date `{_0}`")]
    InvalidDate(#[error(not(source))] String),
    #[display("invalid record: {_0}")]
    InvalidRecord(#[error(not(source))] String),
    #[display("unable to process record {_0}")]
    Record(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Fetch | Self::Storage | Self::Media)
    }
}
