//! Library Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.
//!
//! Only failures that end a run surface here. A source that fails to load is
//! logged and replaced by its previous data; see [`sync`](crate::sync).

use derive_more::{Display, Error};

/// A library error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// A source could not be loaded. Only returned when loading a single
    /// source directly; a full sync falls back instead.
    #[display("unable to load source {_0}")]
    Load(#[error(not(source))] &'static str),
    /// The previous snapshot exists but could not be read or parsed.
    #[display("unable to read snapshot")]
    ReadSnapshot,
    /// There is no persisted snapshot to work from.
    #[display("no snapshot has been persisted yet")]
    MissingSnapshot,
    /// The new snapshot could not be written. Fatal to the run.
    #[display("unable to persist snapshot")]
    Persist,
    /// An index document could not be written.
    #[display("unable to write index {_0}")]
    Index(#[error(not(source))] &'static str),
    Serialize,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Load(_) | Self::Persist | Self::Index(_))
    }
}
