//! Storage backends.
//!
//! Every byte almanac persists goes through a [`StorageBackend`]: downloaded
//! originals and derived variants in the local cache, the snapshot and index
//! documents in the output directory, and published variants on the publish
//! target (a bucket or a plain directory).

pub mod backend;
pub mod error;
mod models;
mod path;

pub use crate::backend::StorageBackend;
pub use crate::models::FileInfo;
pub use crate::path::validate as validate_path;
use std::sync::Arc;

pub type BackendHandle = Arc<dyn StorageBackend + Send + Sync>;
