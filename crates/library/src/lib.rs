//! Source loading, aggregation and persistence.
//!
//! A [`sync`](crate::sync::sync) run reads the previous snapshot, runs every
//! configured source through the [`load`] state machine concurrently, merges
//! the results (falling back to previous data for sources that failed),
//! writes the new snapshot and then rebuilds the [`index`] documents.

mod context;
pub mod error;
pub mod index;
pub mod load;
pub mod persist;
pub mod sources;
pub mod sync;

pub use crate::context::Context;
pub use crate::index::{Indexes, TagIndex, YearIndex};
pub use crate::load::{Contribution, Effort, LoadStats, Loaded, Loader, LoaderHandle, Source};
pub use crate::sync::{SourceOutcome, SyncReport, reindex, sync};

/// Records of a single source processed at once. Image work is limited
/// separately by the media pipeline.
pub(crate) const MAX_PROCESS_CONCURRENCY: usize = 100;
