//! A full run: load every source, merge, persist, index.
//!
//! ```text
//! read previous ─▶ load sources (concurrently) ─▶ merge with fallbacks ─▶ write snapshot ─▶ write indexes
//! ```
//!
//! Sources are independent: a source that fails (or panics) keeps its
//! previous data and never cancels the others. Only failing to persist the
//! result fails the run.

use crate::error::Result;
use crate::index::Indexes;
use crate::load::{LoadStats, LoaderHandle};
use crate::{Context, persist};
use almanac_media::MediaStats;
use almanac_model::Snapshot;
use almanac_storage::BackendHandle;
use futures::FutureExt;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::task::JoinSet;

/// What became of a single source during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceOutcome {
    Loaded(LoadStats),
    /// The source failed; its previous data was kept.
    FellBack,
}
impl Display for SourceOutcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Loaded(stats) => write!(f, "loaded ({stats})"),
            Self::FellBack => f.write_str("kept previous data"),
        }
    }
}

/// Summary of a completed run.
#[derive(Debug, Clone)]
pub struct SyncReport {
    pub outcomes: BTreeMap<&'static str, SourceOutcome>,
    pub media: MediaStats,
    /// Timeline entities in the new snapshot.
    pub entities: usize,
}
impl SyncReport {
    /// Names of the sources that kept their previous data.
    pub fn fell_back(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.outcomes.iter().filter(|(_, outcome)| **outcome == SourceOutcome::FellBack).map(|(name, _)| *name)
    }
}

/// Run every loader against the previous snapshot and persist the result.
///
/// ### Errors
/// Only persistence failures are returned: `Persist` when the snapshot cannot
/// be written (in which case no index is written either) and `Index` when an
/// index document cannot.
#[tracing::instrument(skip_all, fields(loaders = loaders.len(), output = output.name()))]
pub async fn sync(ctx: Arc<Context>, loaders: Vec<LoaderHandle>, output: &BackendHandle) -> Result<SyncReport> {
    let previous = Arc::new(persist::read_previous(output.as_ref()).await);

    let mut tasks = JoinSet::new();
    for loader in loaders {
        let ctx = ctx.clone();
        let previous = previous.clone();
        tasks.spawn(async move {
            let name = loader.name();
            let result = AssertUnwindSafe(loader.load(&ctx, &previous)).catch_unwind().await;
            (name, result)
        });
    }

    // Every slice starts out as its previous value and is replaced only by
    // a source that loaded successfully.
    let mut next: Snapshot = (*previous).clone();
    let mut outcomes = BTreeMap::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((name, Ok(Ok(loaded)))) => {
                loaded.contribution.apply(&mut next);
                outcomes.insert(name, SourceOutcome::Loaded(loaded.stats));
            },
            Ok((name, Ok(Err(err)))) => {
                tracing::warn!(
                    source = name,
                    retryable = err.is_retryable(),
                    error = ?err,
                    "Source failed, keeping previous data"
                );
                outcomes.insert(name, SourceOutcome::FellBack);
            },
            Ok((name, Err(_))) => {
                tracing::warn!(source = name, "Source panicked, keeping previous data");
                outcomes.insert(name, SourceOutcome::FellBack);
            },
            // Panics are caught inside the task, so this is a cancelled
            // runtime rather than a misbehaving source.
            Err(err) => tracing::warn!(error = %err, "Source task did not complete"),
        }
    }
    next.last_updated = Some(OffsetDateTime::now_utc());

    if let Err(err) = persist::write_snapshot(output.as_ref(), &next).await {
        tracing::error!(error = ?err, "Unable to persist snapshot; indexes left untouched");
        return Err(err);
    }
    let indexes = Indexes::build(&next);
    persist::write_indexes(output.as_ref(), &indexes).await?;

    let report = SyncReport {
        outcomes,
        media: ctx.media.stats(),
        entities: next.len(),
    };
    for (name, outcome) in &report.outcomes {
        tracing::info!(source = name, %outcome, "Source summary");
    }
    tracing::info!(
        entities = report.entities,
        tags = indexes.tags.len(),
        media = %report.media,
        fell_back = report.fell_back().count(),
        "Sync complete"
    );
    Ok(report)
}

/// Rebuild the index documents from the persisted snapshot, without
/// contacting any source.
#[tracing::instrument(skip_all, fields(output = output.name()))]
pub async fn reindex(output: &BackendHandle) -> Result<Indexes> {
    let snapshot = persist::load_snapshot(output.as_ref()).await?;
    let indexes = Indexes::build(&snapshot);
    persist::write_indexes(output.as_ref(), &indexes).await?;
    tracing::info!(entities = indexes.timeline.len(), tags = indexes.tags.len(), "Rebuilt indexes");
    Ok(indexes)
}
