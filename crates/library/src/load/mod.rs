//! The loader state machine every source goes through.
//!
//! ```text
//! fetch ─▶ parse each ─▶ reuse or resolve each ─▶ assemble
//! ```
//!
//! A [`Source`] only describes how to fetch, parse, resolve and assemble its
//! records. Change detection, the record policy, concurrency and ordering are
//! handled once, here, for all of them.

mod contribution;
pub mod error;

pub use self::contribution::Contribution;
use self::error::{ErrorKind, Result};
use crate::error::{ErrorKind as LibraryErrorKind, Result as LibraryResult};
use crate::{Context, MAX_PROCESS_CONCURRENCY};
use almanac_config::RecordPolicy;
use almanac_model::{Digest, Record, Snapshot, should_reuse};
use async_trait::async_trait;
use exn::ResultExt;
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::sync::Arc;

/// A parsed record, ready for the reuse-or-resolve decision.
pub struct Draft<T> {
    /// Key of the entity this record becomes.
    pub key: String,
    /// Digest of the record's canonical source fields.
    pub digest: Digest,
    pub data: T,
}

/// Indicates how much work was required to produce an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effort {
    /// The digest matched the previous snapshot; the previous entity was
    /// copied verbatim, media included. No network or resize work.
    Reused,
    /// New or changed record; media was resolved and the entity rebuilt.
    Recomputed,
}

/// What a source did during a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadStats {
    pub reused: usize,
    pub recomputed: usize,
    /// Records dropped by a lenient record policy.
    pub skipped: usize,
}
impl LoadStats {
    fn record(&mut self, effort: Effort) {
        match effort {
            Effort::Reused => self.reused += 1,
            Effort::Recomputed => self.recomputed += 1,
        }
    }
}
impl Display for LoadStats {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{} reused, {} recomputed, {} skipped", self.reused, self.recomputed, self.skipped)
    }
}

/// The result of loading one source.
#[derive(Debug, Clone)]
pub struct Loaded {
    pub contribution: Contribution,
    pub stats: LoadStats,
}

/// A source of entities.
///
/// Implemented once per source type. Implementations stay thin: they know
/// their raw shape and how to turn it into entities, nothing else.
#[async_trait]
pub trait Source: Send + Sync + 'static {
    /// A record exactly as the source hands it over.
    type Raw: Send + 'static;
    /// A record after parsing, before any media has been resolved.
    type Parsed: Send + 'static;
    /// The entity (or group of entities) a record becomes.
    type Output: Record + Clone + Send + Sync + 'static;

    /// Name of the source. Used for logging and reporting.
    fn name(&self) -> &'static str;

    fn policy(&self) -> RecordPolicy;

    /// List every raw record. A failure here fails the whole source.
    async fn fetch(&self, ctx: &Context) -> Result<Vec<Self::Raw>>;

    /// Validate a raw record and compute its digest. Must not do any I/O.
    fn parse(&self, ctx: &Context, raw: Self::Raw) -> Result<Draft<Self::Parsed>>;

    /// The entity previously built for `key`, if the snapshot has one.
    fn previous(&self, snapshot: &Snapshot, key: &str) -> Option<Self::Output>;

    /// Build a fresh entity, resolving its media.
    ///
    /// Only called when [`should_reuse`] said no. `previous` is handed over
    /// anyway so composite sources can still reuse the parts that did not
    /// change.
    async fn resolve(
        &self,
        ctx: &Context,
        draft: Draft<Self::Parsed>,
        previous: Option<Self::Output>,
    ) -> Result<Self::Output>;

    /// Collect entities (in source order) into this source's contribution.
    fn assemble(&self, entities: Vec<Self::Output>, previous: &Snapshot) -> Contribution;
}

/// Anything that can produce a [`Contribution`].
///
/// Sources made of keyed entities go through [`EntityLoader`]; the ones that
/// are not, such as the collections and pages, implement this directly.
#[async_trait]
pub trait Loader: Send + Sync {
    fn name(&self) -> &'static str;

    async fn load(&self, ctx: &Context, previous: &Snapshot) -> Result<Loaded>;
}

pub type LoaderHandle = Arc<dyn Loader>;

/// Runs a [`Source`] through the state machine.
pub struct EntityLoader<S>(pub S);

#[async_trait]
impl<S: Source> Loader for EntityLoader<S> {
    fn name(&self) -> &'static str {
        self.0.name()
    }

    async fn load(&self, ctx: &Context, previous: &Snapshot) -> Result<Loaded> {
        load_inner(&self.0, ctx, previous).await
    }
}

/// Run a single source through the state machine.
pub async fn load<S: Source>(source: &S, ctx: &Context, previous: &Snapshot) -> LibraryResult<Loaded> {
    load_inner(source, ctx, previous).await.or_raise(|| LibraryErrorKind::Load(source.name()))
}

#[tracing::instrument(skip_all, fields(source = source.name()))]
pub(crate) async fn load_inner<S: Source>(source: &S, ctx: &Context, previous: &Snapshot) -> Result<Loaded> {
    let policy = source.policy();
    let raws = source.fetch(ctx).await?;
    let mut stats = LoadStats::default();

    let mut drafts = Vec::with_capacity(raws.len());
    for raw in raws {
        match source.parse(ctx, raw) {
            Ok(draft) => drafts.push(draft),
            Err(err) => skip_or_fail(source.name(), policy, err, &mut stats)?,
        }
    }

    // Records are processed out of order but collected by position, so the
    // assembled set still breaks date ties by source order.
    let mut futures: Vec<_> = drafts
        .into_iter()
        .enumerate()
        .map(|(position, draft)| async move { (position, process(source, ctx, previous, draft).await) })
        .collect();
    let mut slots: Vec<Option<S::Output>> = (0..futures.len()).map(|_| None).collect();
    let mut processing = FuturesUnordered::new();
    processing.extend(futures.drain(..MAX_PROCESS_CONCURRENCY.min(futures.len())));
    while let Some((position, result)) = processing.next().await {
        match result {
            Ok((entity, effort)) => {
                stats.record(effort);
                slots[position] = Some(entity);
            },
            Err(err) => skip(source.name(), err, &mut stats),
        }
        // Pop-n-push, but FIFO instead of LIFO.
        if !futures.is_empty() {
            processing.push(futures.remove(0));
        }
    }

    let contribution = source.assemble(slots.into_iter().flatten().collect(), previous);
    tracing::info!(source = source.name(), entities = contribution.len(), %stats, "Loaded source");
    Ok(Loaded { contribution, stats })
}

async fn process<S: Source>(
    source: &S,
    ctx: &Context,
    snapshot: &Snapshot,
    draft: Draft<S::Parsed>,
) -> Result<(S::Output, Effort)> {
    let previous = source.previous(snapshot, &draft.key);
    if should_reuse(previous.as_ref(), &draft.digest)
        && let Some(entity) = previous
    {
        tracing::debug!(source = source.name(), key = %draft.key, "Reusing unchanged record");
        return Ok((entity, Effort::Reused));
    }
    let key = draft.key.clone();
    let entity = source.resolve(ctx, draft, previous).await.or_raise(|| ErrorKind::Record(key.clone()))?;
    tracing::info!(source = source.name(), key = %key, "Recomputed record");
    Ok((entity, Effort::Recomputed))
}

/// Parse failures go through the record policy.
pub(crate) fn skip_or_fail(
    source: &'static str,
    policy: RecordPolicy,
    err: error::Error,
    stats: &mut LoadStats,
) -> Result<()> {
    match policy {
        RecordPolicy::Strict => Err(err),
        RecordPolicy::Lenient => {
            skip(source, err, stats);
            Ok(())
        },
    }
}

/// A record that parsed but could not be built (usually an image that
/// could not be resolved) is always skipped, whatever the policy.
fn skip(source: &'static str, err: error::Error, stats: &mut LoadStats) {
    tracing::warn!(source, error = %err, "Skipping record");
    stats.skipped += 1;
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::tests::Harness;
    use almanac_model::{DigestBuilder, Meta, MicroPost, OrderedEntitySet, Tags};
    use rstest::rstest;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use time::OffsetDateTime;
    use time::macros::datetime;

    /// A source of micro posts whose raw records are `(key, body, date)`.
    /// A record with an empty body fails to parse; a record with body
    /// `"unresolvable"` fails to resolve.
    struct Fixed {
        records: Vec<(&'static str, &'static str, OffsetDateTime)>,
        policy: RecordPolicy,
        resolved: AtomicUsize,
    }
    impl Fixed {
        fn new(records: Vec<(&'static str, &'static str, OffsetDateTime)>, policy: RecordPolicy) -> Self {
            Self {
                records,
                policy,
                resolved: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Source for Fixed {
        type Raw = (&'static str, &'static str, OffsetDateTime);
        type Parsed = (&'static str, OffsetDateTime);
        type Output = MicroPost;

        fn name(&self) -> &'static str {
            "fixed"
        }

        fn policy(&self) -> RecordPolicy {
            self.policy
        }

        async fn fetch(&self, _ctx: &Context) -> Result<Vec<Self::Raw>> {
            Ok(self.records.clone())
        }

        fn parse(&self, _ctx: &Context, (key, body, date): Self::Raw) -> Result<Draft<Self::Parsed>> {
            if body.is_empty() {
                exn::bail!(ErrorKind::MissingField("body"));
            }
            let digest = DigestBuilder::new("fixed").str(key).str(body).finish();
            Ok(Draft {
                key: key.to_string(),
                digest,
                data: (body, date),
            })
        }

        fn previous(&self, snapshot: &Snapshot, key: &str) -> Option<Self::Output> {
            snapshot.micro_posts.get(key).cloned()
        }

        async fn resolve(
            &self,
            _ctx: &Context,
            draft: Draft<Self::Parsed>,
            _previous: Option<Self::Output>,
        ) -> Result<Self::Output> {
            let (body, date) = draft.data;
            if body == "unresolvable" {
                exn::bail!(ErrorKind::Media);
            }
            self.resolved.fetch_add(1, Ordering::SeqCst);
            Ok(MicroPost {
                meta: Meta {
                    key: draft.key.clone(),
                    date,
                    content_digest: draft.digest,
                    tags: Tags::default(),
                    media: vec![],
                },
                body: body.to_string(),
                description: String::new(),
                permalink: format!("/micros/{}", draft.key),
            })
        }

        fn assemble(&self, entities: Vec<Self::Output>, previous: &Snapshot) -> Contribution {
            Contribution::MicroPosts(OrderedEntitySet::from_entities(entities).carry_forward(&previous.micro_posts))
        }
    }

    fn snapshot_of(contribution: Contribution) -> Snapshot {
        let mut snapshot = Snapshot::default();
        contribution.apply(&mut snapshot);
        snapshot
    }

    #[tokio::test]
    async fn test_second_run_reuses_everything() {
        let h = Harness::default();
        let records = vec![
            ("a", "first", datetime!(2024-03-01 00:00 UTC)),
            ("b", "second", datetime!(2024-01-15 00:00 UTC)),
        ];
        let source = Fixed::new(records.clone(), RecordPolicy::Strict);
        let first = load(&source, &h.context, &Snapshot::default()).await.unwrap();
        assert_eq!(first.stats, LoadStats { reused: 0, recomputed: 2, skipped: 0 });
        let previous = snapshot_of(first.contribution);

        let source = Fixed::new(records, RecordPolicy::Strict);
        let second = load(&source, &h.context, &previous).await.unwrap();
        assert_eq!(second.stats, LoadStats { reused: 2, recomputed: 0, skipped: 0 });
        assert_eq!(source.resolved.load(Ordering::SeqCst), 0);
        assert_eq!(snapshot_of(second.contribution).micro_posts, previous.micro_posts);
    }

    #[tokio::test]
    async fn test_edited_record_is_recomputed_under_same_key() {
        let h = Harness::default();
        let date = datetime!(2024-03-01 00:00 UTC);
        let source = Fixed::new(vec![("a", "before", date)], RecordPolicy::Strict);
        let previous = snapshot_of(load(&source, &h.context, &Snapshot::default()).await.unwrap().contribution);

        let source = Fixed::new(vec![("a", "after", date)], RecordPolicy::Strict);
        let loaded = load(&source, &h.context, &previous).await.unwrap();
        assert_eq!(loaded.stats.recomputed, 1);
        let snapshot = snapshot_of(loaded.contribution);
        let post = snapshot.micro_posts.get("a").unwrap();
        assert_eq!(post.body, "after");
        assert_ne!(post.meta.content_digest, previous.micro_posts.get("a").unwrap().meta.content_digest);
    }

    #[rstest]
    #[case::lenient_parse(RecordPolicy::Lenient, "", true)]
    #[case::lenient_resolve(RecordPolicy::Lenient, "unresolvable", true)]
    #[case::strict_parse(RecordPolicy::Strict, "", false)]
    #[case::strict_resolve(RecordPolicy::Strict, "unresolvable", true)]
    #[tokio::test]
    async fn test_record_policy(#[case] policy: RecordPolicy, #[case] bad_body: &'static str, #[case] loads: bool) {
        let h = Harness::default();
        let source = Fixed::new(
            vec![
                ("good", "fine", datetime!(2024-03-01 00:00 UTC)),
                ("bad", bad_body, datetime!(2024-02-01 00:00 UTC)),
            ],
            policy,
        );
        let result = load(&source, &h.context, &Snapshot::default()).await;
        assert_eq!(result.is_ok(), loads);
        if let Ok(loaded) = result {
            assert_eq!(loaded.stats.skipped, 1);
            assert_eq!(loaded.contribution.len(), 1);
        }
    }

    #[tokio::test]
    async fn test_date_ties_keep_source_order() {
        let h = Harness::default();
        let date = datetime!(2024-03-01 00:00 UTC);
        let keys = ["e", "d", "c", "b", "a"];
        let source = Fixed::new(keys.iter().map(|key| (*key, "body", date)).collect(), RecordPolicy::Strict);
        let snapshot = snapshot_of(load(&source, &h.context, &Snapshot::default()).await.unwrap().contribution);
        assert_eq!(snapshot.micro_posts.keys(), keys.map(String::from));
    }

    #[tokio::test]
    async fn test_vanished_records_are_carried_forward() {
        let h = Harness::default();
        let source = Fixed::new(
            vec![
                ("a", "kept", datetime!(2024-03-01 00:00 UTC)),
                ("b", "gone next time", datetime!(2024-01-01 00:00 UTC)),
            ],
            RecordPolicy::Strict,
        );
        let previous = snapshot_of(load(&source, &h.context, &Snapshot::default()).await.unwrap().contribution);

        let source = Fixed::new(vec![("a", "kept", datetime!(2024-03-01 00:00 UTC))], RecordPolicy::Strict);
        let snapshot = snapshot_of(load(&source, &h.context, &previous).await.unwrap().contribution);
        assert!(snapshot.micro_posts.contains("b"));
    }
}
