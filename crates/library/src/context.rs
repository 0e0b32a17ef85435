use almanac_cache::FetcherHandle;
use almanac_media::MediaPipeline;
use almanac_model::TagFilter;
use almanac_storage::BackendHandle;

/// Everything a loader may touch while it runs.
///
/// Shared by every loader of a run (behind an `Arc`), so nothing in here is
/// mutable apart from the media pipeline's counters and concurrency limit.
pub struct Context {
    /// Resolves images referenced by records.
    pub media: MediaPipeline,
    /// Fetches third-party feeds and APIs.
    pub fetcher: FetcherHandle,
    /// The content directory: markdown, album YAML and the archive file.
    pub content: BackendHandle,
    pub tags: TagFilter,
}
impl Context {
    pub fn new(media: MediaPipeline, fetcher: FetcherHandle, content: BackendHandle, tags: TagFilter) -> Self {
        Self {
            media,
            fetcher,
            content,
            tags,
        }
    }
}
