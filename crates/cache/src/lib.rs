//! Content-addressed download cache.
//!
//! Every image almanac derives starts life as a download. Downloads are
//! stored under a digest of their URL and kept forever, so a file is fetched
//! at most once no matter how many runs (or entities) refer to it.

mod download;
pub mod error;
pub mod fetch;

pub use crate::download::{CachedFile, DownloadCache, FetcherHandle};
pub use crate::fetch::{Fetcher, HttpFetcher, get_json};
