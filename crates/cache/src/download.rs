use crate::error::{ErrorKind, Result};
use crate::fetch::{Fetcher, redact};
use almanac_model::Digest;
use almanac_storage::BackendHandle;
use exn::{OptionExt, ResultExt};
use std::path::PathBuf;
use std::sync::Arc;
use url::Url;

/// Handle to any fetcher, shared between the cache and source adapters.
pub type FetcherHandle = Arc<dyn Fetcher + Send + Sync>;

/// A downloaded file, as held by the cache.
#[derive(Debug, Clone)]
pub struct CachedFile {
    /// Absolute URL the file was (or would have been) fetched from.
    pub url: Url,
    /// Digest of `url`; the cache key.
    pub digest: Digest,
    /// Path within the cache storage: `{digest}.{ext}`.
    pub path: PathBuf,
    pub bytes: Vec<u8>,
    /// `false` when the file was already cached and no request was made.
    pub downloaded: bool,
}

/// Content-addressed download cache.
///
/// Source URLs are treated as immutable, so entries are keyed by a digest of
/// the URL alone and never invalidated: if a file exists at the entry's path,
/// it's the right file.
#[derive(Clone)]
pub struct DownloadCache {
    fetcher: FetcherHandle,
    storage: BackendHandle,
    base_url: Option<Url>,
}
impl DownloadCache {
    pub fn new(fetcher: FetcherHandle, storage: BackendHandle) -> Self {
        Self {
            fetcher,
            storage,
            base_url: None,
        }
    }

    /// Relative source locators get joined onto `base_url`.
    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = Some(base_url);
        self
    }

    pub fn storage(&self) -> &BackendHandle {
        &self.storage
    }

    /// Turn a source locator into an absolute URL.
    pub fn resolve_url(&self, src: &str) -> Result<Url> {
        match Url::parse(src) {
            Ok(url) => Ok(url),
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                let Some(base) = &self.base_url else {
                    exn::bail!(ErrorKind::InvalidUrl(src.to_string()));
                };
                base.join(src).or_raise(|| ErrorKind::InvalidUrl(src.to_string()))
            },
            Err(err) => Err::<Url, _>(err).or_raise(|| ErrorKind::InvalidUrl(src.to_string())),
        }
    }

    /// Cache key and path of a URL. Pure: touches neither disk nor network.
    pub fn entry(&self, url: &Url) -> Result<(Digest, PathBuf)> {
        let extension = extension(url).ok_or_raise(|| ErrorKind::UnableToGetFileExtension(redact(url)))?;
        let digest = Digest::of(url.as_str());
        let path = PathBuf::from(format!("{digest}.{extension}"));
        Ok((digest, path))
    }

    /// Return the cached file for `src`, downloading it first if needed.
    ///
    /// The extension is checked before anything else, so a locator without
    /// one never reaches the network.
    #[tracing::instrument(skip(self), fields(storage = self.storage.name()))]
    pub async fn fetch(&self, src: &str) -> Result<CachedFile> {
        let url = self.resolve_url(src)?;
        let (digest, path) = self.entry(&url)?;

        if self.storage.exists(&path).await.or_raise(|| ErrorKind::Storage)? {
            let bytes = self.storage.read(&path).await.or_raise(|| ErrorKind::Storage)?;
            tracing::debug!(path = %path.display(), "Cache hit");
            return Ok(CachedFile {
                url,
                digest,
                path,
                bytes,
                downloaded: false,
            });
        }

        let bytes = self.fetcher.get(&url).await?;
        // Backends write atomically, so a concurrent writer of the same key
        // (same URL, same bytes) can never leave a torn file behind.
        self.storage.write(&path, &bytes).await.or_raise(|| ErrorKind::Storage)?;
        tracing::info!(url = %redact(&url), path = %path.display(), bytes = bytes.len(), "Downloaded");
        Ok(CachedFile {
            url,
            digest,
            path,
            bytes,
            downloaded: true,
        })
    }
}

/// Lowercased extension of the last path segment, if it has a plausible one.
fn extension(url: &Url) -> Option<String> {
    let segment = url.path_segments()?.last()?;
    let (stem, extension) = segment.rsplit_once('.')?;
    let plausible = !stem.is_empty()
        && !extension.is_empty()
        && extension.len() <= 5
        && extension.chars().all(|c| c.is_ascii_alphanumeric());
    plausible.then(|| extension.to_ascii_lowercase())
}
