use crate::error::{ErrorKind, Result};
use crate::imaging;
use almanac_cache::DownloadCache;
use almanac_config::VariantSize;
use almanac_model::{Digest, ImageDescriptor, ImageRef, MediaRef, Orientation, ResolvedImage, Variant};
use almanac_storage::BackendHandle;
use exn::ResultExt;
use futures::future::{join_all, try_join_all};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use time::{OffsetDateTime, UtcOffset};
use tokio::sync::Semaphore;

/// Where derived variants live inside the cache storage.
const VARIANT_DIR: &str = "variants";

/// Work done by the pipeline so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MediaStats {
    pub resolved: usize,
    pub downloads: usize,
    pub resizes: usize,
    pub uploads: usize,
}
impl Display for MediaStats {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(
            f,
            "{} resolved, {} downloaded, {} resized, {} uploaded",
            self.resolved, self.downloads, self.resizes, self.uploads
        )
    }
}

#[derive(Debug, Default)]
struct Counters {
    resolved: AtomicUsize,
    downloads: AtomicUsize,
    resizes: AtomicUsize,
    uploads: AtomicUsize,
}
impl Counters {
    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Resolves image references into published variants.
///
/// Every step is skipped when its output already exists: originals are
/// downloaded once (see [`DownloadCache`]), variants are resized once into
/// the cache storage and uploaded once to the publish target. Cloning is
/// cheap and clones share the concurrency limit and the counters.
#[derive(Clone)]
pub struct MediaPipeline {
    cache: DownloadCache,
    publish: BackendHandle,
    public_base_url: String,
    variants: Arc<BTreeMap<String, VariantSize>>,
    permits: Arc<Semaphore>,
    counters: Arc<Counters>,
}
impl MediaPipeline {
    pub fn new(
        cache: DownloadCache,
        publish: BackendHandle,
        public_base_url: impl Into<String>,
        variants: BTreeMap<String, VariantSize>,
        concurrency: usize,
    ) -> Self {
        Self {
            cache,
            publish,
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
            variants: Arc::new(variants),
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn stats(&self) -> MediaStats {
        MediaStats {
            resolved: self.counters.resolved.load(Ordering::Relaxed),
            downloads: self.counters.downloads.load(Ordering::Relaxed),
            resizes: self.counters.resizes.load(Ordering::Relaxed),
            uploads: self.counters.uploads.load(Ordering::Relaxed),
        }
    }

    /// Resolve every image of an entity. Fails if any of them fails.
    pub async fn resolve_all(&self, images: Vec<ImageRef>, date: OffsetDateTime) -> Result<Vec<MediaRef>> {
        try_join_all(images.into_iter().map(|image| async move {
            let resolved = self.resolve(&image, date).await?;
            Ok::<_, crate::error::Error>(MediaRef::resolved(image, resolved))
        }))
        .await
    }

    /// Fetch (or reuse) the original, measure it, and make sure every
    /// configured variant is derived and published.
    ///
    /// `date` is the owning entity's date; it only decides where variants
    /// are published.
    #[tracing::instrument(skip(self, image, date), fields(src = %image.src))]
    pub async fn resolve(&self, image: &ImageRef, date: OffsetDateTime) -> Result<ResolvedImage> {
        let _permit = self.permits.acquire().await.or_raise(|| ErrorKind::Shutdown)?;

        let file = self.cache.fetch(&image.src).await.map_err(ErrorKind::cache)?;
        if file.downloaded {
            Counters::bump(&self.counters.downloads);
        }
        let (width, height) = imaging::measure(&file.bytes, &image.src)?;
        let original = ImageDescriptor::new(image.src.clone(), image.alt.clone(), width, height);

        let source = Arc::new(file.bytes);
        let results = join_all(self.variants.iter().map(|(name, size)| {
            let job = VariantJob {
                name,
                size: *size,
                digest: &file.digest,
                orientation: original.orientation,
                width,
                height,
                date,
                alt: image.alt.as_deref(),
            };
            self.variant(job, source.clone())
        }))
        .await;

        // Every variant has finished (one way or the other) by now; report
        // all the failures, not just the first.
        let mut variants = BTreeMap::new();
        let mut failures = Vec::new();
        for result in results {
            match result {
                Ok((name, variant)) => {
                    variants.insert(name, variant);
                },
                Err(err) => {
                    tracing::warn!(src = %image.src, error = %err, "Variant failed");
                    failures.push(err);
                },
            }
        }
        if let Some(first) = failures.into_iter().next() {
            return Err(first);
        }

        Counters::bump(&self.counters.resolved);
        Ok(ResolvedImage { original, variants })
    }

    async fn variant(&self, job: VariantJob<'_>, source: Arc<Vec<u8>>) -> Result<(String, Variant)> {
        let target_width = job.size.width(job.orientation);
        let target_height = imaging::target_height(target_width, job.width, job.height);
        let key = VariantKey {
            digest: job.digest,
            name: job.name,
            width: target_width,
            height: target_height,
            quality: job.size.quality,
        };
        let local = variant_path(&key);
        let publish = publish_path(job.date, &key);

        let published = self.publish.exists(&publish).await.or_raise(|| upload_failed(&publish))?;
        if published {
            tracing::debug!(path = %publish.display(), "Variant already published");
        } else {
            let storage = self.cache.storage();
            let bytes = if storage.exists(&local).await.or_raise(|| ErrorKind::Cache)? {
                storage.read(&local).await.or_raise(|| ErrorKind::Cache)?
            } else {
                let name = local.display().to_string();
                let quality = job.size.quality;
                let bytes = tokio::task::spawn_blocking(move || {
                    imaging::resize_jpeg(&source, target_width, target_height, quality, &name)
                })
                .await
                .or_raise(|| ErrorKind::UnableToResizeImage(local.display().to_string()))??;
                storage.write(&local, &bytes).await.or_raise(|| ErrorKind::Cache)?;
                Counters::bump(&self.counters.resizes);
                tracing::debug!(path = %local.display(), width = target_width, height = target_height, "Resized");
                bytes
            };
            self.publish.write(&publish, &bytes).await.or_raise(|| upload_failed(&publish))?;
            Counters::bump(&self.counters.uploads);
            tracing::info!(target = self.publish.name(), path = %publish.display(), "Published");
        }

        let path = publish.to_string_lossy().into_owned();
        let url = format!("{}/{}", self.public_base_url, path);
        let image = ImageDescriptor::new(url, job.alt.map(str::to_string), target_width, target_height);
        Ok((job.name.to_string(), Variant { image, path }))
    }
}

struct VariantJob<'a> {
    name: &'a str,
    size: VariantSize,
    digest: &'a Digest,
    orientation: Orientation,
    width: u32,
    height: u32,
    date: OffsetDateTime,
    alt: Option<&'a str>,
}

fn upload_failed(path: &std::path::Path) -> ErrorKind {
    ErrorKind::UnableToUploadFile(path.display().to_string())
}

/// Everything that decides the bytes of a derived variant.
///
/// Renders as the variant's file name, `{digest}-{name}-{w}x{h}-q{quality}.jpg`,
/// so changing a configured size or quality derives (and publishes) a new
/// file instead of finding the old one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VariantKey<'a> {
    pub digest: &'a Digest,
    pub name: &'a str,
    pub width: u32,
    pub height: u32,
    pub quality: u8,
}
impl Display for VariantKey<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(
            f,
            "{}-{}-{}x{}-q{}.jpg",
            self.digest, self.name, self.width, self.height, self.quality
        )
    }
}

/// `variants/{file}`, inside the cache storage.
pub fn variant_path(key: &VariantKey<'_>) -> PathBuf {
    PathBuf::from(VARIANT_DIR).join(key.to_string())
}

/// `{yyyy}/{mm}/{dd}/{file}`, on the publish target, dated in UTC.
pub fn publish_path(date: OffsetDateTime, key: &VariantKey<'_>) -> PathBuf {
    let date = date.to_offset(UtcOffset::UTC);
    PathBuf::from(format!(
        "{:04}/{:02}/{:02}/{key}",
        date.year(),
        u8::from(date.month()),
        date.day()
    ))
}
