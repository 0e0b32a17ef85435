//! S3-compatible storage backend.
//!
//! This module provides a storage backend implementation for S3-compatible
//! services including AWS S3, Backblaze B2, Tigris (Fly.io), and others. In
//! almanac it's the usual publish target for derived images.
//!
//! # Credentials
//!
//! Credentials are provided explicitly via the configuration file
//! (`key_id` and `key_secret` on the publish target).

use crate::{
    FileInfo, StorageBackend,
    backend::FileInfoStream,
    error::{ErrorKind, Result},
    validate_path,
};
use async_stream::stream;
use async_trait::async_trait;
use aws_sdk_s3::{
    Client,
    config::{BehaviorVersion, Credentials, Region, retry::RetryConfig},
    error::DisplayErrorContext,
    primitives::{ByteStream, DateTime},
    types::ObjectCannedAcl,
};
use exn::{OptionExt, ResultExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Generous default for concurrent S3 requests.
const DEFAULT_CONCURRENT_REQUESTS: usize = 100;

/// S3-compatible storage backend.
///
/// Stores files in an S3 bucket, optionally under a key prefix. All paths are
/// relative to the configured prefix (if any).
///
/// # Examples
///
/// ```no_run
/// use almanac_storage::backend::S3Backend;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = S3Backend::new(
///     "cdn",
///     "my-bucket",
///     Some("media".to_string()),
///     "us-west-004",
///     Some("https://s3.us-west-004.backblazeb2.com".to_string()),
///     "access_key_id",
///     "secret_access_key",
/// )
/// .await?
/// .with_public_read(true);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct S3Backend {
    name: String,
    client: Client,
    bucket: String,
    prefix: Option<String>,
    /// Uploads get the `public-read` canned ACL. Some providers reject ACLs
    /// outright and expect a bucket policy instead, so it's opt-in.
    public_read: bool,
    /// Rate limiter for concurrent S3 requests.
    rate_limiter: Arc<Semaphore>,
}

impl S3Backend {
    /// Create a new S3 storage backend.
    ///
    /// # Arguments
    /// * `name` - A name for this backend (used in logging)
    /// * `bucket` - S3 bucket name
    /// * `prefix` - Optional key prefix (acts as virtual directory)
    /// * `region` - AWS region or provider-specific region (e.g., "us-west-004" for Backblaze)
    /// * `endpoint` - Custom endpoint URL for S3-compatible services
    /// * `key_id` - AWS/provider access key ID
    /// * `key_secret` - AWS/provider secret access key
    pub async fn new(
        name: impl Into<String>,
        bucket: impl Into<String>,
        prefix: Option<String>,
        region: impl Into<String>,
        endpoint: Option<impl Into<String>>,
        key_id: impl Into<String>,
        key_secret: impl Into<String>,
    ) -> Result<Self> {
        let prefix = prefix
            .map(validate_path)
            .transpose()?
            .map(|p| p.to_str().map(|s| s.to_string()).ok_or_raise(|| ErrorKind::InvalidPath(p.clone())))
            .transpose()?;
        let name = name.into();
        let bucket = bucket.into();
        let region = Region::new(region.into());
        let credentials = Credentials::new(key_id, key_secret, None, None, "almanac-config");
        let mut config_builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(region)
            // Configure retry policy with exponential backoff (1 initial + 3 retries)
            .retry_config(RetryConfig::standard().with_max_attempts(4))
            // Use path-style addressing for better compatibility with
            // S3-compatible services (Backblaze, MinIO, etc.)
            .force_path_style(true);
        if let Some(endpoint_url) = endpoint {
            config_builder = config_builder.endpoint_url(endpoint_url);
        }
        let client = Client::from_conf(config_builder.build());
        let rate_limiter = Arc::new(Semaphore::new(DEFAULT_CONCURRENT_REQUESTS));
        Ok(Self {
            name,
            client,
            bucket,
            prefix,
            public_read: false,
            rate_limiter,
        })
    }

    pub fn with_public_read(mut self, public_read: bool) -> Self {
        self.public_read = public_read;
        self
    }

    /// Construct the full S3 key from a relative path.
    fn full_key(&self, path: &Path) -> Result<String> {
        let validated = validate_path(path)?;
        let path_str = validated.to_str().ok_or_raise(|| ErrorKind::InvalidPath(validated.clone()))?;
        Ok(match &self.prefix {
            Some(prefix) => format!("{}/{}", prefix.trim_end_matches('/'), path_str),
            None => path_str.to_string(),
        })
    }

    /// Strip the configured prefix from an S3 key to get relative path.
    fn relative_path(&self, key: &str) -> Result<PathBuf> {
        let relative = match &self.prefix {
            Some(prefix) => {
                let prefix_normalized = prefix.trim_end_matches('/');
                key.strip_prefix(prefix_normalized).and_then(|s| s.strip_prefix('/')).unwrap_or(key)
            },
            None => key,
        };
        validate_path(relative)
    }

    /// Acquire a rate limiter permit before making an S3 API call.
    async fn acquire_permit(&self) -> Result<OwnedSemaphorePermit> {
        self.rate_limiter
            .clone()
            .acquire_owned()
            .await
            .or_raise(|| ErrorKind::BackendError("S3 rate limiter closed".to_string()))
    }

    /// Convert AWS DateTime to OffsetDateTime.
    fn parse_datetime(dt: &DateTime) -> Result<OffsetDateTime> {
        OffsetDateTime::from_unix_timestamp_nanos(dt.as_nanos())
            .or_raise(|| ErrorKind::BackendError("S3 datetime out of range".to_string()))
    }

    /// Content type for uploads, from the file extension.
    fn content_type(path: &Path) -> &'static str {
        match path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase).as_deref() {
            Some("jpg" | "jpeg") => "image/jpeg",
            Some("png") => "image/png",
            Some("webp") => "image/webp",
            Some("gif") => "image/gif",
            Some("json") => "application/json",
            _ => "application/octet-stream",
        }
    }
}

#[async_trait]
impl StorageBackend for S3Backend {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> FileInfoStream<'a> {
        let key_prefix = match prefix.map(|p| self.full_key(p)).transpose() {
            Ok(Some(key)) => Some(key),
            Ok(None) => self.prefix.as_ref().map(|p| format!("{}/", p.trim_end_matches('/'))),
            Err(e) => return Box::pin(futures::stream::once(async { Err(e) })),
        };

        Box::pin(stream! {
            let _permit = match self.acquire_permit().await {
                Ok(permit) => permit,
                Err(e) => { yield Err(e); return; },
            };
            let mut pages = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .set_prefix(key_prefix)
                .into_paginator()
                .send();
            while let Some(page) = pages.next().await {
                let page = match page {
                    Ok(page) => page,
                    Err(e) => {
                        yield Err(exn::Exn::from(ErrorKind::Network(DisplayErrorContext(&e).to_string())));
                        return;
                    },
                };
                for object in page.contents() {
                    let Some(key) = object.key() else { continue };
                    let path = match self.relative_path(key) {
                        Ok(path) => path,
                        Err(e) => { yield Err(e); continue; },
                    };
                    let modified = match object.last_modified().map(Self::parse_datetime).transpose() {
                        Ok(modified) => modified.unwrap_or(OffsetDateTime::UNIX_EPOCH),
                        Err(e) => { yield Err(e); continue; },
                    };
                    let size = object.size().and_then(|s| u64::try_from(s).ok()).unwrap_or(0);
                    yield Ok(FileInfo::new(path, size, modified));
                }
            }
        })
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        let key = self.full_key(path)?;
        let _permit = self.acquire_permit().await?;
        match self.client.head_object().bucket(&self.bucket).key(&key).send().await {
            Ok(_) => Ok(true),
            Err(e) if e.as_service_error().is_some_and(|se| se.is_not_found()) => Ok(false),
            Err(e) => exn::bail!(ErrorKind::Network(DisplayErrorContext(&e).to_string())),
        }
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let key = self.full_key(path)?;
        let _permit = self.acquire_permit().await?;
        let output = match self.client.get_object().bucket(&self.bucket).key(&key).send().await {
            Ok(output) => output,
            Err(e) if e.as_service_error().is_some_and(|se| se.is_no_such_key()) => {
                exn::bail!(ErrorKind::NotFound(path.to_path_buf()))
            },
            Err(e) => exn::bail!(ErrorKind::Network(DisplayErrorContext(&e).to_string())),
        };
        let body = output.body.collect().await.or_raise(|| ErrorKind::Network(format!("reading body of `{key}`")))?;
        Ok(body.into_bytes().to_vec())
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        let key = self.full_key(path)?;
        let _permit = self.acquire_permit().await?;
        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .content_type(Self::content_type(path))
            .body(ByteStream::from(data.to_vec()));
        if self.public_read {
            request = request.acl(ObjectCannedAcl::PublicRead);
        }
        request.send().await.map_err(|e| ErrorKind::Network(DisplayErrorContext(&e).to_string()))?;
        tracing::debug!(target = self.name.as_str(), key = %key, bytes = data.len(), "Uploaded object");
        Ok(())
    }
}
