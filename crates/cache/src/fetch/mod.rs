//! The one seam through which almanac talks to the network.
//!
//! Source adapters fetch their feeds through a [`Fetcher`] and so does the
//! [`DownloadCache`](crate::DownloadCache), which means tests can swap the
//! whole network for a [`MockFetcher`] and count every request made.

mod http;
#[cfg(any(test, feature = "mock"))]
mod mock;

pub use self::http::HttpFetcher;
#[cfg(any(test, feature = "mock"))]
pub use self::mock::MockFetcher;
use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use exn::ResultExt;
use serde::de::DeserializeOwned;
use url::Url;

#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Name of the fetcher. Used for logging only.
    fn name(&self) -> &str;

    /// GET the resource and return its body.
    ///
    /// Non-success statuses are errors
    /// ([`UnableToDownloadFile`](ErrorKind::UnableToDownloadFile)).
    async fn get(&self, url: &Url) -> Result<Vec<u8>>;
}

/// GET a JSON document and deserialize it.
pub async fn get_json<T: DeserializeOwned>(fetcher: &(dyn Fetcher + Send + Sync), url: &Url) -> Result<T> {
    let body = fetcher.get(url).await?;
    serde_json::from_slice(&body).or_raise(|| ErrorKind::UnexpectedResponse(redact(url)))
}

/// A URL that is safe to log: query strings carry API keys and passwords.
pub(crate) fn redact(url: &Url) -> String {
    let mut redacted = url.clone();
    redacted.set_query(None);
    redacted.set_fragment(None);
    let _ = redacted.set_password(None);
    redacted.to_string()
}
