use super::{Fetcher, redact};
use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use exn::ResultExt;
use std::time::Duration;
use url::Url;

/// [`Fetcher`] backed by a shared [`reqwest::Client`].
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}
impl HttpFetcher {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .or_raise(|| ErrorKind::Client)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    fn name(&self) -> &str {
        "http"
    }

    async fn get(&self, url: &Url) -> Result<Vec<u8>> {
        let failed = || ErrorKind::UnableToDownloadFile(redact(url));
        let response = self.client.get(url.clone()).send().await.or_raise(failed)?;
        let status = response.status();
        let response = response.error_for_status().or_raise(failed)?;
        let body = response.bytes().await.or_raise(failed)?;
        tracing::debug!(url = %redact(url), status = status.as_u16(), bytes = body.len(), "Fetched");
        Ok(body.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builds_client() {
        let fetcher = HttpFetcher::new("almanac/test", Duration::from_secs(5)).unwrap();
        assert_eq!(fetcher.name(), "http");
    }
}
