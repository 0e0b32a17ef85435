use super::Fetcher;
use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;
use url::Url;

/// In-memory [`Fetcher`] for testing.
///
/// Responds with canned bodies keyed by full URL (query string included).
/// Any other URL fails like an unreachable host would. Every request is
/// counted, including the failed ones.
///
/// # Example
///
/// ```
/// # use almanac_cache::fetch::{Fetcher, MockFetcher};
/// # use url::Url;
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let fetcher = MockFetcher::with_responses([("https://example.com/a.jpg", b"jpeg".to_vec())]);
/// let body = fetcher.get(&Url::parse("https://example.com/a.jpg")?).await?;
/// assert_eq!(body, b"jpeg");
/// assert_eq!(fetcher.call_count(), 1);
/// # Ok(())
/// # }
/// ```
pub struct MockFetcher {
    responses: HashMap<String, Vec<u8>>,
    calls: AtomicUsize,
    requested: Mutex<Vec<String>>,
}

impl MockFetcher {
    pub fn with_responses(responses: impl IntoIterator<Item = (impl Into<String>, impl Into<Vec<u8>>)>) -> Self {
        Self {
            responses: responses.into_iter().map(|(url, body)| (url.into(), body.into())).collect(),
            calls: AtomicUsize::new(0),
            requested: Mutex::new(Vec::new()),
        }
    }

    /// Add (or replace) a canned response.
    pub fn with_response(mut self, url: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        self.responses.insert(url.into(), body.into());
        self
    }

    /// Number of requests made since construction.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// URLs requested so far, in order.
    pub async fn requested(&self) -> Vec<String> {
        self.requested.lock().await.clone()
    }
}
impl Default for MockFetcher {
    fn default() -> Self {
        let responses: [(&str, Vec<u8>); 0] = [];
        Self::with_responses(responses)
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    fn name(&self) -> &str {
        "mock"
    }

    async fn get(&self, url: &Url) -> Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requested.lock().await.push(url.to_string());
        self.responses
            .get(url.as_str())
            .cloned()
            .ok_or_else(|| exn::Exn::from(ErrorKind::UnableToDownloadFile(url.to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unknown_url_fails_and_counts() {
        let fetcher = MockFetcher::default().with_response("https://example.com/ok", "ok");
        let missing = Url::parse("https://example.com/missing").unwrap();
        let err = fetcher.get(&missing).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::UnableToDownloadFile(_)));
        assert_eq!(fetcher.call_count(), 1);
        assert_eq!(fetcher.requested().await, vec!["https://example.com/missing".to_string()]);
    }
}
