use crate::Context;
use crate::load::error::{ErrorKind, Result};
use crate::load::{Contribution, LoadStats, Loaded, Loader};
use almanac_cache::get_json;
use almanac_config::PagesSource;
use almanac_model::Snapshot;
use async_trait::async_trait;
use exn::{OptionExt, ResultExt};
use futures::future::try_join_all;
use serde::Deserialize;
use std::collections::BTreeMap;
use url::Url;

const API: &str = "https://api.omg.lol";

#[derive(Deserialize)]
struct Envelope {
    response: Response,
}

#[derive(Deserialize)]
struct Response {
    paste: Paste,
}

#[derive(Deserialize)]
struct Paste {
    content: String,
}

/// Free-text pages (`about`, `now`, ...) kept as omg.lol pastes.
///
/// All pages are fetched or none are: one failed paste fails the source,
/// leaving every page at its previous text.
pub struct Pages {
    config: PagesSource,
}
impl Pages {
    pub fn new(config: PagesSource) -> Self {
        Self { config }
    }

    fn url(&self, paste: &str) -> Result<Url> {
        let mut url = Url::parse(API).or_raise(|| ErrorKind::Fetch)?;
        url.path_segments_mut()
            .ok()
            .ok_or_raise(|| ErrorKind::Fetch)?
            .pop_if_empty()
            .extend(["address", self.config.address.as_str(), "pastebin", paste]);
        Ok(url)
    }
}

#[async_trait]
impl Loader for Pages {
    fn name(&self) -> &'static str {
        "pages"
    }

    #[tracing::instrument(skip_all, fields(source = "pages"))]
    async fn load(&self, ctx: &Context, _previous: &Snapshot) -> Result<Loaded> {
        let pages = try_join_all(self.config.pastes.iter().map(|(name, paste)| async move {
            let envelope: Envelope =
                get_json(ctx.fetcher.as_ref(), &self.url(paste)?).await.or_raise(|| ErrorKind::Fetch)?;
            tracing::debug!(page = %name, paste = %paste, "Fetched page");
            Ok::<_, crate::load::error::Error>((name.clone(), envelope.response.paste.content))
        }))
        .await?;
        let pages: BTreeMap<String, String> = pages.into_iter().collect();

        let stats = LoadStats {
            recomputed: pages.len(),
            ..LoadStats::default()
        };
        tracing::info!(pages = pages.len(), %stats, "Loaded source");
        Ok(Loaded {
            contribution: Contribution::Pages(pages),
            stats,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::Harness;
    use almanac_cache::fetch::MockFetcher;
    use almanac_storage::backend::MockBackend;

    fn source() -> Pages {
        Pages::new(PagesSource {
            address: "me".to_string(),
            pastes: BTreeMap::from([
                ("about".to_string(), "web-about.txt".to_string()),
                ("now".to_string(), "web-now.txt".to_string()),
            ]),
        })
    }

    fn paste(content: &str) -> Vec<u8> {
        serde_json::json!({"response": {"paste": {"title": "paste", "content": content}}}).to_string().into_bytes()
    }

    #[test]
    fn test_url() {
        let url = source().url("web-now.txt").unwrap();
        assert_eq!(url.as_str(), "https://api.omg.lol/address/me/pastebin/web-now.txt");
    }

    #[tokio::test]
    async fn test_load() {
        let fetcher = MockFetcher::with_responses([
            ("https://api.omg.lol/address/me/pastebin/web-about.txt", paste("Hi, I write Rust.")),
            ("https://api.omg.lol/address/me/pastebin/web-now.txt", paste("Moving house.")),
        ]);
        let h = Harness::new(fetcher, MockBackend::default());
        let loaded = source().load(&h.context, &Snapshot::default()).await.unwrap();
        let Contribution::Pages(pages) = loaded.contribution else {
            panic!("pages expected");
        };
        assert_eq!(pages.get("about").map(String::as_str), Some("Hi, I write Rust."));
        assert_eq!(pages.get("now").map(String::as_str), Some("Moving house."));
    }

    #[tokio::test]
    async fn test_one_missing_paste_fails_the_source() {
        let fetcher = MockFetcher::with_responses([(
            "https://api.omg.lol/address/me/pastebin/web-about.txt",
            paste("Hi, I write Rust."),
        )]);
        let h = Harness::new(fetcher, MockBackend::default());
        let err = source().load(&h.context, &Snapshot::default()).await.unwrap_err();
        assert!(err.is_retryable());
    }
}
