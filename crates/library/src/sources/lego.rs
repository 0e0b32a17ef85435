use crate::Context;
use crate::load::error::{ErrorKind, Result};
use crate::load::{Contribution, LoadStats, Loaded, Loader, skip_or_fail};
use almanac_cache::get_json;
use almanac_config::LegoSource;
use almanac_model::{LegoCollection, LegoSet, Snapshot};
use async_trait::async_trait;
use exn::{OptionExt, ResultExt};
use serde::Deserialize;
use url::Url;

const LOGIN_URL: &str = "https://brickset.com/api/v3.asmx/login";
const GET_SETS_URL: &str = "https://brickset.com/api/v3.asmx/getSets";

#[derive(Deserialize)]
struct Login {
    hash: Option<String>,
}

#[derive(Deserialize)]
struct Sets {
    #[serde(default)]
    sets: Vec<serde_json::Value>,
}

#[derive(Deserialize)]
struct RawSet {
    #[serde(rename = "setID")]
    set_id: u64,
    name: String,
    number: String,
    pieces: Option<u32>,
    #[serde(default)]
    image: RawImage,
    #[serde(rename = "bricksetURL")]
    brickset_url: Option<String>,
    #[serde(default)]
    collection: RawCollection,
}

#[derive(Default, Deserialize)]
struct RawImage {
    #[serde(rename = "imageURL")]
    image_url: Option<String>,
    #[serde(rename = "thumbnailURL")]
    thumbnail_url: Option<String>,
}

#[derive(Default, Deserialize)]
struct RawCollection {
    #[serde(rename = "qtyOwned", default)]
    qty_owned: u32,
}
impl From<RawSet> for LegoSet {
    fn from(raw: RawSet) -> Self {
        Self {
            id: raw.set_id,
            name: raw.name,
            number: raw.number,
            // Brickset leaves the piece count out for some sets.
            pieces: raw.pieces.unwrap_or(1),
            quantity: raw.collection.qty_owned,
            image: raw.image.image_url,
            thumbnail: raw.image.thumbnail_url,
            url: raw.brickset_url,
        }
    }
}

/// Owned LEGO sets, from the Brickset v3 API.
pub struct Lego {
    config: LegoSource,
}
impl Lego {
    pub fn new(config: LegoSource) -> Self {
        Self { config }
    }

    fn login_url(&self) -> Result<Url> {
        Url::parse_with_params(
            LOGIN_URL,
            [
                ("apiKey", self.config.api_key.as_str()),
                ("username", self.config.username.as_str()),
                ("password", self.config.password.as_str()),
            ],
        )
        .or_raise(|| ErrorKind::Fetch)
    }

    fn sets_url(&self, hash: &str) -> Result<Url> {
        Url::parse_with_params(
            GET_SETS_URL,
            [("apiKey", self.config.api_key.as_str()), ("userHash", hash), ("params", r#"{"owned":1}"#)],
        )
        .or_raise(|| ErrorKind::Fetch)
    }
}

#[async_trait]
impl Loader for Lego {
    fn name(&self) -> &'static str {
        "lego"
    }

    #[tracing::instrument(skip_all, fields(source = "lego"))]
    async fn load(&self, ctx: &Context, _previous: &Snapshot) -> Result<Loaded> {
        let login: Login = get_json(ctx.fetcher.as_ref(), &self.login_url()?).await.or_raise(|| ErrorKind::Fetch)?;
        let hash = login.hash.filter(|hash| !hash.is_empty()).ok_or_raise(|| ErrorKind::Fetch)?;
        let raw: Sets = get_json(ctx.fetcher.as_ref(), &self.sets_url(&hash)?).await.or_raise(|| ErrorKind::Fetch)?;

        let mut stats = LoadStats::default();
        let mut sets = Vec::with_capacity(raw.sets.len());
        for value in raw.sets {
            let set = serde_json::from_value::<RawSet>(value)
                .or_raise(|| ErrorKind::InvalidRecord("unrecognised lego set".to_string()));
            match set {
                Ok(set) => sets.push(LegoSet::from(set)),
                Err(err) => skip_or_fail(self.name(), self.config.policy, err, &mut stats)?,
            }
        }
        stats.recomputed = sets.len();

        let lego = LegoCollection::new(sets);
        tracing::info!(sets = lego.sets.len(), total_pieces = lego.total_pieces, %stats, "Loaded source");
        Ok(Loaded {
            contribution: Contribution::Lego(lego),
            stats,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::Harness;
    use almanac_cache::fetch::MockFetcher;
    use almanac_config::RecordPolicy;
    use almanac_storage::backend::MockBackend;

    fn source(policy: RecordPolicy) -> Lego {
        Lego::new(LegoSource {
            api_key: "key".to_string(),
            username: "me".to_string(),
            password: "p@ss word".to_string(),
            policy,
        })
    }

    fn fetcher(source: &Lego) -> MockFetcher {
        let sets = serde_json::json!({
            "status": "success",
            "matches": 3,
            "sets": [
                {
                    "setID": 1,
                    "name": "Small",
                    "number": "100",
                    "pieces": 50,
                    "image": {"imageURL": "https://images.brickset.com/100.jpg"},
                    "bricksetURL": "https://brickset.com/sets/100-1",
                    "collection": {"qtyOwned": 2}
                },
                {
                    "setID": 2,
                    "name": "Big",
                    "number": "200",
                    "pieces": 900,
                    "collection": {"qtyOwned": 1}
                },
                {"setID": "three"}
            ]
        });
        MockFetcher::with_responses([
            (source.login_url().unwrap().to_string(), br#"{"status":"success","hash":"abc"}"#.to_vec()),
            (source.sets_url("abc").unwrap().to_string(), sets.to_string().into_bytes()),
        ])
    }

    #[test]
    fn test_urls_are_encoded() {
        let source = source(RecordPolicy::Lenient);
        assert_eq!(
            source.login_url().unwrap().as_str(),
            "https://brickset.com/api/v3.asmx/login?apiKey=key&username=me&password=p%40ss+word"
        );
        assert!(source.sets_url("abc").unwrap().as_str().ends_with("userHash=abc&params=%7B%22owned%22%3A1%7D"));
    }

    #[tokio::test]
    async fn test_load() {
        let source = source(RecordPolicy::Lenient);
        let h = Harness::new(fetcher(&source), MockBackend::default());
        let loaded = source.load(&h.context, &Snapshot::default()).await.unwrap();
        assert_eq!(loaded.stats, LoadStats { reused: 0, recomputed: 2, skipped: 1 });
        let Contribution::Lego(lego) = loaded.contribution else {
            panic!("lego expected");
        };
        assert_eq!(lego.sets.iter().map(|set| set.name.as_str()).collect::<Vec<_>>(), ["Big", "Small"]);
        assert_eq!(lego.total_pieces, 1000);
        assert_eq!(lego.sets[1].url.as_deref(), Some("https://brickset.com/sets/100-1"));
    }

    #[tokio::test]
    async fn test_strict_policy_rejects_malformed_sets() {
        let source = source(RecordPolicy::Strict);
        let h = Harness::new(fetcher(&source), MockBackend::default());
        assert!(source.load(&h.context, &Snapshot::default()).await.is_err());
    }

    #[tokio::test]
    async fn test_failed_login() {
        let source = source(RecordPolicy::Lenient);
        let login = source.login_url().unwrap().to_string();
        let fetcher = MockFetcher::with_responses([(login, br#"{"status":"error"}"#.to_vec())]);
        let h = Harness::new(fetcher, MockBackend::default());
        let err = source.load(&h.context, &Snapshot::default()).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Fetch));
        assert_eq!(h.fetcher.call_count(), 1);
    }
}
