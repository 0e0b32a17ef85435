use super::parse_unix;
use crate::Context;
use crate::load::error::{ErrorKind, Result};
use crate::load::{Contribution, Draft, Source};
use almanac_cache::get_json;
use almanac_config::{RecordPolicy, StatusLolSource};
use almanac_model::{DigestBuilder, Meta, OrderedEntitySet, Snapshot, StatusUpdate, Tags};
use async_trait::async_trait;
use exn::{OptionExt, ResultExt};
use serde::Deserialize;
use time::OffsetDateTime;
use url::Url;

const API: &str = "https://api.omg.lol";

#[derive(Deserialize)]
struct Envelope {
    response: Statuses,
}

#[derive(Deserialize)]
struct Statuses {
    #[serde(default)]
    statuses: Vec<Status>,
}

#[derive(Debug, Deserialize)]
pub struct Status {
    id: String,
    #[serde(default)]
    created: serde_json::Value,
    content: Option<String>,
    emoji: Option<String>,
}

pub struct Parsed {
    id: String,
    date: OffsetDateTime,
    content: String,
    emoji: Option<String>,
}

/// Status updates posted to status.lol.
pub struct StatusLol {
    config: StatusLolSource,
}
impl StatusLol {
    pub fn new(config: StatusLolSource) -> Self {
        Self { config }
    }

    fn url(&self) -> Result<Url> {
        let url = format!("{API}/address/{}/statuses/", self.config.address);
        Url::parse(&url).or_raise(|| ErrorKind::InvalidRecord(format!("invalid address {}", self.config.address)))
    }
}

#[async_trait]
impl Source for StatusLol {
    type Raw = Status;
    type Parsed = Parsed;
    type Output = StatusUpdate;

    fn name(&self) -> &'static str {
        "status_lol"
    }

    fn policy(&self) -> RecordPolicy {
        self.config.policy
    }

    async fn fetch(&self, ctx: &Context) -> Result<Vec<Status>> {
        let envelope: Envelope = get_json(ctx.fetcher.as_ref(), &self.url()?).await.or_raise(|| ErrorKind::Fetch)?;
        Ok(envelope.response.statuses)
    }

    fn parse(&self, _ctx: &Context, status: Status) -> Result<Draft<Parsed>> {
        let id = status.id.clone();
        parse_inner(status).or_raise(|| ErrorKind::InvalidRecord(format!("status {id}")))
    }

    fn previous(&self, snapshot: &Snapshot, key: &str) -> Option<StatusUpdate> {
        snapshot.status_updates.get(key).cloned()
    }

    async fn resolve(
        &self,
        _ctx: &Context,
        draft: Draft<Parsed>,
        _previous: Option<StatusUpdate>,
    ) -> Result<StatusUpdate> {
        let Draft { key, digest, data } = draft;
        Ok(StatusUpdate {
            meta: Meta {
                key,
                date: data.date,
                content_digest: digest,
                tags: Tags::default(),
                media: vec![],
            },
            url: format!("https://{}.status.lol/{}", self.config.address, data.id),
            permalink: format!("/status/{}", data.id),
            id: data.id,
            content: data.content,
            emoji: data.emoji,
        })
    }

    fn assemble(&self, entities: Vec<StatusUpdate>, previous: &Snapshot) -> Contribution {
        Contribution::StatusUpdates(OrderedEntitySet::from_entities(entities).carry_forward(&previous.status_updates))
    }
}

fn parse_inner(status: Status) -> Result<Draft<Parsed>> {
    let content = status.content.ok_or_raise(|| ErrorKind::MissingField("content"))?;
    let date = parse_unix(&status.created)?;
    let emoji = status.emoji.filter(|emoji| !emoji.is_empty());

    let mut digest = DigestBuilder::new("status-update");
    digest.str(&status.id).i64(date.unix_timestamp()).str(&content).opt_str(emoji.as_deref());

    Ok(Draft {
        key: format!("statuslol-{}", status.id),
        digest: digest.finish(),
        data: Parsed {
            id: status.id,
            date,
            content,
            emoji,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load::load;
    use crate::tests::Harness;
    use almanac_cache::fetch::MockFetcher;
    use almanac_storage::backend::MockBackend;
    use time::macros::datetime;

    #[tokio::test]
    async fn test_load() {
        let body = serde_json::json!({
            "request": {"status_code": 200, "success": true},
            "response": {
                "message": "Statuses",
                "statuses": [
                    {"id": "abc", "created": "1700000000", "content": "Coffee", "emoji": "☕"},
                    {"id": "def", "created": 1700003600, "content": "More coffee", "emoji": ""},
                    {"id": "ghi", "created": "whenever", "content": "Broken"}
                ]
            }
        });
        let fetcher = MockFetcher::with_responses([(
            "https://api.omg.lol/address/me/statuses/",
            body.to_string().into_bytes(),
        )]);
        let h = Harness::new(fetcher, MockBackend::default());
        let source = StatusLol::new(StatusLolSource {
            address: "me".to_string(),
            policy: RecordPolicy::Lenient,
        });
        let loaded = load(&source, &h.context, &Snapshot::default()).await.unwrap();
        assert_eq!(loaded.stats.skipped, 1);
        let Contribution::StatusUpdates(updates) = loaded.contribution else {
            panic!("status updates expected");
        };
        assert_eq!(updates.keys(), ["statuslol-def", "statuslol-abc"]);
        let coffee = updates.get("statuslol-abc").unwrap();
        assert_eq!(coffee.meta.date, datetime!(2023-11-14 22:13:20 UTC));
        assert_eq!(coffee.url, "https://me.status.lol/abc");
        assert_eq!(coffee.emoji.as_deref(), Some("☕"));
        assert_eq!(updates.get("statuslol-def").unwrap().emoji, None);
    }
}
