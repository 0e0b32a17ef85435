use super::parse_date;
use crate::Context;
use crate::load::error::{ErrorKind, Result};
use crate::load::{Contribution, Draft, Source};
use almanac_cache::get_json;
use almanac_config::{MastodonSource, RecordPolicy};
use almanac_model::{DigestBuilder, ImageRef, MastodonPost, Meta, OrderedEntitySet, Snapshot, Tags};
use async_trait::async_trait;
use exn::{OptionExt, ResultExt};
use serde::Deserialize;
use time::OffsetDateTime;
use url::Url;

#[derive(Debug, Deserialize)]
pub struct Status {
    id: String,
    url: Option<String>,
    created_at: Option<String>,
    #[serde(default)]
    content: String,
    in_reply_to_id: Option<String>,
    reblog: Option<serde_json::Value>,
    application: Option<Application>,
    #[serde(default)]
    tags: Vec<Tag>,
    #[serde(default)]
    media_attachments: Vec<Attachment>,
}

#[derive(Debug, Deserialize)]
struct Application {
    name: String,
}

#[derive(Debug, Deserialize)]
struct Tag {
    name: String,
}

#[derive(Debug, Deserialize)]
struct Attachment {
    #[serde(rename = "type")]
    kind: String,
    url: Option<String>,
    description: Option<String>,
}

pub struct Parsed {
    id: String,
    url: String,
    date: OffsetDateTime,
    content: String,
    tags: Tags,
    images: Vec<ImageRef>,
}

/// Posts from a Mastodon account. Replies, boosts and posts cross-posted by
/// one of the excluded applications are left out.
pub struct Mastodon {
    config: MastodonSource,
}
impl Mastodon {
    pub fn new(config: MastodonSource) -> Self {
        Self { config }
    }

    fn url(&self) -> Result<Url> {
        let url = format!(
            "{}/api/v1/accounts/{}/statuses",
            self.config.instance.trim_end_matches('/'),
            self.config.account_id
        );
        Url::parse(&url).or_raise(|| ErrorKind::InvalidRecord(format!("invalid instance {}", self.config.instance)))
    }

    fn wanted(&self, status: &Status) -> bool {
        let excluded = status
            .application
            .as_ref()
            .is_some_and(|application| self.config.exclude_applications.contains(&application.name));
        status.in_reply_to_id.is_none() && status.reblog.is_none() && !excluded
    }
}

#[async_trait]
impl Source for Mastodon {
    type Raw = Status;
    type Parsed = Parsed;
    type Output = MastodonPost;

    fn name(&self) -> &'static str {
        "mastodon"
    }

    fn policy(&self) -> RecordPolicy {
        self.config.policy
    }

    async fn fetch(&self, ctx: &Context) -> Result<Vec<Status>> {
        let statuses: Vec<Status> = get_json(ctx.fetcher.as_ref(), &self.url()?).await.or_raise(|| ErrorKind::Fetch)?;
        let total = statuses.len();
        let statuses: Vec<Status> = statuses.into_iter().filter(|status| self.wanted(status)).collect();
        tracing::debug!(total, kept = statuses.len(), "Fetched statuses");
        Ok(statuses)
    }

    fn parse(&self, ctx: &Context, status: Status) -> Result<Draft<Parsed>> {
        let id = status.id.clone();
        parse_inner(ctx, status).or_raise(|| ErrorKind::InvalidRecord(format!("status {id}")))
    }

    fn previous(&self, snapshot: &Snapshot, key: &str) -> Option<MastodonPost> {
        snapshot.mastodon_posts.get(key).cloned()
    }

    async fn resolve(
        &self,
        ctx: &Context,
        draft: Draft<Parsed>,
        _previous: Option<MastodonPost>,
    ) -> Result<MastodonPost> {
        let Draft { key, digest, data } = draft;
        let media = ctx.media.resolve_all(data.images, data.date).await.or_raise(|| ErrorKind::Media)?;
        Ok(MastodonPost {
            meta: Meta {
                key,
                date: data.date,
                content_digest: digest,
                tags: data.tags,
                media,
            },
            id: data.id,
            url: data.url,
            content: data.content,
        })
    }

    fn assemble(&self, entities: Vec<MastodonPost>, previous: &Snapshot) -> Contribution {
        Contribution::MastodonPosts(OrderedEntitySet::from_entities(entities).carry_forward(&previous.mastodon_posts))
    }
}

fn parse_inner(ctx: &Context, status: Status) -> Result<Draft<Parsed>> {
    let url = status.url.ok_or_raise(|| ErrorKind::MissingField("url"))?;
    let raw_date = status.created_at.ok_or_raise(|| ErrorKind::MissingField("created_at"))?;
    let date = parse_date(&raw_date)?;
    let tags = ctx.tags.apply(status.tags.iter().map(|tag| tag.name.as_str()));
    let images: Vec<ImageRef> = status
        .media_attachments
        .into_iter()
        .filter(|attachment| attachment.kind == "image")
        .filter_map(|attachment| Some(ImageRef::new(attachment.url?, attachment.description)))
        .collect();

    let mut digest = DigestBuilder::new("mastodon-post");
    digest.str(&status.id).str(&url).str(&raw_date).str(&status.content).strs(tags.iter());
    for image in &images {
        digest.nested(image);
    }

    Ok(Draft {
        key: format!("mastodon-{}", status.id),
        digest: digest.finish(),
        data: Parsed {
            id: status.id,
            url,
            date,
            content: status.content,
            tags,
            images,
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

    const FEED: &str = "https://social.example.com/api/v1/accounts/42/statuses";

    fn source() -> Mastodon {
        Mastodon::new(MastodonSource {
            instance: "https://social.example.com/".to_string(),
            account_id: "42".to_string(),
            exclude_applications: vec!["status.lol".to_string()],
            policy: RecordPolicy::Lenient,
        })
    }

    fn statuses() -> serde_json::Value {
        serde_json::json!([
            {
                "id": "1",
                "url": "https://social.example.com/@me/1",
                "created_at": "2024-03-01T12:00:00.000Z",
                "content": "<p>Hello</p>",
                "in_reply_to_id": null,
                "reblog": null,
                "application": {"name": "Web"},
                "tags": [{"name": "Rust"}],
                "media_attachments": [
                    {"type": "video", "url": "https://files.example.com/clip.mp4"}
                ]
            },
            {
                "id": "2",
                "url": "https://social.example.com/@me/2",
                "created_at": "2024-03-02T12:00:00.000Z",
                "content": "<p>A reply</p>",
                "in_reply_to_id": "1"
            },
            {
                "id": "3",
                "url": "https://social.example.com/@me/3",
                "created_at": "2024-03-03T12:00:00.000Z",
                "content": "<p>Cross-posted</p>",
                "application": {"name": "status.lol"}
            },
            {
                "id": "4",
                "created_at": "2024-03-04T12:00:00.000Z",
                "content": "<p>No URL</p>"
            }
        ])
    }

    #[tokio::test]
    async fn test_load() {
        let fetcher = MockFetcher::with_responses([(FEED, statuses().to_string().into_bytes())]);
        let h = Harness::new(fetcher, MockBackend::default());
        let loaded = load(&source(), &h.context, &Snapshot::default()).await.unwrap();
        assert_eq!(loaded.stats.skipped, 1, "the status without a URL");
        let Contribution::MastodonPosts(posts) = loaded.contribution else {
            panic!("mastodon posts expected");
        };
        assert_eq!(posts.keys(), ["mastodon-1"]);
        let post = posts.get("mastodon-1").unwrap();
        assert_eq!(post.content, "<p>Hello</p>");
        assert!(post.meta.tags.contains("rust"));
        assert!(post.meta.media.is_empty(), "only image attachments are media");
    }

    #[tokio::test]
    async fn test_feed_failure_fails_the_source() {
        let h = Harness::default();
        let err = load(&source(), &h.context, &Snapshot::default()).await.unwrap_err();
        assert!(err.is_retryable());
    }
}
