use super::parse_date;
use super::patterns::{HTML_ATTRIBUTE_REGEX, HTML_IMAGE_REGEX};
use crate::Context;
use crate::load::error::{ErrorKind, Result};
use crate::load::{Contribution, Draft, Source};
use almanac_config::{ArchiveSource, RecordPolicy};
use almanac_model::{ArchivePost, DigestBuilder, ImageRef, Meta, OrderedEntitySet, Snapshot, TagFilter, Tags};
use async_trait::async_trait;
use exn::{OptionExt, ResultExt};
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use time::OffsetDateTime;
use url::Url;

/// A JSON Feed (https://jsonfeed.org), as exported by the retired blog.
#[derive(Deserialize)]
struct Feed {
    #[serde(default)]
    items: Vec<Item>,
}

#[derive(Debug, Deserialize)]
pub struct Item {
    id: Option<String>,
    url: Option<String>,
    title: Option<String>,
    content_html: Option<String>,
    content_text: Option<String>,
    date_published: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
}

pub struct Parsed {
    id: String,
    url: String,
    permalink: String,
    title: Option<String>,
    content: String,
    date: OffsetDateTime,
    tags: Tags,
    images: Vec<ImageRef>,
}

/// Posts from the legacy blog archive. The archive never changes, but it
/// still goes through the same reuse machinery as everything else.
pub struct Archive {
    config: ArchiveSource,
    skip: BTreeSet<String>,
}
impl Archive {
    pub fn new(config: ArchiveSource) -> Self {
        let skip = config.skip_tags.iter().filter_map(|tag| TagFilter::normalize(tag)).collect();
        Self { config, skip }
    }

    fn skipped(&self, item: &Item) -> bool {
        item.tags.iter().filter_map(|tag| TagFilter::normalize(tag)).any(|tag| self.skip.contains(&tag))
    }
}

#[async_trait]
impl Source for Archive {
    type Raw = Item;
    type Parsed = Parsed;
    type Output = ArchivePost;

    fn name(&self) -> &'static str {
        "micro_blog_archive"
    }

    fn policy(&self) -> RecordPolicy {
        self.config.policy
    }

    async fn fetch(&self, ctx: &Context) -> Result<Vec<Item>> {
        let bytes = ctx.content.read(&self.config.file).await.or_raise(|| ErrorKind::Storage)?;
        let feed: Feed = serde_json::from_slice(&bytes).or_raise(|| ErrorKind::Fetch)?;
        let total = feed.items.len();
        let items: Vec<Item> = feed.items.into_iter().filter(|item| !self.skipped(item)).collect();
        tracing::debug!(file = %self.config.file.display(), total, kept = items.len(), "Read archive");
        Ok(items)
    }

    fn parse(&self, ctx: &Context, item: Item) -> Result<Draft<Parsed>> {
        let id = item.id.clone().unwrap_or_default();
        parse_inner(ctx, item).or_raise(|| ErrorKind::InvalidRecord(format!("archive item {id}")))
    }

    fn previous(&self, snapshot: &Snapshot, key: &str) -> Option<ArchivePost> {
        snapshot.archive_posts.get(key).cloned()
    }

    async fn resolve(
        &self,
        ctx: &Context,
        draft: Draft<Parsed>,
        _previous: Option<ArchivePost>,
    ) -> Result<ArchivePost> {
        let Draft { key, digest, data } = draft;
        let media = ctx.media.resolve_all(data.images, data.date).await.or_raise(|| ErrorKind::Media)?;
        Ok(ArchivePost {
            meta: Meta {
                key,
                date: data.date,
                content_digest: digest,
                tags: data.tags,
                media,
            },
            id: data.id,
            url: data.url,
            title: data.title,
            content: data.content,
            permalink: data.permalink,
        })
    }

    fn assemble(&self, entities: Vec<ArchivePost>, previous: &Snapshot) -> Contribution {
        Contribution::ArchivePosts(OrderedEntitySet::from_entities(entities).carry_forward(&previous.archive_posts))
    }
}

fn parse_inner(ctx: &Context, item: Item) -> Result<Draft<Parsed>> {
    let id = item.id.filter(|id| !id.is_empty()).ok_or_raise(|| ErrorKind::MissingField("id"))?;
    let raw_date = item.date_published.ok_or_raise(|| ErrorKind::MissingField("date_published"))?;
    let date = parse_date(&raw_date)?;
    let content = item.content_html.or(item.content_text).ok_or_raise(|| ErrorKind::MissingField("content"))?;
    // The id of an exported item is usually its URL.
    let url = item.url.unwrap_or_else(|| id.clone());
    let permalink = match Url::parse(&url) {
        Ok(parsed) => format!("/micros{}", parsed.path().trim_end_matches(".html").trim_end_matches('/')),
        Err(_) => exn::bail!(ErrorKind::InvalidRecord(format!("invalid url {url}"))),
    };
    let title = item.title.filter(|title| !title.trim().is_empty());
    let tags = ctx.tags.apply(&item.tags);
    let images = images(&content);

    let mut digest = DigestBuilder::new("archive-post");
    digest.str(&id).str(&url).opt_str(title.as_deref()).str(&raw_date).str(&content).strs(tags.iter());

    Ok(Draft {
        key: format!("micro-blog-{id}"),
        digest: digest.finish(),
        data: Parsed {
            id,
            url,
            permalink,
            title,
            content,
            date,
            tags,
            images,
        },
    })
}

/// Every `<img>` with a `src`, in document order.
fn images(html: &str) -> Vec<ImageRef> {
    HTML_IMAGE_REGEX
        .find_iter(html)
        .filter_map(|tag| {
            let attributes: HashMap<String, &str> = HTML_ATTRIBUTE_REGEX
                .captures_iter(tag.as_str())
                .filter_map(|captures| {
                    Some((captures.get(1)?.as_str().to_ascii_lowercase(), captures.get(2)?.as_str()))
                })
                .collect();
            let src = attributes.get("src").filter(|src| !src.is_empty())?;
            let alt = attributes.get("alt").filter(|alt| !alt.is_empty()).map(|alt| alt.to_string());
            let mut image = ImageRef::new(*src, alt);
            image.width = attributes.get("width").and_then(|width| width.parse().ok());
            image.height = attributes.get("height").and_then(|height| height.parse().ok());
            Some(image)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load::load;
    use crate::tests::{Harness, png};
    use almanac_cache::fetch::MockFetcher;
    use almanac_storage::backend::MockBackend;
    use std::path::PathBuf;

    #[test]
    fn test_images() {
        let html = r#"<p>Look</p><img src="https://cdn.example.com/a.jpg" width="600" height="400" alt="A view">
            <IMG alt="" SRC="b.png"><img alt="no source">"#;
        let images = images(html);
        assert_eq!(images.len(), 2);
        assert_eq!(images[0].src, "https://cdn.example.com/a.jpg");
        assert_eq!(images[0].alt.as_deref(), Some("A view"));
        assert_eq!((images[0].width, images[0].height), (Some(600), Some(400)));
        assert_eq!(images[1].src, "b.png");
        assert_eq!(images[1].alt, None);
    }

    #[tokio::test]
    async fn test_load_skips_tagged_items() {
        let feed = serde_json::json!({
            "version": "https://jsonfeed.org/version/1",
            "items": [
                {
                    "id": "https://old.example.com/2019/05/01/hello.html",
                    "content_html": "<p>Hello <img src=\"https://cdn.example.com/hello.png\" alt=\"Hi\"></p>",
                    "date_published": "2019-05-01T10:00:00+00:00",
                    "tags": ["Life"]
                },
                {
                    "id": "https://old.example.com/2019/05/02/status.html",
                    "content_text": "Busy",
                    "date_published": "2019-05-02T10:00:00+00:00",
                    "tags": ["Status"]
                }
            ]
        });
        let content = MockBackend::with_files([("archive.json", feed.to_string().into_bytes())]);
        let fetcher = MockFetcher::with_responses([("https://cdn.example.com/hello.png", png(20, 10))]);
        let h = Harness::new(fetcher, content);
        let source = Archive::new(ArchiveSource {
            file: PathBuf::from("archive.json"),
            skip_tags: vec!["status".to_string()],
            policy: RecordPolicy::Lenient,
        });
        let loaded = load(&source, &h.context, &Snapshot::default()).await.unwrap();
        let Contribution::ArchivePosts(posts) = loaded.contribution else {
            panic!("archive posts expected");
        };
        assert_eq!(posts.len(), 1);
        let post = posts.iter().next().unwrap();
        assert_eq!(post.meta.key, "micro-blog-https://old.example.com/2019/05/01/hello.html");
        assert_eq!(post.permalink, "/micros/2019/05/01/hello");
        assert_eq!(post.meta.media.len(), 1);
        assert!(post.meta.tags.contains("life"));
    }

    #[tokio::test]
    async fn test_missing_archive_fails_the_source() {
        let h = Harness::default();
        let source = Archive::new(ArchiveSource {
            file: PathBuf::from("archive.json"),
            skip_tags: vec![],
            policy: RecordPolicy::Lenient,
        });
        assert!(load(&source, &h.context, &Snapshot::default()).await.is_err());
    }
}
