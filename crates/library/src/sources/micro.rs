use super::{LocalFile, markdown, parse_date, read_files};
use crate::Context;
use crate::load::error::{ErrorKind, Result};
use crate::load::{Contribution, Draft, Source};
use almanac_config::{LocalSource, RecordPolicy};
use almanac_model::{DigestBuilder, ImageRef, Meta, MicroPost, OrderedEntitySet, Snapshot, Tags};
use async_trait::async_trait;
use exn::{OptionExt, ResultExt};
use serde::Deserialize;
use time::OffsetDateTime;

#[derive(Deserialize)]
struct FrontMatter {
    date: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
}

pub struct Parsed {
    stem: String,
    date: OffsetDateTime,
    body: String,
    tags: Tags,
    images: Vec<ImageRef>,
}

/// Short-form posts. Only the date is required; the file name becomes part
/// of the key and the permalink.
pub struct MicroPosts {
    config: LocalSource,
}
impl MicroPosts {
    pub fn new(config: LocalSource) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Source for MicroPosts {
    type Raw = LocalFile;
    type Parsed = Parsed;
    type Output = MicroPost;

    fn name(&self) -> &'static str {
        "micro_posts"
    }

    fn policy(&self) -> RecordPolicy {
        self.config.policy
    }

    async fn fetch(&self, ctx: &Context) -> Result<Vec<LocalFile>> {
        read_files(ctx, &self.config.dir, &["md", "markdown"]).await
    }

    fn parse(&self, ctx: &Context, file: LocalFile) -> Result<Draft<Parsed>> {
        parse_inner(ctx, &file).or_raise(|| ErrorKind::InvalidRecord(file.path.display().to_string()))
    }

    fn previous(&self, snapshot: &Snapshot, key: &str) -> Option<MicroPost> {
        snapshot.micro_posts.get(key).cloned()
    }

    async fn resolve(&self, ctx: &Context, draft: Draft<Parsed>, _previous: Option<MicroPost>) -> Result<MicroPost> {
        let Draft { key, digest, data } = draft;
        let media = ctx.media.resolve_all(data.images, data.date).await.or_raise(|| ErrorKind::Media)?;
        let date = data.date;
        Ok(MicroPost {
            meta: Meta {
                key,
                date,
                content_digest: digest,
                tags: data.tags,
                media,
            },
            description: markdown::description(&data.body),
            permalink: format!(
                "/micros/{:04}/{:02}/{:02}/{}",
                date.year(),
                u8::from(date.month()),
                date.day(),
                data.stem
            ),
            body: data.body,
        })
    }

    fn assemble(&self, entities: Vec<MicroPost>, previous: &Snapshot) -> Contribution {
        Contribution::MicroPosts(OrderedEntitySet::from_entities(entities).carry_forward(&previous.micro_posts))
    }
}

fn parse_inner(ctx: &Context, file: &LocalFile) -> Result<Draft<Parsed>> {
    let (front_matter, body): (FrontMatter, _) = markdown::parse(file)?;
    let stem = file.stem()?.to_string();
    let raw_date = front_matter.date.ok_or_raise(|| ErrorKind::MissingField("date"))?;
    let date = parse_date(&raw_date)?;
    let images: Vec<ImageRef> = markdown::images(body)
        .into_iter()
        .map(|(alt, src)| ImageRef::new(src, (!alt.is_empty()).then(|| alt.to_string())))
        .collect();
    let tags = ctx.tags.apply(&front_matter.tags);

    let key = format!("{stem}-{}", raw_date.trim());
    let mut digest = DigestBuilder::new("micro-post");
    digest.str(&key).str(&raw_date).str(body).strs(tags.iter());
    for image in &images {
        digest.nested(image);
    }

    Ok(Draft {
        key,
        digest: digest.finish(),
        data: Parsed {
            stem,
            date,
            body: body.to_string(),
            tags,
            images,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load::load;
    use crate::tests::{CDN, Harness, png};
    use almanac_cache::fetch::MockFetcher;
    use almanac_storage::backend::MockBackend;
    use std::path::PathBuf;

    fn source() -> MicroPosts {
        MicroPosts::new(LocalSource::new("micros"))
    }

    #[test]
    fn test_key_and_permalink() {
        let h = Harness::default();
        let file = LocalFile {
            path: PathBuf::from("micros/2024/coffee.md"),
            bytes: b"---\ndate: 2024-03-01\ntags: [Coffee]\n---\nA [good](https://example.com) cup.\n".to_vec(),
        };
        let draft = source().parse(&h.context, file).unwrap();
        assert_eq!(draft.key, "coffee-2024-03-01");
        assert_eq!(draft.data.stem, "coffee");
    }

    #[test]
    fn test_missing_date() {
        let h = Harness::default();
        let file = LocalFile {
            path: PathBuf::from("micros/coffee.md"),
            bytes: b"---\ntags: [Coffee]\n---\nA cup.\n".to_vec(),
        };
        assert!(source().parse(&h.context, file).is_err());
    }

    #[tokio::test]
    async fn test_load() {
        let content = MockBackend::with_files([
            ("micros/coffee.md", b"---\ndate: 2024-03-01\n---\nA [good](https://example.com) cup.\n".to_vec()),
            ("micros/tea.md", b"---\ndate: 2024-03-02 08:00\n---\nTea time. ![Mug](mug.png)\n".to_vec()),
        ]);
        let fetcher = MockFetcher::with_responses([(format!("{CDN}mug.png"), png(30, 30))]);
        let h = Harness::new(fetcher, content);
        let loaded = load(&source(), &h.context, &Snapshot::default()).await.unwrap();
        let Contribution::MicroPosts(posts) = loaded.contribution else {
            panic!("micro posts expected");
        };
        assert_eq!(posts.keys(), ["tea-2024-03-02 08:00", "coffee-2024-03-01"]);
        let coffee = posts.get("coffee-2024-03-01").unwrap();
        assert_eq!(coffee.permalink, "/micros/2024/03/01/coffee");
        assert_eq!(coffee.description, "A good cup.");
        let tea = posts.get("tea-2024-03-02 08:00").unwrap();
        assert_eq!(tea.meta.media.len(), 1);
        assert_eq!(tea.meta.media[0].original.alt.as_deref(), Some("Mug"));
    }
}
