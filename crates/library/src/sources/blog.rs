use super::{LocalFile, markdown, parse_date, read_files};
use crate::Context;
use crate::load::error::{ErrorKind, Result};
use crate::load::{Contribution, Draft, Source};
use almanac_config::{LocalSource, RecordPolicy};
use almanac_model::{BlogPost, DigestBuilder, ImageRef, Meta, OrderedEntitySet, Snapshot, Tags};
use async_trait::async_trait;
use exn::{OptionExt, ResultExt};
use serde::Deserialize;
use time::OffsetDateTime;

#[derive(Deserialize)]
struct FrontMatter {
    slug: Option<String>,
    title: Option<String>,
    date: Option<String>,
    description: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    hero: Option<Hero>,
}

#[derive(Deserialize)]
struct Hero {
    src: String,
    alt: Option<String>,
}

pub struct Parsed {
    slug: String,
    title: String,
    description: String,
    date: OffsetDateTime,
    body: String,
    tags: Tags,
    hero: Option<ImageRef>,
    images: Vec<ImageRef>,
}

/// Long-form posts: `*.md` files with YAML front matter.
pub struct BlogPosts {
    config: LocalSource,
}
impl BlogPosts {
    pub fn new(config: LocalSource) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Source for BlogPosts {
    type Raw = LocalFile;
    type Parsed = Parsed;
    type Output = BlogPost;

    fn name(&self) -> &'static str {
        "blog_posts"
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

    fn previous(&self, snapshot: &Snapshot, key: &str) -> Option<BlogPost> {
        snapshot.blog_posts.get(key).cloned()
    }

    async fn resolve(&self, ctx: &Context, draft: Draft<Parsed>, _previous: Option<BlogPost>) -> Result<BlogPost> {
        let Draft { key, digest, data } = draft;
        let has_hero = data.hero.is_some();
        let images = data.hero.into_iter().chain(data.images).collect();
        let media = ctx.media.resolve_all(images, data.date).await.or_raise(|| ErrorKind::Media)?;
        Ok(BlogPost {
            meta: Meta {
                key,
                date: data.date,
                content_digest: digest,
                tags: data.tags,
                media,
            },
            permalink: format!("/blog/{}", data.slug),
            slug: data.slug,
            title: data.title,
            description: data.description,
            body: data.body,
            has_hero,
        })
    }

    fn assemble(&self, entities: Vec<BlogPost>, previous: &Snapshot) -> Contribution {
        Contribution::BlogPosts(OrderedEntitySet::from_entities(entities).carry_forward(&previous.blog_posts))
    }
}

fn parse_inner(ctx: &Context, file: &LocalFile) -> Result<Draft<Parsed>> {
    let (front_matter, body): (FrontMatter, _) = markdown::parse(file)?;
    let slug =
        front_matter.slug.filter(|slug| !slug.trim().is_empty()).ok_or_raise(|| ErrorKind::MissingField("slug"))?;
    let title = front_matter.title.ok_or_raise(|| ErrorKind::MissingField("title"))?;
    let raw_date = front_matter.date.ok_or_raise(|| ErrorKind::MissingField("date"))?;
    let description = front_matter.description.ok_or_raise(|| ErrorKind::MissingField("description"))?;
    let date = parse_date(&raw_date)?;
    let hero = match front_matter.hero {
        Some(hero) => {
            let alt = hero.alt.filter(|alt| !alt.is_empty()).ok_or_raise(|| ErrorKind::MissingField("hero.alt"))?;
            Some(ImageRef::new(hero.src, Some(alt)))
        },
        None => None,
    };
    let mut images = Vec::new();
    for (alt, src) in markdown::images(body) {
        if alt.is_empty() {
            exn::bail!(ErrorKind::MissingField("image alt"));
        }
        images.push(ImageRef::new(src, Some(alt.to_string())));
    }
    let tags = ctx.tags.apply(&front_matter.tags);

    let mut digest = DigestBuilder::new("blog-post");
    digest.str(&slug).str(&title).str(&raw_date).str(&description).str(body).strs(tags.iter());
    digest.bool(hero.is_some());
    for image in hero.iter().chain(&images) {
        digest.nested(image);
    }

    Ok(Draft {
        key: slug.clone(),
        digest: digest.finish(),
        data: Parsed {
            slug,
            title,
            description,
            date,
            body: body.to_string(),
            tags,
            hero,
            images,
        },
    })
}
