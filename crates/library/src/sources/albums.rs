use super::{LocalFile, parse_date, read_files};
use crate::Context;
use crate::load::error::{ErrorKind, Result};
use crate::load::{Contribution, Draft, Source};
use almanac_config::{LocalSource, RecordPolicy};
use almanac_model::{
    Album, AlbumPhoto, Digest, DigestBuilder, EntityKind, ImageRef, MediaRef, Meta, OrderedEntitySet, Orientation,
    Record, Snapshot, Tags,
};
use async_trait::async_trait;
use exn::{OptionExt, ResultExt};
use futures::future::try_join_all;
use rslug::slugify;
use serde::Deserialize;
use std::collections::BTreeSet;
use time::OffsetDateTime;

#[derive(Deserialize)]
struct AlbumFile {
    title: Option<String>,
    description: Option<String>,
    date: Option<String>,
    #[serde(default)]
    photos: Vec<PhotoFile>,
}

#[derive(Deserialize)]
struct PhotoFile {
    url: Option<String>,
    alt: Option<String>,
    description: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    featured: bool,
}

pub struct Parsed {
    title: String,
    description: Option<String>,
    date: OffsetDateTime,
    photos: Vec<PhotoDraft>,
}

struct PhotoDraft {
    key: String,
    digest: Digest,
    image: ImageRef,
    alt: String,
    description: Option<String>,
    tags: Tags,
    featured: bool,
}

/// An album together with its photos, in album order.
///
/// Albums and photos end up in separate sets, but they are loaded (and
/// reused) as one record: the bundle's digest is the album's.
#[derive(Debug, Clone)]
pub struct AlbumBundle {
    pub album: Album,
    pub photos: Vec<AlbumPhoto>,
}
impl Record for AlbumBundle {
    fn kind(&self) -> EntityKind {
        EntityKind::Album
    }

    fn meta(&self) -> &Meta {
        &self.album.meta
    }
}

/// Photo albums described by YAML files.
///
/// An album whose file did not change is reused as a whole. An album that
/// did change still reuses every photo whose own fields are unchanged, so
/// adding one photo costs one photo's worth of media work.
pub struct Albums {
    config: LocalSource,
}
impl Albums {
    pub fn new(config: LocalSource) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Source for Albums {
    type Raw = LocalFile;
    type Parsed = Parsed;
    type Output = AlbumBundle;

    fn name(&self) -> &'static str {
        "albums"
    }

    fn policy(&self) -> RecordPolicy {
        self.config.policy
    }

    async fn fetch(&self, ctx: &Context) -> Result<Vec<LocalFile>> {
        read_files(ctx, &self.config.dir, &["yml", "yaml"]).await
    }

    fn parse(&self, ctx: &Context, file: LocalFile) -> Result<Draft<Parsed>> {
        parse_inner(ctx, &file).or_raise(|| ErrorKind::InvalidRecord(file.path.display().to_string()))
    }

    fn previous(&self, snapshot: &Snapshot, key: &str) -> Option<AlbumBundle> {
        let album = snapshot.albums.get(key)?;
        Some(AlbumBundle {
            album: album.clone(),
            photos: photos_of(album, &snapshot.album_photos).collect(),
        })
    }

    async fn resolve(
        &self,
        ctx: &Context,
        draft: Draft<Parsed>,
        previous: Option<AlbumBundle>,
    ) -> Result<AlbumBundle> {
        let Draft { key, digest, data } = draft;
        let previous_photos = previous.map(|bundle| bundle.photos).unwrap_or_default();
        let date = data.date;

        let resolved = try_join_all(data.photos.iter().map(|photo| async {
            let reusable = previous_photos
                .iter()
                .find(|previous| previous.meta.key == photo.key && previous.meta.content_digest == photo.digest);
            if let Some(previous) = reusable {
                tracing::debug!(album = %key, photo = %photo.key, "Reusing unchanged photo");
                return Ok((previous.meta.media.clone(), previous.orientation));
            }
            let image = ctx.media.resolve(&photo.image, date).await.or_raise(|| ErrorKind::Media)?;
            let orientation = image.orientation();
            Ok::<_, crate::load::error::Error>((vec![MediaRef::resolved(photo.image.clone(), image)], orientation))
        }))
        .await?;

        let photo_order: Vec<String> = data.photos.iter().map(|photo| photo.key.clone()).collect();
        let total = data.photos.len();
        let photos: Vec<AlbumPhoto> = data
            .photos
            .into_iter()
            .zip(resolved)
            .enumerate()
            .map(|(index, (photo, (media, orientation)))| AlbumPhoto {
                meta: Meta {
                    key: photo.key.clone(),
                    date,
                    content_digest: photo.digest,
                    tags: photo.tags,
                    media,
                },
                album_key: key.clone(),
                album_title: data.title.clone(),
                permalink: photo.key,
                description: photo.description.unwrap_or_else(|| photo.alt.clone()),
                alt: photo.alt,
                featured: photo.featured,
                orientation,
                index,
                album_total: total,
                previous: index.checked_sub(1).and_then(|previous| photo_order.get(previous)).cloned(),
                next: photo_order.get(index + 1).cloned(),
            })
            .collect();

        let cover_photos = cover_photos(&photos);
        let media = cover_photos
            .iter()
            .filter_map(|cover| photos.iter().find(|photo| &photo.meta.key == cover))
            .flat_map(|photo| photo.meta.media.iter().cloned())
            .collect();
        let album = Album {
            meta: Meta {
                key: key.clone(),
                date,
                content_digest: digest,
                tags: Tags::union(photos.iter().map(|photo| &photo.meta.tags)),
                media,
            },
            title: data.title,
            description: data.description,
            permalink: key,
            photo_order,
            cover_photos,
        };
        Ok(AlbumBundle { album, photos })
    }

    fn assemble(&self, bundles: Vec<AlbumBundle>, previous: &Snapshot) -> Contribution {
        let fresh: BTreeSet<String> = bundles.iter().map(|bundle| bundle.album.meta.key.clone()).collect();
        let (albums, photos): (Vec<_>, Vec<_>) =
            bundles.into_iter().map(|bundle| (bundle.album, bundle.photos)).unzip();
        let albums = OrderedEntitySet::from_entities(albums).carry_forward(&previous.albums);
        // Albums that were carried forward bring their previous photos along.
        let carried: Vec<AlbumPhoto> = albums
            .iter()
            .filter(|album| !fresh.contains(&album.meta.key))
            .flat_map(|album| photos_of(album, &previous.album_photos))
            .collect();
        let photos = OrderedEntitySet::from_entities(photos.into_iter().flatten().chain(carried));
        Contribution::Albums { albums, photos }
    }
}

fn parse_inner(ctx: &Context, file: &LocalFile) -> Result<Draft<Parsed>> {
    let album: AlbumFile = serde_yaml::from_str(file.text()?)
        .or_raise(|| ErrorKind::InvalidRecord(format!("{} is not a valid album", file.path.display())))?;
    let title = album.title.filter(|title| !title.trim().is_empty()).ok_or_raise(|| ErrorKind::MissingField("title"))?;
    let raw_date = album.date.ok_or_raise(|| ErrorKind::MissingField("date"))?;
    let date = parse_date(&raw_date)?;
    let description = album.description.filter(|description| !description.trim().is_empty());
    let key = permalink(&title, date);

    let mut digest = DigestBuilder::new("album");
    digest.str(&key).str(&title).opt_str(description.as_deref()).str(&raw_date);
    let mut photos = Vec::with_capacity(album.photos.len());
    for photo in album.photos {
        let photo = parse_photo(ctx, &key, photo)?;
        digest.str(photo.digest.as_str());
        photos.push(photo);
    }

    Ok(Draft {
        key,
        digest: digest.finish(),
        data: Parsed {
            title,
            description,
            date,
            photos,
        },
    })
}

fn parse_photo(ctx: &Context, album_key: &str, photo: PhotoFile) -> Result<PhotoDraft> {
    let url = photo.url.filter(|url| !url.is_empty()).ok_or_raise(|| ErrorKind::MissingField("photo url"))?;
    let alt = photo.alt.filter(|alt| !alt.is_empty()).ok_or_raise(|| ErrorKind::MissingField("photo alt"))?;
    let stem = file_stem(&url).ok_or_raise(|| ErrorKind::InvalidRecord(format!("no file name in {url}")))?;
    let tags = ctx.tags.apply(&photo.tags);

    let mut digest = DigestBuilder::new("album-photo");
    digest
        .str(&url)
        .str(&alt)
        .opt_str(photo.description.as_deref())
        .strs(tags.iter())
        .bool(photo.featured);

    Ok(PhotoDraft {
        key: format!("{album_key}{stem}"),
        digest: digest.finish(),
        image: ImageRef::new(url.as_str(), Some(alt.clone())),
        alt,
        description: photo.description,
        tags,
        featured: photo.featured,
    })
}

/// `/albums/{yyyy}/{mm}/{slug}/`, doubling as the album's key.
fn permalink(title: &str, date: OffsetDateTime) -> String {
    // Various quotation marks: '"''""„"`«»
    let marks = [
        '\u{0027}', '\u{0022}', '\u{2018}', '\u{2019}', '\u{201C}', '\u{201D}', '\u{201E}', '\u{201B}', '\u{0060}',
        '\u{00AB}', '\u{00BB}', '\u{2039}', '\u{203A}',
    ];
    let stripped: String = title.chars().filter(|c| !marks.contains(c)).collect();
    format!("/albums/{:04}/{:02}/{}/", date.year(), u8::from(date.month()), slugify!(&stripped))
}

/// Last path segment of a URL, without its extension or query.
fn file_stem(url: &str) -> Option<&str> {
    let name = url.split(['?', '#']).next()?.rsplit('/').next()?;
    let stem = name.rsplit_once('.').map_or(name, |(stem, _)| stem);
    (!stem.is_empty()).then_some(stem)
}

fn photos_of<'a>(album: &'a Album, photos: &'a OrderedEntitySet<AlbumPhoto>) -> impl Iterator<Item = AlbumPhoto> + 'a {
    album.photo_order.iter().filter_map(|key| photos.get(key)).cloned()
}

/// Pick the photos that represent an album: a featured landscape photo,
/// else two featured non-landscape photos, else one featured non-landscape
/// photo and one other non-landscape photo, else the first other landscape
/// photo, else the first other non-landscape photo, else the first photo.
fn cover_photos(photos: &[AlbumPhoto]) -> Vec<String> {
    let landscape = |photo: &&AlbumPhoto| photo.orientation == Orientation::Landscape;
    let (featured, other): (Vec<&AlbumPhoto>, Vec<&AlbumPhoto>) = photos.iter().partition(|photo| photo.featured);
    let (featured_landscape, featured_portrait): (Vec<_>, Vec<_>) = featured.into_iter().partition(landscape);
    let (other_landscape, other_portrait): (Vec<_>, Vec<_>) = other.into_iter().partition(landscape);

    let picked: Vec<&AlbumPhoto> = match (
        featured_landscape.as_slice(),
        featured_portrait.as_slice(),
        other_landscape.as_slice(),
        other_portrait.as_slice(),
    ) {
        ([first, ..], _, _, _) => vec![*first],
        (_, [first, second, ..], _, _) => vec![*first, *second],
        (_, [first], _, [other, ..]) => vec![*first, *other],
        (_, _, [first, ..], _) => vec![*first],
        (_, _, _, [first, ..]) => vec![*first],
        _ => photos.iter().take(1).collect(),
    };
    picked.into_iter().map(|photo| photo.meta.key.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load::load;
    use crate::tests::{CDN, Harness, png};
    use almanac_cache::fetch::MockFetcher;
    use almanac_storage::backend::MockBackend;
    use rstest::rstest;
    use std::sync::Arc;
    use time::macros::datetime;

    const ALBUM: &str = "title: '\"Rock ''n'' Roll\" Weekend'
date: 2024-03-09
description: Two days by the sea.
photos:
  - url: albums/2024/wide.png
    alt: The bay
    tags: [Sea]
  - url: albums/2024/tall.png
    alt: A lighthouse
    description: The lighthouse at dusk.
    tags: [Sea, Lighthouse]
    featured: true
";

    fn source() -> Albums {
        Albums::new(LocalSource::new("albums"))
    }

    fn fetcher() -> MockFetcher {
        MockFetcher::with_responses([
            (format!("{CDN}albums/2024/wide.png"), png(40, 20)),
            (format!("{CDN}albums/2024/tall.png"), png(20, 40)),
            (format!("{CDN}albums/2024/square.png"), png(30, 30)),
        ])
    }

    fn photo(key: &str, orientation: Orientation, featured: bool) -> AlbumPhoto {
        AlbumPhoto {
            meta: Meta {
                key: key.to_string(),
                date: datetime!(2024-03-09 00:00 UTC),
                content_digest: Digest::of(key),
                tags: Tags::default(),
                media: vec![],
            },
            album_key: "/albums/2024/03/a/".to_string(),
            album_title: "A".to_string(),
            permalink: key.to_string(),
            alt: key.to_string(),
            description: key.to_string(),
            featured,
            orientation,
            index: 0,
            album_total: 0,
            previous: None,
            next: None,
        }
    }

    #[rstest]
    #[case::featured_landscape(&[("a", 'P', true), ("b", 'L', true), ("c", 'L', false)], &["b"])]
    #[case::two_featured_portraits(&[("a", 'L', false), ("b", 'P', true), ("c", 'S', true)], &["b", "c"])]
    #[case::featured_and_other_portrait(&[("a", 'L', false), ("b", 'P', true), ("c", 'P', false)], &["b", "c"])]
    #[case::other_landscape(&[("a", 'P', true), ("b", 'L', false)], &["b"])]
    #[case::other_portrait(&[("a", 'P', false), ("b", 'S', false)], &["a"])]
    #[case::single_featured_portrait(&[("a", 'P', true)], &["a"])]
    #[case::empty(&[], &[])]
    fn test_cover_photos(#[case] photos: &[(&str, char, bool)], #[case] expected: &[&str]) {
        let photos: Vec<_> = photos
            .iter()
            .map(|(key, orientation, featured)| {
                let orientation = match orientation {
                    'L' => Orientation::Landscape,
                    'P' => Orientation::Portrait,
                    _ => Orientation::Square,
                };
                photo(key, orientation, *featured)
            })
            .collect();
        assert_eq!(cover_photos(&photos), expected);
    }

    #[rstest]
    #[case("albums/2024/IMG_0001.jpg", Some("IMG_0001"))]
    #[case("https://cdn.example.com/a/b.c.png?w=100", Some("b.c"))]
    #[case("plain", Some("plain"))]
    #[case("albums/2024/", None)]
    fn test_file_stem(#[case] url: &str, #[case] expected: Option<&str>) {
        assert_eq!(file_stem(url), expected);
    }

    #[test]
    fn test_permalink_strips_quotation_marks() {
        assert_eq!(
            permalink("\"Rock 'n' Roll\" Weekend", datetime!(2024-03-09 00:00 UTC)),
            "/albums/2024/03/rock-n-roll-weekend/"
        );
    }

    #[rstest]
    #[case::title("title: '\"Rock ''n'' Roll\" Weekend'\n", "")]
    #[case::date("date: 2024-03-09\n", "")]
    #[case::photo_url("  - url: albums/2024/wide.png\n", "  - tags: []\n")]
    #[case::photo_alt("    alt: The bay\n", "")]
    fn test_parse_rejects(#[case] from: &str, #[case] to: &str) {
        let h = Harness::default();
        let file = LocalFile {
            path: "albums/weekend.yml".into(),
            bytes: ALBUM.replacen(from, to, 1).into_bytes(),
        };
        assert!(source().parse(&h.context, file).is_err());
    }

    #[tokio::test]
    async fn test_load() {
        let content = MockBackend::with_files([("albums/weekend.yml", ALBUM.as_bytes().to_vec())]);
        let h = Harness::new(fetcher(), content);
        let loaded = load(&source(), &h.context, &Snapshot::default()).await.unwrap();
        let Contribution::Albums { albums, photos } = loaded.contribution else {
            panic!("albums expected");
        };

        let key = "/albums/2024/03/rock-n-roll-weekend/";
        let album = albums.get(key).unwrap();
        assert_eq!(album.permalink, key);
        assert_eq!(album.photo_order, [format!("{key}wide"), format!("{key}tall")]);
        assert_eq!(album.meta.tags.iter().collect::<Vec<_>>(), ["lighthouse", "sea"]);
        assert_eq!(album.cover_photos, [format!("{key}wide")], "a landscape photo beats a featured portrait one");
        assert_eq!(album.meta.media.len(), 1);

        let wide = photos.get(&format!("{key}wide")).unwrap();
        assert_eq!(wide.orientation, Orientation::Landscape);
        assert_eq!(wide.description, "The bay");
        assert_eq!((wide.index, wide.album_total), (0, 2));
        assert_eq!(wide.previous, None);
        assert_eq!(wide.next.as_deref(), Some(format!("{key}tall").as_str()));
        let tall = photos.get(&format!("{key}tall")).unwrap();
        assert_eq!(tall.orientation, Orientation::Portrait);
        assert_eq!(tall.album_title, "\"Rock 'n' Roll\" Weekend");
        assert_eq!(tall.previous.as_deref(), Some(format!("{key}wide").as_str()));
    }

    #[tokio::test]
    async fn test_edited_album_reuses_unchanged_photos() {
        let cache = Arc::new(MockBackend::default());
        let publish = Arc::new(MockBackend::default());
        let first_content = Arc::new(MockBackend::with_files([("albums/weekend.yml", ALBUM.as_bytes().to_vec())]));
        let first = Harness::with_backends(Arc::new(fetcher()), first_content, cache.clone(), publish.clone());
        let mut previous = Snapshot::default();
        load(&source(), &first.context, &previous).await.unwrap().contribution.apply(&mut previous);

        let edited = format!("{ALBUM}  - url: albums/2024/square.png\n    alt: A shell\n");
        let second_content = Arc::new(MockBackend::with_files([("albums/weekend.yml", edited.into_bytes())]));
        let second = Harness::with_backends(Arc::new(fetcher()), second_content, cache, publish);
        let loaded = load(&source(), &second.context, &previous).await.unwrap();
        assert_eq!(loaded.stats.recomputed, 1);
        assert_eq!(second.context.media.stats().resolved, 1, "only the new photo is resolved");

        let mut next = previous.clone();
        loaded.contribution.apply(&mut next);
        let key = "/albums/2024/03/rock-n-roll-weekend/";
        assert_eq!(next.albums.get(key).unwrap().photo_order.len(), 3);
        let wide = format!("{key}wide");
        assert_eq!(
            next.album_photos.get(&wide).unwrap().meta.media,
            previous.album_photos.get(&wide).unwrap().meta.media
        );
        let tall = next.album_photos.get(&format!("{key}tall")).unwrap();
        assert_eq!(tall.next.as_deref(), Some(format!("{key}square").as_str()));
        assert_eq!(tall.album_total, 3);
    }

    #[tokio::test]
    async fn test_vanished_album_keeps_its_photos() {
        let content = MockBackend::with_files([("albums/weekend.yml", ALBUM.as_bytes().to_vec())]);
        let h = Harness::new(fetcher(), content);
        let mut previous = Snapshot::default();
        load(&source(), &h.context, &previous).await.unwrap().contribution.apply(&mut previous);

        let h = Harness::default();
        let loaded = load(&source(), &h.context, &previous).await.unwrap();
        let mut next = Snapshot::default();
        loaded.contribution.apply(&mut next);
        assert_eq!(next.albums, previous.albums);
        assert_eq!(next.album_photos, previous.album_photos);
    }
}
