//! Entities: the units of aggregated content.
//!
//! Every variant embeds a [`Meta`] holding the fields all entities share
//! (key, date, content digest, tags and media) and implements [`Record`] so
//! the ordering, change-detection and index code can treat them alike.

use crate::digest::Digest;
use crate::image::{MediaRef, Orientation};
use crate::tag::Tags;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt::{Display, Formatter, Result as FmtResult};
use time::OffsetDateTime;

/// The closed set of entity variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntityKind {
    BlogPost,
    MicroPost,
    MastodonPost,
    ArchivePost,
    StatusUpdate,
    Album,
    AlbumPhoto,
}
impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BlogPost => "blog-post",
            Self::MicroPost => "micro-post",
            Self::MastodonPost => "mastodon-post",
            Self::ArchivePost => "archive-post",
            Self::StatusUpdate => "status-update",
            Self::Album => "album",
            Self::AlbumPhoto => "album-photo",
        }
    }
}
impl Display for EntityKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

/// Fields shared by every entity variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    /// Source-derived identifier, unique within the entity's type.
    pub key: String,
    #[serde(with = "time::serde::rfc3339")]
    pub date: OffsetDateTime,
    /// Digest of the source fields this entity was built from.
    pub content_digest: Digest,
    #[serde(default)]
    pub tags: Tags,
    #[serde(default)]
    pub media: Vec<MediaRef>,
}

/// Behaviour shared by every entity (and by [`Entity`] itself).
pub trait Record {
    fn kind(&self) -> EntityKind;
    fn meta(&self) -> &Meta;

    fn key(&self) -> &str {
        &self.meta().key
    }

    fn date(&self) -> OffsetDateTime {
        self.meta().date
    }

    fn content_digest(&self) -> &Digest {
        &self.meta().content_digest
    }

    fn tags(&self) -> &Tags {
        &self.meta().tags
    }

    fn media(&self) -> &[MediaRef] {
        &self.meta().media
    }

    /// Key used when collecting records into an
    /// [`OrderedEntitySet`](crate::OrderedEntitySet).
    fn set_key(&self) -> Cow<'_, str> {
        Cow::Borrowed(self.key())
    }
}

macro_rules! record {
    ($ty:ident, $kind:expr) => {
        impl Record for $ty {
            fn kind(&self) -> EntityKind {
                $kind
            }
            fn meta(&self) -> &Meta {
                &self.meta
            }
        }
    };
}

/// A long-form post written in markdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlogPost {
    pub meta: Meta,
    pub slug: String,
    pub title: String,
    pub description: String,
    pub body: String,
    pub permalink: String,
    /// The first media entry is the hero image.
    #[serde(default)]
    pub has_hero: bool,
}
record!(BlogPost, EntityKind::BlogPost);

/// A short-form post written in markdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MicroPost {
    pub meta: Meta,
    pub body: String,
    pub description: String,
    pub permalink: String,
}
record!(MicroPost, EntityKind::MicroPost);

/// A post pulled from a Mastodon account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MastodonPost {
    pub meta: Meta,
    pub id: String,
    pub url: String,
    pub content: String,
}
record!(MastodonPost, EntityKind::MastodonPost);

/// A post from the legacy blog archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchivePost {
    pub meta: Meta,
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
    pub content: String,
    pub permalink: String,
}
record!(ArchivePost, EntityKind::ArchivePost);

/// A status update from a status feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub meta: Meta,
    pub id: String,
    pub url: String,
    pub content: String,
    #[serde(default)]
    pub emoji: Option<String>,
    pub permalink: String,
}
record!(StatusUpdate, EntityKind::StatusUpdate);

/// A photo album. Its photos are separate [`AlbumPhoto`] entities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Album {
    pub meta: Meta,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub permalink: String,
    /// Photo keys in album order.
    pub photo_order: Vec<String>,
    pub cover_photos: Vec<String>,
}
record!(Album, EntityKind::Album);

/// A single photo within an album. The photo itself is the first (and only)
/// media entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlbumPhoto {
    pub meta: Meta,
    pub album_key: String,
    pub album_title: String,
    pub permalink: String,
    pub alt: String,
    pub description: String,
    #[serde(default)]
    pub featured: bool,
    pub orientation: Orientation,
    /// Zero-based position within the album.
    pub index: usize,
    pub album_total: usize,
    #[serde(default)]
    pub previous: Option<String>,
    #[serde(default)]
    pub next: Option<String>,
}
record!(AlbumPhoto, EntityKind::AlbumPhoto);

/// Any entity. Used where different variants are mixed, such as the
/// global timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Entity {
    BlogPost(BlogPost),
    MicroPost(MicroPost),
    MastodonPost(MastodonPost),
    ArchivePost(ArchivePost),
    StatusUpdate(StatusUpdate),
    Album(Album),
    AlbumPhoto(AlbumPhoto),
}
impl Entity {
    /// Key namespaced by entity kind, e.g. `blog-post:hello-world`. Keys are
    /// only unique within a kind; the namespace keeps them apart once
    /// different kinds share a collection.
    pub fn namespaced_key(kind: EntityKind, key: &str) -> String {
        format!("{}:{}", kind.as_str(), key)
    }
}

macro_rules! entity_from {
    ($($variant:ident),+) => {
        $(
            impl From<$variant> for Entity {
                fn from(value: $variant) -> Self {
                    Self::$variant(value)
                }
            }
        )+

        impl Record for Entity {
            fn kind(&self) -> EntityKind {
                match self {
                    $(Self::$variant(inner) => inner.kind(),)+
                }
            }

            fn meta(&self) -> &Meta {
                match self {
                    $(Self::$variant(inner) => inner.meta(),)+
                }
            }

            fn set_key(&self) -> Cow<'_, str> {
                Cow::Owned(Self::namespaced_key(self.kind(), self.key()))
            }
        }
    };
}
entity_from!(BlogPost, MicroPost, MastodonPost, ArchivePost, StatusUpdate, Album, AlbumPhoto);
