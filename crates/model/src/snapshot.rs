//! The persisted state of a run.

use crate::collection::{GameLibrary, LegoCollection};
use crate::entity::{Album, AlbumPhoto, ArchivePost, BlogPost, Entity, MastodonPost, MicroPost, StatusUpdate};
use crate::set::OrderedEntitySet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use time::OffsetDateTime;

/// Everything a run produced. The next run reads it back as its "previous
/// data".
///
/// Every field defaults, so a snapshot written before a source existed still
/// loads.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Snapshot {
    pub blog_posts: OrderedEntitySet<BlogPost>,
    pub micro_posts: OrderedEntitySet<MicroPost>,
    pub mastodon_posts: OrderedEntitySet<MastodonPost>,
    pub archive_posts: OrderedEntitySet<ArchivePost>,
    pub status_updates: OrderedEntitySet<StatusUpdate>,
    pub albums: OrderedEntitySet<Album>,
    pub album_photos: OrderedEntitySet<AlbumPhoto>,
    pub lego: Option<LegoCollection>,
    pub games: Option<GameLibrary>,
    /// Free-text pages by name (`about`, `now`, ...).
    pub pages: BTreeMap<String, String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_updated: Option<OffsetDateTime>,
}
impl Snapshot {
    /// Every timeline entity, cloned into the mixed [`Entity`] form, set by
    /// set in a fixed order.
    pub fn entities(&self) -> impl Iterator<Item = Entity> + '_ {
        let blog = self.blog_posts.iter().cloned().map(Entity::from);
        let micro = self.micro_posts.iter().cloned().map(Entity::from);
        let mastodon = self.mastodon_posts.iter().cloned().map(Entity::from);
        let archive = self.archive_posts.iter().cloned().map(Entity::from);
        let status = self.status_updates.iter().cloned().map(Entity::from);
        let albums = self.albums.iter().cloned().map(Entity::from);
        let photos = self.album_photos.iter().cloned().map(Entity::from);
        blog.chain(micro).chain(mastodon).chain(archive).chain(status).chain(albums).chain(photos)
    }

    /// Total number of timeline entities.
    pub fn len(&self) -> usize {
        self.blog_posts.len()
            + self.micro_posts.len()
            + self.mastodon_posts.len()
            + self.archive_posts.len()
            + self.status_updates.len()
            + self.albums.len()
            + self.album_photos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
