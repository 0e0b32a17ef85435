use almanac_model::{
    Album, AlbumPhoto, ArchivePost, BlogPost, GameLibrary, LegoCollection, MastodonPost, MicroPost, OrderedEntitySet,
    Snapshot, StatusUpdate,
};
use std::collections::BTreeMap;

/// The slice of the snapshot a single source owns.
///
/// Applying a contribution replaces that slice and nothing else, so sources
/// that failed (or were not configured) keep their previous data untouched.
#[derive(Debug, Clone)]
pub enum Contribution {
    BlogPosts(OrderedEntitySet<BlogPost>),
    MicroPosts(OrderedEntitySet<MicroPost>),
    MastodonPosts(OrderedEntitySet<MastodonPost>),
    ArchivePosts(OrderedEntitySet<ArchivePost>),
    StatusUpdates(OrderedEntitySet<StatusUpdate>),
    Albums {
        albums: OrderedEntitySet<Album>,
        photos: OrderedEntitySet<AlbumPhoto>,
    },
    Lego(LegoCollection),
    Games(GameLibrary),
    Pages(BTreeMap<String, String>),
}
impl Contribution {
    /// Number of top-level items contributed. Used for logging only.
    pub fn len(&self) -> usize {
        match self {
            Self::BlogPosts(set) => set.len(),
            Self::MicroPosts(set) => set.len(),
            Self::MastodonPosts(set) => set.len(),
            Self::ArchivePosts(set) => set.len(),
            Self::StatusUpdates(set) => set.len(),
            Self::Albums { albums, .. } => albums.len(),
            Self::Lego(lego) => lego.sets.len(),
            Self::Games(games) => games.games.len(),
            Self::Pages(pages) => pages.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn apply(self, snapshot: &mut Snapshot) {
        match self {
            Self::BlogPosts(set) => snapshot.blog_posts = set,
            Self::MicroPosts(set) => snapshot.micro_posts = set,
            Self::MastodonPosts(set) => snapshot.mastodon_posts = set,
            Self::ArchivePosts(set) => snapshot.archive_posts = set,
            Self::StatusUpdates(set) => snapshot.status_updates = set,
            Self::Albums { albums, photos } => {
                snapshot.albums = albums;
                snapshot.album_photos = photos;
            },
            Self::Lego(lego) => snapshot.lego = Some(lego),
            Self::Games(games) => snapshot.games = Some(games),
            Self::Pages(pages) => snapshot.pages = pages,
        }
    }
}
