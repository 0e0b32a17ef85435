//! The almanac data model.
//!
//! Everything a run produces and persists is defined here: the entity
//! variants and the fields they share, image descriptors, content digests
//! used for change detection, date-ordered entity sets and the snapshot that
//! ties them all together.

pub mod collection;
pub mod digest;
pub mod entity;
pub mod image;
pub mod set;
pub mod snapshot;
pub mod tag;

pub use crate::collection::{Game, GameLibrary, LegoCollection, LegoSet};
pub use crate::digest::{Canonical, Digest, DigestBuilder, should_reuse};
pub use crate::entity::{
    Album, AlbumPhoto, ArchivePost, BlogPost, Entity, EntityKind, MastodonPost, Meta, MicroPost, Record, StatusUpdate,
};
pub use crate::image::{ImageDescriptor, ImageRef, MediaRef, Orientation, ResolvedImage, Variant};
pub use crate::set::OrderedEntitySet;
pub use crate::snapshot::Snapshot;
pub use crate::tag::{TagFilter, Tags};
