//! Image descriptors.

use crate::digest::{Canonical, DigestBuilder};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter, Result as FmtResult};

/// Orientation of an image, derived from its dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Landscape,
    Portrait,
    Square,
}
impl Orientation {
    pub fn from_dimensions(width: u32, height: u32) -> Self {
        match width.cmp(&height) {
            std::cmp::Ordering::Greater => Self::Landscape,
            std::cmp::Ordering::Less => Self::Portrait,
            std::cmp::Ordering::Equal => Self::Square,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Landscape => "landscape",
            Self::Portrait => "portrait",
            Self::Square => "square",
        }
    }
}
impl Display for Orientation {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

/// An image as a source refers to it, before anything has been downloaded.
///
/// Dimensions are whatever the source claims (if anything); they are never
/// trusted over the measured ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub src: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}
impl ImageRef {
    pub fn new(src: impl Into<String>, alt: Option<String>) -> Self {
        Self {
            src: src.into(),
            alt,
            width: None,
            height: None,
        }
    }
}
impl Canonical for ImageRef {
    const DOMAIN: &'static str = "image";
    fn canonical(&self, digest: &mut DigestBuilder) {
        digest
            .str(&self.src)
            .opt_str(self.alt.as_deref())
            .opt_u64(self.width.map(u64::from))
            .opt_u64(self.height.map(u64::from));
    }
}

/// A measured image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageDescriptor {
    pub src: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt: Option<String>,
    pub width: u32,
    pub height: u32,
    pub orientation: Orientation,
}
impl ImageDescriptor {
    pub fn new(src: impl Into<String>, alt: Option<String>, width: u32, height: u32) -> Self {
        Self {
            src: src.into(),
            alt,
            width,
            height,
            orientation: Orientation::from_dimensions(width, height),
        }
    }
}

/// A derived size of an image, as published. `image.src` is the public URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variant {
    pub image: ImageDescriptor,
    /// Path of the variant relative to the publish target's root.
    pub path: String,
}

/// An image with all of its configured variants derived and published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedImage {
    pub original: ImageDescriptor,
    pub variants: BTreeMap<String, Variant>,
}
impl ResolvedImage {
    pub fn variant(&self, name: &str) -> Option<&Variant> {
        self.variants.get(name)
    }

    pub fn orientation(&self) -> Orientation {
        self.original.orientation
    }
}

/// An image attached to an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRef {
    pub original: ImageRef,
    #[serde(default)]
    pub resolved: Option<ResolvedImage>,
}
impl MediaRef {
    pub fn resolved(original: ImageRef, resolved: ResolvedImage) -> Self {
        Self {
            original,
            resolved: Some(resolved),
        }
    }
}
