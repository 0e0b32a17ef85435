//! Image pipeline.
//!
//! Turns an image reference from a source into a [`ResolvedImage`]: the
//! original is downloaded into the cache and measured, each configured
//! variant is resized to JPEG and published, and nothing that already exists
//! is ever downloaded, resized or uploaded again.
//!
//! [`ResolvedImage`]: almanac_model::ResolvedImage

pub mod error;
mod imaging;
mod pipeline;

pub use crate::imaging::{measure, target_height};
pub use crate::pipeline::{MediaPipeline, MediaStats, VariantKey, publish_path, variant_path};
