//! One adapter per content source.
//!
//! Adapters are deliberately thin: they know the raw shape of their source
//! and how to turn a record into an entity. Reuse, record policy, ordering and
//! fallback all live in [`load`](crate::load) and [`sync`](crate::sync).

mod albums;
mod archive;
mod blog;
mod games;
mod lego;
mod markdown;
mod mastodon;
mod micro;
mod pages;
mod patterns;
mod status_lol;

pub use self::albums::{AlbumBundle, Albums};
pub use self::archive::Archive;
pub use self::blog::BlogPosts;
pub use self::games::Games;
pub use self::lego::Lego;
pub use self::mastodon::Mastodon;
pub use self::micro::MicroPosts;
pub use self::pages::Pages;
pub use self::status_lol::StatusLol;
use crate::Context;
use crate::load::error::{ErrorKind, Result};
use crate::load::{EntityLoader, LoaderHandle};
use almanac_config::Sources;
use exn::{OptionExt, ResultExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use time::format_description::BorrowedFormatItem;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime};

/// A loader for every configured source. Sources without configuration are
/// left out and keep their previous data.
pub fn loaders(sources: &Sources) -> Vec<LoaderHandle> {
    let mut loaders: Vec<LoaderHandle> = Vec::new();
    if let Some(config) = &sources.blog_posts {
        loaders.push(Arc::new(EntityLoader(BlogPosts::new(config.clone()))));
    }
    if let Some(config) = &sources.micro_posts {
        loaders.push(Arc::new(EntityLoader(MicroPosts::new(config.clone()))));
    }
    if let Some(config) = &sources.albums {
        loaders.push(Arc::new(EntityLoader(Albums::new(config.clone()))));
    }
    if let Some(config) = &sources.micro_blog_archive {
        loaders.push(Arc::new(EntityLoader(Archive::new(config.clone()))));
    }
    if let Some(config) = &sources.mastodon {
        loaders.push(Arc::new(EntityLoader(Mastodon::new(config.clone()))));
    }
    if let Some(config) = &sources.status_lol {
        loaders.push(Arc::new(EntityLoader(StatusLol::new(config.clone()))));
    }
    if let Some(config) = &sources.lego {
        loaders.push(Arc::new(Lego::new(config.clone())));
    }
    if let Some(config) = &sources.games {
        loaders.push(Arc::new(Games::new(config.clone())));
    }
    if let Some(config) = &sources.pages {
        loaders.push(Arc::new(Pages::new(config.clone())));
    }
    loaders
}

/// A file from the content directory, not yet decoded.
pub struct LocalFile {
    pub path: PathBuf,
    pub bytes: Vec<u8>,
}
impl LocalFile {
    pub(crate) fn text(&self) -> Result<&str> {
        std::str::from_utf8(&self.bytes)
            .or_raise(|| ErrorKind::InvalidRecord(format!("{} is not valid UTF-8", self.path.display())))
    }

    /// File name without its extension.
    pub(crate) fn stem(&self) -> Result<&str> {
        self.path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .filter(|stem| !stem.is_empty())
            .ok_or_raise(|| ErrorKind::InvalidRecord(format!("{} has no file name", self.path.display())))
    }
}

/// Read every file under `dir` (in the content directory) with one of the
/// given extensions, sorted by path so runs see them in a stable order.
pub(crate) async fn read_files(ctx: &Context, dir: &Path, extensions: &[&str]) -> Result<Vec<LocalFile>> {
    let mut listed: Vec<PathBuf> = ctx
        .content
        .list(Some(dir))
        .await
        .or_raise(|| ErrorKind::Storage)?
        .into_iter()
        .filter(|info| info.extension().is_some_and(|extension| extensions.contains(&extension.as_str())))
        .map(|info| info.path)
        .collect();
    listed.sort();

    let mut files = Vec::with_capacity(listed.len());
    for path in listed {
        let bytes = ctx.content.read(&path).await.or_raise(|| ErrorKind::Storage)?;
        files.push(LocalFile { path, bytes });
    }
    tracing::debug!(dir = %dir.display(), files = files.len(), "Read content files");
    Ok(files)
}

/// Parse the date formats found in front matter and feeds.
///
/// RFC 3339 timestamps keep their offset. Timestamps without an offset and
/// bare dates are taken to be UTC, bare dates at midnight.
pub(crate) fn parse_date(raw: &str) -> Result<OffsetDateTime> {
    let raw = raw.trim();
    if let Ok(date) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Ok(date);
    }
    let without_offset: [&[BorrowedFormatItem<'_>]; 3] = [
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
        format_description!("[year]-[month]-[day] [hour]:[minute]"),
    ];
    for format in without_offset {
        if let Ok(date) = PrimitiveDateTime::parse(raw, format) {
            return Ok(date.assume_utc());
        }
    }
    match Date::parse(raw, format_description!("[year]-[month]-[day]")) {
        Ok(date) => Ok(date.midnight().assume_utc()),
        Err(_) => exn::bail!(ErrorKind::InvalidDate(raw.to_string())),
    }
}

/// Unix timestamps come as numbers or as strings of digits, depending on the
/// API (and sometimes on the endpoint).
pub(crate) fn parse_unix(raw: &serde_json::Value) -> Result<OffsetDateTime> {
    let seconds = match raw {
        serde_json::Value::Number(number) => number.as_i64(),
        serde_json::Value::String(string) => string.trim().parse().ok(),
        _ => None,
    };
    let Some(seconds) = seconds else {
        exn::bail!(ErrorKind::InvalidDate(raw.to_string()));
    };
    OffsetDateTime::from_unix_timestamp(seconds).or_raise(|| ErrorKind::InvalidDate(raw.to_string()))
}
