//! Layered configuration for almanac.
//!
//! Values are merged, lowest priority first, from the built-in defaults, a
//! config file (TOML, YAML or JSON) and `ALMANAC_` environment variables,
//! where `__` separates nested keys: `ALMANAC_MEDIA__CONCURRENCY=4`.

pub mod error;
mod sources;

pub use crate::sources::{
    ArchiveSource, GamesSource, LegoSource, LocalSource, MastodonSource, PagesSource, RecordPolicy, Sources,
    StatusLolSource,
};
use crate::error::{ErrorKind, Result};
use almanac_model::Orientation;
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

const ENV_PREFIX: &str = "ALMANAC_";
const FILE_STEM: &str = "almanac";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub paths: Paths,
    pub publish: Publish,
    /// Prefix of every published variant's public URL.
    pub public_base_url: String,
    pub media: Media,
    pub tags: TagsConfig,
    pub http: Http,
    pub sources: Sources,
}
impl Default for Config {
    fn default() -> Self {
        Self {
            paths: Paths::default(),
            publish: Publish::default(),
            public_base_url: "/media".to_string(),
            media: Media::default(),
            tags: TagsConfig::default(),
            http: Http::default(),
            sources: Sources::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paths {
    /// Markdown, album YAML and the archive file.
    pub content: PathBuf,
    /// Downloaded originals and derived variants. Never cleaned.
    pub cache: PathBuf,
    /// Snapshot and index documents.
    pub output: PathBuf,
}
impl Default for Paths {
    fn default() -> Self {
        Self {
            content: PathBuf::from("content"),
            cache: PathBuf::from(".cache"),
            output: PathBuf::from("output"),
        }
    }
}

/// Where derived images get published.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Publish {
    Local {
        path: PathBuf,
    },
    S3 {
        bucket: String,
        #[serde(default)]
        prefix: Option<String>,
        region: String,
        #[serde(default)]
        endpoint: Option<String>,
        key_id: String,
        key_secret: String,
        #[serde(default)]
        public_read: bool,
    },
}
impl Default for Publish {
    fn default() -> Self {
        Self::Local {
            path: PathBuf::from("public/media"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Media {
    /// Relative image sources (e.g. in markdown) are joined onto this.
    #[serde(default)]
    pub source_base_url: Option<String>,
    /// Maximum number of images resolved at once, across all sources.
    pub concurrency: usize,
    pub variants: BTreeMap<String, VariantSize>,
}
impl Default for Media {
    fn default() -> Self {
        Self {
            source_base_url: None,
            concurrency: 8,
            variants: BTreeMap::from([
                ("large".to_string(), VariantSize::new(2400, 1200, 1600)),
                ("small".to_string(), VariantSize::new(1000, 500, 700)),
            ]),
        }
    }
}

/// Target widths of a variant, per orientation of the original.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantSize {
    pub landscape: u32,
    pub portrait: u32,
    pub square: u32,
    #[serde(default = "default_quality")]
    pub quality: u8,
}
impl VariantSize {
    pub fn new(landscape: u32, portrait: u32, square: u32) -> Self {
        Self {
            landscape,
            portrait,
            square,
            quality: default_quality(),
        }
    }

    pub fn width(&self, orientation: Orientation) -> u32 {
        match orientation {
            Orientation::Landscape => self.landscape,
            Orientation::Portrait => self.portrait,
            Orientation::Square => self.square,
        }
    }
}

fn default_quality() -> u8 {
    80
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TagsConfig {
    /// Tags dropped from every entity (matched after normalization).
    #[serde(default)]
    pub deny: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Http {
    pub user_agent: String,
    pub timeout_secs: u64,
}
impl Default for Http {
    fn default() -> Self {
        Self {
            user_agent: concat!("almanac/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout_secs: 30,
        }
    }
}

impl Config {
    /// Build the layered [`Figment`] without extracting it.
    ///
    /// An explicit `path` must exist. Without one, `almanac.toml`,
    /// `almanac.yaml` and `almanac.yml` in the platform config directory
    /// are merged if they exist.
    pub fn figment(path: Option<&Path>) -> Result<Figment> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        match path {
            Some(path) => {
                if !path.is_file() {
                    exn::bail!(ErrorKind::NotFound(path.to_path_buf()));
                }
                figment = merge_file(figment, path)?;
            },
            None => {
                for path in default_paths() {
                    if path.is_file() {
                        tracing::debug!(path = %path.display(), "Using default configuration file");
                        figment = merge_file(figment, &path)?;
                    }
                }
            },
        }
        Ok(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    /// Load, resolve relative paths against the current directory and
    /// validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let base = std::env::current_dir().or_raise(|| ErrorKind::Extract)?;
        Self::from_figment(Self::figment(path)?, &base)
    }

    pub fn from_figment(figment: Figment, base: &Path) -> Result<Self> {
        let mut config: Self = figment.extract().or_raise(|| ErrorKind::Extract)?;
        config.resolve_paths(base);
        config.validate()?;
        Ok(config)
    }

    /// Make every relative path absolute, relative to `base`.
    pub fn resolve_paths(&mut self, base: &Path) {
        let resolve = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        };
        resolve(&mut self.paths.content);
        resolve(&mut self.paths.cache);
        resolve(&mut self.paths.output);
        if let Publish::Local { path } = &mut self.publish {
            resolve(path);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.media.concurrency == 0 {
            exn::bail!(ErrorKind::Invalid("media.concurrency must be > 0".to_string()));
        }
        if self.media.variants.is_empty() {
            exn::bail!(ErrorKind::Invalid("media.variants must not be empty".to_string()));
        }
        for (name, size) in &self.media.variants {
            if size.landscape == 0 || size.portrait == 0 || size.square == 0 {
                exn::bail!(ErrorKind::Invalid(format!("media.variants.{name}: widths must be > 0")));
            }
            if !(1..=100).contains(&size.quality) {
                exn::bail!(ErrorKind::Invalid(format!("media.variants.{name}.quality must be within 1..=100")));
            }
        }
        if self.http.timeout_secs == 0 {
            exn::bail!(ErrorKind::Invalid("http.timeout_secs must be > 0".to_string()));
        }
        Ok(())
    }
}

fn merge_file(figment: Figment, path: &Path) -> Result<Figment> {
    let extension = path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase);
    Ok(match extension.as_deref() {
        Some("toml") => figment.merge(Toml::file_exact(path)),
        Some("yaml" | "yml") => figment.merge(Yaml::file_exact(path)),
        Some("json") => figment.merge(Json::file_exact(path)),
        _ => exn::bail!(ErrorKind::UnsupportedFormat(path.to_path_buf())),
    })
}

fn default_paths() -> Vec<PathBuf> {
    let Some(dirs) = ProjectDirs::from("", "", "almanac") else {
        return Vec::new();
    };
    ["toml", "yaml", "yml"].iter().map(|ext| dirs.config_dir().join(format!("{FILE_STEM}.{ext}"))).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use rstest::rstest;

    fn extract(figment: Figment) -> Result<Config> {
        Config::from_figment(figment, Path::new("/srv/site"))
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = extract(Figment::from(Serialized::defaults(Config::default()))).unwrap();
        assert_eq!(config.media.concurrency, 8);
        assert_eq!(config.media.variants["large"].quality, 80);
        assert_eq!(config.paths.output, PathBuf::from("/srv/site/output"));
        assert_eq!(
            config.publish,
            Publish::Local {
                path: PathBuf::from("/srv/site/public/media")
            }
        );
    }

    #[rstest]
    #[case("almanac.toml", "[media]\nconcurrency = 3\n")]
    #[case("almanac.yaml", "media:\n  concurrency: 3\n")]
    #[case("almanac.yml", "media:\n  concurrency: 3\n")]
    #[case("almanac.json", r#"{"media": {"concurrency": 3}}"#)]
    fn test_file_formats(#[case] name: &str, #[case] contents: &str) {
        // Jail keeps environment variables from other tests out.
        Jail::expect_with(|jail| {
            jail.create_file(name, contents)?;
            let figment = Config::figment(Some(Path::new(name))).map_err(|e| e.to_string())?;
            let config = extract(figment).map_err(|e| e.to_string())?;
            assert_eq!(config.media.concurrency, 3);
            // Untouched siblings keep their defaults.
            assert_eq!(config.media.variants.len(), 2);
            Ok(())
        });
    }

    #[test]
    fn test_missing_explicit_file() {
        let err = Config::figment(Some(Path::new("/does/not/exist.toml"))).unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[test]
    fn test_unsupported_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("almanac.ini");
        std::fs::write(&path, "concurrency=3").unwrap();
        let err = Config::figment(Some(&path)).unwrap_err();
        assert!(matches!(&*err, ErrorKind::UnsupportedFormat(_)));
    }

    #[test]
    fn test_env_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "almanac.toml",
                "public_base_url = \"https://cdn.example.com\"\n[media]\nconcurrency = 3\n",
            )?;
            jail.set_env("ALMANAC_MEDIA__CONCURRENCY", "5");
            jail.set_env("ALMANAC_TAGS__DENY", "[\"status\"]");
            let figment = Config::figment(Some(Path::new("almanac.toml"))).map_err(|e| e.to_string())?;
            let config = extract(figment).map_err(|e| e.to_string())?;
            assert_eq!(config.media.concurrency, 5);
            assert_eq!(config.public_base_url, "https://cdn.example.com");
            assert_eq!(config.tags.deny, vec!["status".to_string()]);
            Ok(())
        });
    }

    #[test]
    fn test_s3_publish_target() {
        let yaml = "publish:\n  type: s3\n  bucket: media\n  region: eu-west-1\n  key_id: id\n  key_secret: secret\n";
        let config = extract(Figment::from(Serialized::defaults(Config::default())).merge(Yaml::string(yaml))).unwrap();
        let Publish::S3 { bucket, public_read, prefix, .. } = config.publish else {
            panic!("expected s3 publish target");
        };
        assert_eq!(bucket, "media");
        assert!(!public_read);
        assert_eq!(prefix, None);
    }

    #[rstest]
    #[case("media:\n  concurrency: 0\n")]
    #[case("media:\n  variants:\n    large: {landscape: 0, portrait: 10, square: 10}\n")]
    #[case("media:\n  variants:\n    large: {landscape: 10, portrait: 10, square: 10, quality: 0}\n")]
    #[case("media:\n  variants:\n    large: {landscape: 10, portrait: 10, square: 10, quality: 101}\n")]
    #[case("http:\n  timeout_secs: 0\n")]
    fn test_validation_rejects(#[case] yaml: &str) {
        let figment = Figment::from(Serialized::defaults(Config::default())).merge(Yaml::string(yaml));
        let err = extract(figment).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Invalid(_)));
    }

    #[test]
    fn test_validation_rejects_no_variants() {
        let mut config = Config::default();
        config.media.variants.clear();
        let err = config.validate().unwrap_err();
        assert!(matches!(&*err, ErrorKind::Invalid(_)));
    }

    #[rstest]
    #[case(Orientation::Landscape, 2400)]
    #[case(Orientation::Portrait, 1200)]
    #[case(Orientation::Square, 1600)]
    fn test_variant_width(#[case] orientation: Orientation, #[case] width: u32) {
        assert_eq!(Media::default().variants["large"].width(orientation), width);
    }
}
