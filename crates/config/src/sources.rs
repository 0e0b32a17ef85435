use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// What a loader does with a record it cannot parse. Records that parse
/// but cannot be built (an unreachable image, say) are always skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordPolicy {
    /// Skip (and log) the bad record, keep the rest.
    Lenient,
    /// Fail the whole source, which then falls back to previous data.
    Strict,
}

fn strict() -> RecordPolicy {
    RecordPolicy::Strict
}

fn lenient() -> RecordPolicy {
    RecordPolicy::Lenient
}

/// One optional block per source. A source without a block is not loaded
/// and keeps whatever the previous snapshot had.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sources {
    #[serde(default)]
    pub blog_posts: Option<LocalSource>,
    #[serde(default)]
    pub micro_posts: Option<LocalSource>,
    #[serde(default)]
    pub albums: Option<LocalSource>,
    #[serde(default)]
    pub micro_blog_archive: Option<ArchiveSource>,
    #[serde(default)]
    pub mastodon: Option<MastodonSource>,
    #[serde(default)]
    pub status_lol: Option<StatusLolSource>,
    #[serde(default)]
    pub lego: Option<LegoSource>,
    #[serde(default)]
    pub games: Option<GamesSource>,
    #[serde(default)]
    pub pages: Option<PagesSource>,
}
impl Default for Sources {
    fn default() -> Self {
        Self {
            blog_posts: Some(LocalSource::new("blog")),
            micro_posts: Some(LocalSource::new("micros")),
            albums: Some(LocalSource::new("albums")),
            micro_blog_archive: None,
            mastodon: None,
            status_lol: None,
            lego: None,
            games: None,
            pages: None,
        }
    }
}

/// Files authored by hand under the content directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalSource {
    /// Relative to `paths.content`.
    pub dir: PathBuf,
    #[serde(default = "strict")]
    pub policy: RecordPolicy,
}
impl LocalSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            policy: strict(),
        }
    }
}

/// A JSON feed exported from a retired blog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveSource {
    /// Relative to `paths.content`.
    pub file: PathBuf,
    /// Items carrying any of these tags are dropped.
    #[serde(default)]
    pub skip_tags: Vec<String>,
    #[serde(default = "lenient")]
    pub policy: RecordPolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MastodonSource {
    /// Base URL of the instance, e.g. `https://social.lol`.
    pub instance: String,
    pub account_id: String,
    /// Posts made through these applications are cross-posts from other
    /// sources and get skipped.
    #[serde(default)]
    pub exclude_applications: Vec<String>,
    #[serde(default = "lenient")]
    pub policy: RecordPolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusLolSource {
    pub address: String,
    #[serde(default = "lenient")]
    pub policy: RecordPolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegoSource {
    pub api_key: String,
    pub username: String,
    pub password: String,
    #[serde(default = "lenient")]
    pub policy: RecordPolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GamesSource {
    pub api_key: String,
    pub steam_id: String,
    #[serde(default = "lenient")]
    pub policy: RecordPolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PagesSource {
    pub address: String,
    /// Page name to paste name.
    #[serde(default = "default_pastes")]
    pub pastes: BTreeMap<String, String>,
}

fn default_pastes() -> BTreeMap<String, String> {
    ["about", "faq", "now"].into_iter().map(|name| (name.to_string(), format!("web-{name}.txt"))).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Figment;
    use figment::providers::{Format, Yaml};
    use rstest::rstest;

    #[test]
    fn test_local_sources_default_to_strict() {
        let sources = Sources::default();
        assert_eq!(sources.blog_posts.map(|s| s.policy), Some(RecordPolicy::Strict));
        assert_eq!(sources.albums.map(|s| s.dir), Some(PathBuf::from("albums")));
        assert!(sources.mastodon.is_none());
    }

    #[rstest]
    #[case("{instance: 'https://social.lol', account_id: '1'}", RecordPolicy::Lenient)]
    #[case("{instance: 'https://social.lol', account_id: '1', policy: strict}", RecordPolicy::Strict)]
    fn test_feed_policy(#[case] yaml: &str, #[case] expected: RecordPolicy) {
        let source: MastodonSource = Figment::from(Yaml::string(yaml)).extract().unwrap();
        assert_eq!(source.policy, expected);
    }

    #[test]
    fn test_default_pastes() {
        let pastes = default_pastes();
        assert_eq!(pastes["now"], "web-now.txt");
        assert_eq!(pastes.len(), 3);
    }
}
