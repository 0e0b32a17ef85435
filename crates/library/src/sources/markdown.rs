//! Markdown files with YAML front matter.

use super::LocalFile;
use super::patterns::{MARKDOWN_IMAGE_REGEX, MARKDOWN_LINK_REGEX};
use crate::load::error::{ErrorKind, Result};
use exn::{OptionExt, ResultExt};
use serde::de::DeserializeOwned;

/// Split a file into its deserialized front matter and its body.
pub(crate) fn parse<T: DeserializeOwned>(file: &LocalFile) -> Result<(T, &str)> {
    let text = file.text()?;
    let (yaml, body) = split(text)
        .ok_or_raise(|| ErrorKind::InvalidRecord(format!("{} has no front matter", file.path.display())))?;
    let front_matter = serde_yaml::from_str(yaml)
        .or_raise(|| ErrorKind::InvalidRecord(format!("{} has invalid front matter", file.path.display())))?;
    Ok((front_matter, body))
}

/// Front matter is everything between a leading `---` line and the next one.
fn split(text: &str) -> Option<(&str, &str)> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let rest = text.strip_prefix("---")?;
    let rest = rest.strip_prefix("\r\n").or_else(|| rest.strip_prefix('\n'))?;
    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == "---" {
            let body = &rest[offset + line.len()..];
            return Some((&rest[..offset], body.trim_start_matches(['\r', '\n'])));
        }
        offset += line.len();
    }
    None
}

/// Every `![alt](src)` in the body, in order, as `(alt, src)`.
pub(crate) fn images(body: &str) -> Vec<(&str, &str)> {
    MARKDOWN_IMAGE_REGEX
        .captures_iter(body)
        .filter_map(|captures| Some((captures.get(1)?.as_str(), captures.get(2)?.as_str())))
        .collect()
}

/// The first non-blank line, with links and images flattened to their text.
pub(crate) fn description(body: &str) -> String {
    let line = body.lines().map(str::trim).find(|line| !line.is_empty()).unwrap_or_default();
    MARKDOWN_LINK_REGEX.replace_all(line, "$1").trim().to_string()
}
