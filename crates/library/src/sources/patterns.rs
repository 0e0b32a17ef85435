use regex::Regex;
use std::sync::LazyLock;

macro_rules! regex {
    ($name:ident, $regex:expr) => {
        pub(crate) static $name: LazyLock<Regex> = LazyLock::new(|| Regex::new($regex).unwrap());
    };
}

// Markdown image, with an optional title: ![alt](src "title")
regex!(MARKDOWN_IMAGE_REGEX, r#"!\[([^\]]*)\]\(\s*([^)\s]+)(?:\s+"[^"]*")?\s*\)"#);
// Markdown link or image, for flattening to plain text.
regex!(MARKDOWN_LINK_REGEX, r"!?\[([^\]]*)\]\([^)]*\)");
regex!(HTML_IMAGE_REGEX, r"(?is)<img\s[^>]*>");
regex!(HTML_ATTRIBUTE_REGEX, r#"(?i)([a-z][a-z0-9-]*)\s*=\s*"([^"]*)""#);
