use regex::{Captures, Regex};
use sha2::{Digest, Sha256};

/// A url pattern that only accepts full-string matches.
///
/// The pattern is wrapped as `^(?:pattern)$` at construction, so
/// `foo\.com/.*` matches `foo.com/x` but not `www.bar.com/?u=foo.com/x`.
#[derive(Debug, Clone)]
pub struct UrlPattern {
    regex: Regex,
}

impl UrlPattern {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Regex::new(&format!("^(?:{pattern})$")).map(|regex| Self { regex })
    }

    pub fn matches(&self, url: &str) -> bool {
        self.regex.is_match(url)
    }

    pub fn captures<'h>(&self, url: &'h str) -> Option<Captures<'h>> {
        self.regex.captures(url)
    }

    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }
}

/// Stable id derived from a url, for sources that carry no id of their own.
pub fn url_hash_id(url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    hex::encode(&digest[..8])
}

/// First capture group of `regex` in `content`.
pub fn search_regex(content: &str, regex: &Regex) -> Option<String> {
    regex
        .captures(content)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// All first capture groups of `regex` in `content`, in document order.
pub fn search_all(content: &str, regex: &Regex) -> Vec<String> {
    regex
        .captures_iter(content)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Content of `<meta property="{property}" content="...">`.
pub fn og_property(content: &str, property: &str) -> Option<String> {
    let pattern = format!(
        r#"<meta\s+property="{}"\s+content="([^"]+)""#,
        regex::escape(property)
    );
    Regex::new(&pattern)
        .ok()
        .and_then(|regex| search_regex(content, &regex))
}

/// Undo the `\/` escaping JSON embedded in html usually carries.
pub fn unescape_url(url: &str) -> String {
    url.replace("\\/", "/").replace("\\u0026", "&")
}
