use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;
use typed_builder::TypedBuilder;

/// How a trailing slash on an incoming path is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrailingSlash {
    /// `/a/b/` and `/a/b` are the same path.
    #[default]
    Strip,
    /// `/a/b/` and `/a/b` are distinct paths.
    Keep,
}

/// Normalization rules applied to every source and request path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TypedBuilder, Serialize, Deserialize)]
pub struct PathPolicy {
    /// When `false`, paths are lower-cased before they are stored or matched.
    #[builder(default = false)]
    pub case_sensitive: bool,
    #[builder(default)]
    pub trailing_slash: TrailingSlash,
}

impl Default for PathPolicy {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// A normalized request path.
///
/// A `SourcePath` never carries a scheme, host, query string or fragment,
/// always starts with `/` and never contains empty segments. Whether a
/// trailing slash survives and whether the path is lower-cased depends on
/// the [`PathPolicy`] it was parsed with.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourcePath(String);

impl SourcePath {
    /// Parses and normalizes `raw` using the default [`PathPolicy`].
    pub fn new(raw: &str) -> Result<Self, CoreError> {
        Self::parse(raw, &PathPolicy::default())
    }

    /// Parses and normalizes `raw` using the given policy.
    ///
    /// Accepts absolute URLs (`https://example.com/a?b`), protocol-relative
    /// URLs (`//example.com/a`) and plain paths (`a/b`, `/a//b/`).
    pub fn parse(raw: &str, policy: &PathPolicy) -> Result<Self, CoreError> {
        let raw = raw.trim();

        if let Some(c) = raw.chars().find(|c| c.is_control() || c.is_whitespace()) {
            return Err(CoreError::InvalidPath(format!(
                "path '{}' contains forbidden character {:?}",
                raw, c
            )));
        }

        let path = strip_origin(raw);
        let path = path
            .split(|c| matches!(c, '?' | '#'))
            .next()
            .unwrap_or_default();
        let trailing = path.ends_with('/');

        let mut normalized = String::with_capacity(path.len() + 1);
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            normalized.push('/');
            normalized.push_str(segment);
        }

        if normalized.is_empty() {
            normalized.push('/');
        } else if trailing && policy.trailing_slash == TrailingSlash::Keep {
            normalized.push('/');
        }

        if !policy.case_sensitive {
            normalized = normalized.to_lowercase();
        }

        Ok(Self(normalized))
    }

    /// Creates a `SourcePath` without normalization.
    ///
    /// Use this only for values that were normalized before, e.g. rows read
    /// back from a store.
    pub fn new_unchecked(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// The site root, `/`.
    pub fn root() -> Self {
        Self("/".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    pub fn has_trailing_slash(&self) -> bool {
        !self.is_root() && self.0.ends_with('/')
    }

    /// Iterates over the non-empty segments of the path.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|s| !s.is_empty())
    }

    /// Appends a path segment and normalizes the result with `policy`.
    pub fn join(&self, segment: &str, policy: &PathPolicy) -> Result<Self, CoreError> {
        let joined = format!("{}/{}", self.trimmed(), segment);
        Self::parse(&joined, policy)
    }

    /// Returns `true` if `prefix` is this path or one of its ancestors.
    ///
    /// Matching happens on segment boundaries: `/ab` does not start with `/a`.
    pub fn starts_with(&self, prefix: &SourcePath) -> bool {
        self.strip_prefix(prefix).is_some()
    }

    /// Returns the part of this path below `prefix`, with its leading slash.
    ///
    /// Returns an empty string when both paths are equal and `None` when
    /// `prefix` is not an ancestor.
    pub fn strip_prefix(&self, prefix: &SourcePath) -> Option<&str> {
        let own = self.trimmed();
        let base = prefix.trimmed();

        if base.is_empty() {
            return Some(own);
        }

        let rest = own.strip_prefix(base)?;
        if rest.is_empty() || rest.starts_with('/') {
            Some(rest)
        } else {
            None
        }
    }

    /// Moves this path from below `from` to below `to`.
    ///
    /// Returns `None` when the path is not below `from`.
    pub fn rebase(&self, from: &SourcePath, to: &SourcePath) -> Option<SourcePath> {
        let rest = self.strip_prefix(from)?;
        let mut rebased = format!("{}{}", to.trimmed(), rest);
        if rebased.is_empty() {
            rebased.push('/');
        } else if self.has_trailing_slash() && !rest.is_empty() {
            rebased.push('/');
        }
        Some(Self(rebased))
    }

    /// Returns this path followed by every ancestor, ending with the root.
    pub fn ancestors(&self) -> Vec<SourcePath> {
        let mut out = vec![self.clone()];
        let mut current = self.trimmed();

        while let Some(idx) = current.rfind('/') {
            current = &current[..idx];
            let ancestor = if current.is_empty() {
                Self::root()
            } else {
                Self(current.to_string())
            };
            if out.last() != Some(&ancestor) {
                out.push(ancestor);
            }
        }

        out
    }

    /// The path without its trailing slash; the root becomes `""`.
    fn trimmed(&self) -> &str {
        self.0.trim_end_matches('/')
    }
}

/// Removes `scheme://host` or `//host` from the front of a URL.
fn strip_origin(raw: &str) -> &str {
    let after_origin = match raw.find("://") {
        Some(idx)
            if idx > 0
                && raw[..idx]
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.')) =>
        {
            &raw[idx + 3..]
        }
        _ => match raw.strip_prefix("//") {
            Some(rest) => rest,
            None => return raw,
        },
    };

    match after_origin.find(|c| matches!(c, '/' | '?' | '#')) {
        Some(idx) => &after_origin[idx..],
        None => "",
    }
}

impl Display for SourcePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SourcePath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for SourcePath {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(s: &str) -> SourcePath {
        SourcePath::new(s).unwrap()
    }

    fn keep_case_and_slash() -> PathPolicy {
        PathPolicy::builder()
            .case_sensitive(true)
            .trailing_slash(TrailingSlash::Keep)
            .build()
    }

    #[test]
    fn strips_scheme_host_query_and_fragment() {
        assert_eq!(path("https://example.com/About/Team?x=1#top").as_str(), "/about/team");
        assert_eq!(path("//cdn.example.com/a").as_str(), "/a");
        assert_eq!(path("http://example.com").as_str(), "/");
        assert_eq!(path("http://example.com?x=1").as_str(), "/");
    }

    #[test]
    fn collapses_slashes_and_adds_leading_slash() {
        assert_eq!(path("a//b///c").as_str(), "/a/b/c");
        assert_eq!(path("").as_str(), "/");
        assert_eq!(path("///").as_str(), "/");
    }

    #[test]
    fn trailing_slash_policy() {
        assert_eq!(path("/a/b/").as_str(), "/a/b");

        let policy = keep_case_and_slash();
        assert_eq!(SourcePath::parse("/a/b/", &policy).unwrap().as_str(), "/a/b/");
        assert_eq!(SourcePath::parse("/", &policy).unwrap().as_str(), "/");
    }

    #[test]
    fn case_policy() {
        assert_eq!(path("/Hello/World").as_str(), "/hello/world");
        let policy = keep_case_and_slash();
        assert_eq!(
            SourcePath::parse("/Hello/World", &policy).unwrap().as_str(),
            "/Hello/World"
        );
    }

    #[test]
    fn rejects_whitespace_and_control_characters() {
        assert!(SourcePath::new("/a b").is_err());
        assert!(SourcePath::new("/a\u{0007}b").is_err());
        // Surrounding whitespace is trimmed rather than rejected.
        assert_eq!(path("  /a  ").as_str(), "/a");
    }

    #[test]
    fn relative_url_with_colon_is_a_path() {
        assert_eq!(path("/a/b:c").as_str(), "/a/b:c");
    }

    #[test]
    fn join_segments() {
        let policy = PathPolicy::default();
        assert_eq!(SourcePath::root().join("a", &policy).unwrap().as_str(), "/a");
        assert_eq!(path("/a").join("B", &policy).unwrap().as_str(), "/a/b");
        assert_eq!(path("/a").join("/b/", &policy).unwrap().as_str(), "/a/b");
    }

    #[test]
    fn starts_with_respects_segment_boundaries() {
        assert!(path("/a/b").starts_with(&path("/a")));
        assert!(path("/a").starts_with(&path("/a")));
        assert!(path("/a").starts_with(&SourcePath::root()));
        assert!(!path("/ab").starts_with(&path("/a")));
        assert!(!path("/a").starts_with(&path("/a/b")));
    }

    #[test]
    fn strip_prefix_returns_remainder() {
        assert_eq!(path("/a/b/c").strip_prefix(&path("/a")), Some("/b/c"));
        assert_eq!(path("/a").strip_prefix(&path("/a")), Some(""));
        assert_eq!(path("/a/b").strip_prefix(&SourcePath::root()), Some("/a/b"));
        assert_eq!(path("/x").strip_prefix(&path("/a")), None);
    }

    #[test]
    fn rebase_moves_subtree() {
        assert_eq!(
            path("/a/b/c").rebase(&path("/a/b"), &path("/a/x")),
            Some(path("/a/x/c"))
        );
        assert_eq!(path("/a/b").rebase(&path("/a/b"), &path("/a/x")), Some(path("/a/x")));
        assert_eq!(path("/a/b").rebase(&path("/a/b"), &SourcePath::root()), Some(SourcePath::root()));
        assert_eq!(path("/q").rebase(&path("/a/b"), &path("/a/x")), None);
    }

    #[test]
    fn ancestors_end_at_root() {
        let ancestors = path("/a/b/c").ancestors();
        let ancestors: Vec<&str> = ancestors.iter().map(SourcePath::as_str).collect();
        assert_eq!(ancestors, vec!["/a/b/c", "/a/b", "/a", "/"]);
        assert_eq!(SourcePath::root().ancestors(), vec![SourcePath::root()]);
    }

    #[test]
    fn serde_is_transparent() {
        let json = serde_json::to_string(&path("/a/b")).unwrap();
        assert_eq!(json, "\"/a/b\"");
        let back: SourcePath = serde_json::from_str(&json).unwrap();
        assert_eq!(back, path("/a/b"));
    }
}
