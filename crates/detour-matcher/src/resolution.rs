use detour_core::pattern::{substitute, Captures};
use detour_core::{Mapping, MatchKind, Redirect};
use serde::Serialize;

/// What the dispatch layer should answer for a matched request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Disposition {
    Redirect { location: String, status: u16 },
    Error { status: u16 },
}

impl Disposition {
    /// The redirect location, if this is a redirect.
    pub fn location(&self) -> Option<&str> {
        match self {
            Disposition::Redirect { location, .. } => Some(location),
            Disposition::Error { .. } => None,
        }
    }

    pub fn status(&self) -> u16 {
        match self {
            Disposition::Redirect { status, .. } | Disposition::Error { status } => *status,
        }
    }
}

/// The winning mapping for a request path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub mapping: Mapping,
    /// Values captured by a pattern mapping.
    pub captures: Captures,
    /// The part of the request path below a prefix mapping's source, with
    /// its leading slash; empty for other match kinds.
    pub remainder: String,
}

impl Resolution {
    pub fn new(mapping: Mapping) -> Self {
        Self {
            mapping,
            captures: Captures::new(),
            remainder: String::new(),
        }
    }

    pub fn with_captures(mut self, captures: Captures) -> Self {
        self.captures = captures;
        self
    }

    pub fn with_remainder(mut self, remainder: impl Into<String>) -> Self {
        self.remainder = remainder.into();
        self
    }

    /// Builds the response for this match.
    ///
    /// Prefix mappings carry the unmatched remainder over to the target, and
    /// pattern captures are substituted into link targets.
    pub fn disposition(&self) -> Disposition {
        let status = self.mapping.response_code;

        let target = match &self.mapping.redirect {
            Redirect::ToError { status } => return Disposition::Error { status: *status },
            Redirect::ToPage { path, .. } => path.to_string(),
            Redirect::ToLink { link } => substitute(link, &self.captures),
        };

        let location = if self.mapping.match_kind == MatchKind::Prefix {
            append_remainder(&target, &self.remainder)
        } else {
            target
        };

        Disposition::Redirect { location, status }
    }
}

/// Inserts `remainder` at the end of the path part of `target`, before any
/// query string or fragment.
fn append_remainder(target: &str, remainder: &str) -> String {
    if remainder.is_empty() {
        return target.to_string();
    }

    let split = target.find(|c| matches!(c, '?' | '#')).unwrap_or(target.len());
    let (path, suffix) = target.split_at(split);
    format!("{}{}{}", path.trim_end_matches('/'), remainder, suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use detour_core::{NodeId, SourcePath};

    fn path(s: &str) -> SourcePath {
        SourcePath::new(s).unwrap()
    }

    #[test]
    fn page_redirect_uses_cached_path() {
        let mapping = Mapping::new(1, path("/old"), Redirect::page(NodeId::new(2), path("/new")));
        assert_eq!(
            Resolution::new(mapping).disposition(),
            Disposition::Redirect {
                location: "/new".to_string(),
                status: 301
            }
        );
    }

    #[test]
    fn error_redirect_uses_error_status() {
        let mapping = Mapping::new(1, path("/old"), Redirect::error(410));
        let disposition = Resolution::new(mapping).disposition();
        assert_eq!(disposition, Disposition::Error { status: 410 });
        assert_eq!(disposition.location(), None);
    }

    #[test]
    fn prefix_redirect_appends_remainder_before_query() {
        let mapping = Mapping::new(1, path("/docs"), Redirect::link("https://docs.example.com/v2/?ref=old"))
            .with_match_kind(MatchKind::Prefix)
            .with_response_code(302);
        let disposition = Resolution::new(mapping)
            .with_remainder("/guide/intro")
            .disposition();
        assert_eq!(
            disposition,
            Disposition::Redirect {
                location: "https://docs.example.com/v2/guide/intro?ref=old".to_string(),
                status: 302
            }
        );
    }

    #[test]
    fn prefix_redirect_to_root_page() {
        let mapping = Mapping::new(1, path("/legacy"), Redirect::page(NodeId::new(1), SourcePath::root()))
            .with_match_kind(MatchKind::Prefix);
        let disposition = Resolution::new(mapping).with_remainder("/a").disposition();
        assert_eq!(disposition.location(), Some("/a"));
    }

    #[test]
    fn pattern_captures_are_substituted() {
        let mapping = Mapping::new(1, path("/blog/:year/:slug"), Redirect::link("/posts/:slug?y=:year"))
            .with_match_kind(MatchKind::Pattern);
        let disposition = Resolution::new(mapping)
            .with_captures(vec![
                ("year".to_string(), "2020".to_string()),
                ("slug".to_string(), "hello".to_string()),
            ])
            .disposition();
        assert_eq!(disposition.location(), Some("/posts/hello?y=2020"));
    }
}
