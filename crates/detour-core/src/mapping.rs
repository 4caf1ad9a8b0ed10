use crate::error::{CoreError, Result};
use crate::hierarchy::NodeId;
use crate::path::SourcePath;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Priority given to mappings created automatically when pages move.
pub const AUTOMATIC_PRIORITY: i32 = 1;
/// Priority given to vanity mappings chosen on a page.
pub const VANITY_PRIORITY: i32 = 2;
/// Redirect status used when none is given.
pub const DEFAULT_RESPONSE_CODE: u16 = 301;

const REDIRECT_CODES: [u16; 5] = [301, 302, 303, 307, 308];

/// Unique identifier of a [`Mapping`].
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct MappingId(u64);

impl MappingId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for MappingId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl Display for MappingId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// How a mapping's source path is compared with a request path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    /// The request path equals the source path.
    #[default]
    Exact,
    /// The request path equals the source path or lies below it.
    Prefix,
    /// The source path contains `:name` segments and optionally a final
    /// `*name` segment.
    Pattern,
}

impl MatchKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MatchKind::Exact => "exact",
            MatchKind::Prefix => "prefix",
            MatchKind::Pattern => "pattern",
        }
    }
}

impl std::str::FromStr for MatchKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "exact" => Ok(Self::Exact),
            "prefix" => Ok(Self::Prefix),
            "pattern" => Ok(Self::Pattern),
            other => Err(CoreError::InvalidMapping(format!(
                "unknown match kind '{}'",
                other
            ))),
        }
    }
}

/// The three kinds of redirect a mapping can perform.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedirectKind {
    ToPage,
    ToLink,
    ToError,
}

impl RedirectKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RedirectKind::ToPage => "page",
            RedirectKind::ToLink => "link",
            RedirectKind::ToError => "error",
        }
    }
}

impl std::str::FromStr for RedirectKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "page" => Ok(Self::ToPage),
            "link" => Ok(Self::ToLink),
            "error" => Ok(Self::ToError),
            other => Err(CoreError::InvalidMapping(format!(
                "unknown redirect kind '{}'",
                other
            ))),
        }
    }
}

/// Where a mapping sends matching requests.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Redirect {
    /// A content page, together with the page's last known resolved path.
    ToPage { page: NodeId, path: SourcePath },
    /// An absolute or relative URL.
    ToLink { link: String },
    /// An HTTP error status.
    ToError { status: u16 },
}

impl Redirect {
    pub fn page(page: NodeId, path: SourcePath) -> Self {
        Self::ToPage { page, path }
    }

    pub fn link(link: impl Into<String>) -> Self {
        Self::ToLink { link: link.into() }
    }

    pub fn error(status: u16) -> Self {
        Self::ToError { status }
    }

    pub fn kind(&self) -> RedirectKind {
        match self {
            Redirect::ToPage { .. } => RedirectKind::ToPage,
            Redirect::ToLink { .. } => RedirectKind::ToLink,
            Redirect::ToError { .. } => RedirectKind::ToError,
        }
    }

    /// The page this redirect points at, if any.
    pub fn target_page(&self) -> Option<NodeId> {
        match self {
            Redirect::ToPage { page, .. } => Some(*page),
            _ => None,
        }
    }
}

/// Who created a mapping.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingOrigin {
    /// Created through the administrative surface.
    #[default]
    Manual,
    /// Created by the synchronizer while following content changes.
    Automatic,
    /// A vanity address chosen on a page.
    Vanity,
}

impl MappingOrigin {
    pub fn as_str(self) -> &'static str {
        match self {
            MappingOrigin::Manual => "manual",
            MappingOrigin::Automatic => "automatic",
            MappingOrigin::Vanity => "vanity",
        }
    }
}

impl std::str::FromStr for MappingOrigin {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "manual" => Ok(Self::Manual),
            "automatic" => Ok(Self::Automatic),
            "vanity" => Ok(Self::Vanity),
            other => Err(CoreError::InvalidMapping(format!(
                "unknown mapping origin '{}'",
                other
            ))),
        }
    }
}

/// A stored redirect rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mapping {
    pub id: MappingId,
    pub source: SourcePath,
    pub match_kind: MatchKind,
    pub redirect: Redirect,
    /// Higher values win.
    pub priority: i32,
    /// Redirect status used when the mapping redirects.
    pub response_code: u16,
    /// The content node this mapping belongs to, if any.
    pub owner: Option<NodeId>,
    pub origin: MappingOrigin,
    pub updated_at: Timestamp,
}

/// Identity of a canonical page mapping.
///
/// Two page mappings with the same key may not coexist.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CanonicalKey {
    pub source: SourcePath,
    pub match_kind: MatchKind,
    pub priority: i32,
}

impl Display for CanonicalKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.match_kind.as_str(),
            self.priority,
            self.source
        )
    }
}

impl Mapping {
    /// Creates a manual exact mapping with default priority and response code.
    pub fn new(id: impl Into<MappingId>, source: SourcePath, redirect: Redirect) -> Self {
        Self {
            id: id.into(),
            source,
            match_kind: MatchKind::Exact,
            redirect,
            priority: AUTOMATIC_PRIORITY,
            response_code: DEFAULT_RESPONSE_CODE,
            owner: None,
            origin: MappingOrigin::Manual,
            updated_at: Timestamp::now(),
        }
    }

    pub fn with_match_kind(mut self, match_kind: MatchKind) -> Self {
        self.match_kind = match_kind;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_response_code(mut self, response_code: u16) -> Self {
        self.response_code = response_code;
        self
    }

    pub fn with_owner(mut self, owner: NodeId) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn with_origin(mut self, origin: MappingOrigin) -> Self {
        self.origin = origin;
        self
    }

    pub fn with_updated_at(mut self, updated_at: Timestamp) -> Self {
        self.updated_at = updated_at;
        self
    }

    /// The canonical key of this mapping, for page mappings only.
    pub fn canonical_key(&self) -> Option<CanonicalKey> {
        match self.redirect {
            Redirect::ToPage { .. } => Some(CanonicalKey {
                source: self.source.clone(),
                match_kind: self.match_kind,
                priority: self.priority,
            }),
            _ => None,
        }
    }

    /// Checks the invariants that do not depend on other stored mappings.
    pub fn validate(&self) -> Result<()> {
        if !REDIRECT_CODES.contains(&self.response_code) {
            return Err(CoreError::InvalidMapping(format!(
                "response code must be one of {:?}, got {}",
                REDIRECT_CODES, self.response_code
            )));
        }

        match &self.redirect {
            Redirect::ToError { status } if !(400..=599).contains(status) => {
                return Err(CoreError::InvalidMapping(format!(
                    "error status must be between 400 and 599, got {}",
                    status
                )));
            }
            Redirect::ToLink { link } if link.trim().is_empty() => {
                return Err(CoreError::InvalidMapping(
                    "link target cannot be empty".to_string(),
                ));
            }
            _ => {}
        }

        if self.match_kind == MatchKind::Pattern {
            crate::pattern::Pattern::parse(&self.source)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(s: &str) -> SourcePath {
        SourcePath::new(s).unwrap()
    }

    #[test]
    fn only_page_mappings_are_canonical() {
        let page = Mapping::new(1, source("/a"), Redirect::page(NodeId::new(7), source("/b")));
        let link = Mapping::new(2, source("/a"), Redirect::link("https://example.com"));

        let key = page.canonical_key().unwrap();
        assert_eq!(key.to_string(), "exact:1:/a");
        assert!(link.canonical_key().is_none());
    }

    #[test]
    fn validate_rejects_bad_codes() {
        let mapping = Mapping::new(1, source("/a"), Redirect::link("/b")).with_response_code(200);
        assert!(mapping.validate().is_err());

        let mapping = Mapping::new(1, source("/a"), Redirect::error(302));
        assert!(mapping.validate().is_err());

        let mapping = Mapping::new(1, source("/a"), Redirect::error(410));
        assert!(mapping.validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_links_and_bad_patterns() {
        assert!(Mapping::new(1, source("/a"), Redirect::link("  ")).validate().is_err());

        let mapping = Mapping::new(1, source("/a/*rest/b"), Redirect::link("/x"))
            .with_match_kind(MatchKind::Pattern);
        assert!(mapping.validate().is_err());
    }

    #[test]
    fn redirect_serializes_with_type_tag() {
        let json = serde_json::to_value(Redirect::link("/x")).unwrap();
        assert_eq!(json["type"], "to_link");
        assert_eq!(json["link"], "/x");
    }
}
