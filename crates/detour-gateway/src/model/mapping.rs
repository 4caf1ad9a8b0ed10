use detour_core::{Mapping, MappingId, MatchKind, NodeId};
use serde::{Deserialize, Serialize};

/// Body of `POST /v1/mappings` and `PUT /v1/mappings/{id}`.
#[derive(Debug, Deserialize)]
pub struct MappingRequest {
    pub source: String,
    #[serde(default)]
    pub match_kind: MatchKind,
    pub redirect: RedirectRequest,
    pub priority: Option<i32>,
    pub response_code: Option<u16>,
    pub owner: Option<NodeId>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RedirectRequest {
    /// `path` defaults to the page's current path in the content mirror.
    Page { page: NodeId, path: Option<String> },
    Link { link: String },
    Error { status: u16 },
}

#[derive(Debug, Default, Deserialize)]
pub struct WriteQuery {
    /// Replace conflicting canonical mappings instead of failing.
    #[serde(default)]
    pub replace: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListMappingsQuery {
    pub page: Option<NodeId>,
    pub source: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MappingResponse {
    pub mapping: Mapping,
    pub created: bool,
    pub replaced: Vec<MappingId>,
}
