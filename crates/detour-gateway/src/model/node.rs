use detour_core::{Mapping, NodeId};
use serde::{Deserialize, Serialize};

fn yes() -> bool {
    true
}

/// A content node as mirrored from the external hierarchy.
#[derive(Debug, Deserialize)]
pub struct NodeRequest {
    pub parent: Option<NodeId>,
    pub segment: String,
    #[serde(default = "yes")]
    pub published: bool,
    #[serde(default = "yes")]
    pub on_draft: bool,
}

#[derive(Debug, Deserialize)]
pub struct VanityRequest {
    /// `None` or an empty string removes the vanity address.
    pub vanity: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct VanityResponse {
    pub mapping: Option<Mapping>,
}
