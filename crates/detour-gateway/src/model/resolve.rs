use detour_core::NodeId;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct ResolveQuery {
    pub path: String,
    pub max_hops: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PropagationQuery {
    pub limit: Option<usize>,
    pub node: Option<NodeId>,
}
