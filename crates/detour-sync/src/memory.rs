use std::collections::HashSet;

use async_trait::async_trait;
use dashmap::DashMap;
use detour_core::hierarchy::Result;
use detour_core::{
    ContentHierarchy, ContentNode, NodeId, NodeState, PathPolicy, ProviderError, SourcePath, Stage,
};
use tracing::trace;

/// A [`ContentHierarchy`] kept in memory.
///
/// Used by tests and as the gateway's mirror of an external content tree.
/// Paths are built from the segments of a node and its ancestors; a node has
/// a path in a stage only if it and every ancestor exist in that stage.
#[derive(Debug, Default)]
pub struct InMemoryHierarchy {
    nodes: DashMap<NodeId, ContentNode>,
    policy: PathPolicy,
}

impl InMemoryHierarchy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: PathPolicy) -> Self {
        Self {
            nodes: DashMap::new(),
            policy,
        }
    }

    /// Adds a live node, returning it for chaining in tests.
    pub fn add(&self, id: u64, parent: Option<u64>, segment: &str) -> NodeId {
        let id = NodeId::new(id);
        self.upsert(ContentNode {
            id,
            parent: parent.map(NodeId::new),
            segment: segment.to_string(),
            state: NodeState::live(),
        });
        id
    }

    /// Inserts or replaces a node.
    pub fn upsert(&self, node: ContentNode) {
        trace!(node = %node.id, segment = %node.segment, "mirroring content node");
        self.nodes.insert(node.id, node);
    }

    /// Moves a node under another parent and/or renames it.
    pub fn relocate(&self, id: NodeId, parent: Option<NodeId>, segment: &str) -> bool {
        match self.nodes.get_mut(&id) {
            Some(mut node) => {
                node.parent = parent;
                node.segment = segment.to_string();
                true
            }
            None => false,
        }
    }

    pub fn set_state(&self, id: NodeId, state: NodeState) -> bool {
        match self.nodes.get_mut(&id) {
            Some(mut node) => {
                node.state = state;
                true
            }
            None => false,
        }
    }

    /// Forgets a node entirely; the provider then reports it as not found.
    pub fn forget(&self, id: NodeId) -> Option<ContentNode> {
        self.nodes.remove(&id).map(|(_, node)| node)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn node(&self, id: NodeId) -> Result<ContentNode> {
        self.nodes
            .get(&id)
            .map(|node| node.clone())
            .ok_or(ProviderError::NotFound(id))
    }

    fn exists_in(state: &NodeState, stage: Stage) -> bool {
        match stage {
            Stage::Live => state.published,
            Stage::Draft => state.on_draft,
        }
    }
}

#[async_trait]
impl ContentHierarchy for InMemoryHierarchy {
    async fn get_node(&self, id: NodeId) -> Result<Option<ContentNode>> {
        Ok(self.nodes.get(&id).map(|node| node.clone()))
    }

    async fn get_children(&self, id: NodeId, include_deleted: bool) -> Result<Vec<ContentNode>> {
        self.node(id)?;

        let mut children: Vec<ContentNode> = self
            .nodes
            .iter()
            .filter(|entry| entry.parent == Some(id))
            .filter(|entry| include_deleted || !entry.state.is_permanently_removed())
            .map(|entry| entry.value().clone())
            .collect();
        children.sort_by_key(|node| node.id);
        Ok(children)
    }

    async fn get_parent(&self, id: NodeId) -> Result<Option<ContentNode>> {
        match self.node(id)?.parent {
            Some(parent) => Ok(Some(self.node(parent)?)),
            None => Ok(None),
        }
    }

    async fn full_path_as_of(&self, id: NodeId, stage: Stage) -> Result<Option<SourcePath>> {
        let mut segments = Vec::new();
        let mut seen = HashSet::new();
        let mut current = Some(self.node(id)?);

        while let Some(node) = current {
            if !seen.insert(node.id) {
                return Err(ProviderError::Failed(format!(
                    "{} is its own ancestor",
                    node.id
                )));
            }
            if !Self::exists_in(&node.state, stage) {
                return Ok(None);
            }
            segments.push(node.segment.clone());
            current = match node.parent {
                Some(parent) => match self.nodes.get(&parent) {
                    Some(parent) => Some(parent.clone()),
                    None => return Ok(None),
                },
                None => None,
            };
        }

        segments.reverse();
        let raw = format!("/{}", segments.join("/"));
        SourcePath::parse(&raw, &self.policy)
            .map(Some)
            .map_err(|err| ProviderError::Failed(err.to_string()))
    }
}
