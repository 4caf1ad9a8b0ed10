use crate::error::ProviderError;
use crate::path::SourcePath;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Result type for content provider calls.
pub type Result<T> = std::result::Result<T, ProviderError>;

/// Identifier of an external content node.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct NodeId(u64);

impl NodeId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for NodeId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "node:{}", self.0)
    }
}

/// Which version of a content node a question is asked about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// The published version.
    Live,
    /// The working copy.
    Draft,
}

/// Where versions of a content node still exist.
///
/// A node is only considered gone once no version is left, so deleting a
/// published page that still has a draft (or the reverse) keeps its mappings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NodeState {
    pub published: bool,
    pub on_draft: bool,
}

impl NodeState {
    pub const fn live() -> Self {
        Self {
            published: true,
            on_draft: true,
        }
    }

    pub const fn removed() -> Self {
        Self {
            published: false,
            on_draft: false,
        }
    }

    pub fn is_permanently_removed(&self) -> bool {
        !self.published && !self.on_draft
    }
}

/// A read-only view of an external content node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentNode {
    pub id: NodeId,
    pub parent: Option<NodeId>,
    /// The node's own path segment, e.g. `about-us`.
    pub segment: String,
    pub state: NodeState,
}

/// The external content tree the synchronizer follows.
///
/// Implementations only answer questions; nothing in this workspace writes
/// content nodes through this trait. Hierarchies are expected to be acyclic.
#[async_trait]
pub trait ContentHierarchy: Send + Sync + 'static {
    /// Returns the node, including removed nodes the provider still remembers.
    async fn get_node(&self, id: NodeId) -> Result<Option<ContentNode>>;

    /// Returns the direct children of a node.
    ///
    /// With `include_deleted`, children without any live or draft version
    /// are included too.
    async fn get_children(&self, id: NodeId, include_deleted: bool) -> Result<Vec<ContentNode>>;

    /// Returns the parent of a node, `None` for top level nodes.
    async fn get_parent(&self, id: NodeId) -> Result<Option<ContentNode>>;

    /// Returns the full path of the node as of the given stage, if the node
    /// exists in that stage.
    async fn full_path_as_of(&self, id: NodeId, stage: Stage) -> Result<Option<SourcePath>>;
}
