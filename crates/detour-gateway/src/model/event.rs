use detour_core::NodeId;
use detour_sync::{CascadeReport, DeleteReport};
use serde::{Deserialize, Serialize};

/// A lifecycle event of the external content hierarchy.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentEvent {
    /// `path` is an inbound address that should keep reaching the node.
    Created { node: NodeId, path: String },
    PathChanged {
        node: NodeId,
        old_path: String,
        new_path: String,
    },
    Deleted { node: NodeId },
}

#[derive(Debug, Default, Deserialize)]
pub struct EventQuery {
    /// Wait for the cascade to finish and return its report.
    #[serde(default)]
    pub wait: bool,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EventResponse {
    Queued { root: NodeId },
    Completed { report: CascadeReport },
    Deleted { report: DeleteReport },
}
