use detour_core::{CoreError, NodeId, ProviderError, SourcePath, StorageError};
use thiserror::Error;

/// Result type for synchronizer operations.
pub type Result<T> = std::result::Result<T, SyncError>;

#[derive(Debug, Clone, Error)]
pub enum SyncError {
    /// The walk went deeper than the configured bound, which means the
    /// provider returned a cyclic or unexpectedly deep hierarchy.
    #[error("{node} is {depth} levels below the cascade root, limit is {max_depth}")]
    DepthExceeded {
        node: NodeId,
        depth: usize,
        max_depth: usize,
    },
    /// The provider listed a node that the walk had already visited.
    #[error("{node} reached twice, the content hierarchy is not a tree")]
    Cycle { node: NodeId },
    #[error("content provider error: {0}")]
    Provider(#[from] ProviderError),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("vanity path '{path}' is already mapped to {page}")]
    VanityConflict { path: SourcePath, page: NodeId },
    #[error("propagation cancelled")]
    Cancelled,
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl SyncError {
    /// Whether retrying the failed operation may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            SyncError::Provider(err) => err.is_transient(),
            SyncError::Storage(err) => err.is_transient(),
            _ => false,
        }
    }

    pub(crate) fn is_not_found(&self) -> bool {
        matches!(self, SyncError::Provider(ProviderError::NotFound(_)))
    }
}
