use crate::hierarchy::NodeId;
use crate::mapping::MappingId;
use thiserror::Error;

/// Result type for validation of core domain values.
pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("invalid path: {0}")]
    InvalidPath(String),
    #[error("invalid pattern: {0}")]
    InvalidPattern(String),
    #[error("invalid mapping: {0}")]
    InvalidMapping(String),
}

#[derive(Debug, Clone, Error)]
pub enum StorageError {
    /// A write would create a second canonical page mapping.
    #[error("canonical mapping for '{path}' already exists: {existing}")]
    Conflict { path: String, existing: MappingId },
    /// An insert used an id that is already taken.
    #[error("mapping {0} already exists")]
    DuplicateId(MappingId),
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
    #[error("storage operation timed out: {0}")]
    Timeout(String),
    #[error("storage query failed: {0}")]
    Query(String),
    #[error("stored data is invalid: {0}")]
    InvalidData(String),
    #[error("storage operation failed: {0}")]
    Operation(String),
}

impl StorageError {
    /// Whether retrying the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout(_))
    }
}

/// Errors reported by a [`ContentHierarchy`][crate::hierarchy::ContentHierarchy].
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("content node {0} not found")]
    NotFound(NodeId),
    #[error("content provider temporarily unavailable: {0}")]
    Transient(String),
    #[error("content provider failed: {0}")]
    Failed(String),
}

impl ProviderError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

#[derive(Debug, Clone, Error)]
pub enum CacheError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
    #[error("cache operation failed: {0}")]
    Operation(String),
    #[error("cached computation failed: {0}")]
    Compute(String),
}
