use detour_core::{CacheError, StorageError};
use thiserror::Error;

/// Result type for resolution.
pub type Result<T> = std::result::Result<T, MatcherError>;

#[derive(Debug, Clone, Error)]
pub enum MatcherError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),
}
