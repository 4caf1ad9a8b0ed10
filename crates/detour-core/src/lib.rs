//! Core types and traits for the Detour redirect service.
//!
//! This crate provides the domain types shared by the mapping stores, the
//! matcher and the synchronizer, together with the traits that sit between
//! them: [`MappingStore`] for persistence and [`ContentHierarchy`] for the
//! external content tree.

pub mod error;
pub mod hierarchy;
pub mod mapping;
pub mod path;
pub mod pattern;
pub mod store;

pub use error::{CacheError, CoreError, ProviderError, StorageError};
pub use hierarchy::{ContentHierarchy, ContentNode, NodeId, NodeState, Stage};
pub use mapping::{
    CanonicalKey, Mapping, MappingId, MappingOrigin, MatchKind, Redirect, RedirectKind,
    AUTOMATIC_PRIORITY, DEFAULT_RESPONSE_CODE, VANITY_PRIORITY,
};
pub use path::{PathPolicy, SourcePath, TrailingSlash};
pub use pattern::Pattern;
pub use store::{MappingStore, PutMode, PutOutcome, ReadMappingStore};
