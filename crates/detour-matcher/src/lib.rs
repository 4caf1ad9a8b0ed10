//! Request path resolution for the Detour redirect service.
//!
//! [`MatcherService`] reads mappings from any
//! [`ReadMappingStore`](detour_core::ReadMappingStore) and picks the winning
//! mapping for a request path. [`CachedMatcher`] decorates any [`Matcher`]
//! with a [`ResolutionCache`], and [`trace`] follows a redirect chain hop by
//! hop, reporting loops and over-long chains.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use detour_core::{Mapping, MappingStore, PutMode, Redirect, SourcePath};
//! use detour_matcher::{CachedMatcher, Matcher, MatcherService, MokaResolutionCache};
//! use detour_storage::InMemoryMappingStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(InMemoryMappingStore::new());
//! store
//!     .put(
//!         Mapping::new(1, SourcePath::new("/old")?, Redirect::link("/new")),
//!         PutMode::Reject,
//!     )
//!     .await?;
//!
//! let matcher = CachedMatcher::new(MatcherService::new(store), MokaResolutionCache::new());
//! if let Some(resolution) = matcher.resolve_match("/old").await? {
//!     println!("{:?}", resolution.disposition());
//! }
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod cached;
pub mod error;
pub mod matcher;
pub mod resolution;
pub mod service;
pub mod trace;

pub use cache::{CacheConfig, MokaResolutionCache, ResolutionCache};
pub use cached::CachedMatcher;
pub use error::{MatcherError, Result};
pub use matcher::Matcher;
pub use resolution::{Disposition, Resolution};
pub use service::MatcherService;
pub use trace::{trace, Hop, Trace, TraceOutcome, DEFAULT_MAX_HOPS};
