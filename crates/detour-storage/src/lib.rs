//! Mapping store backends.
//!
//! [`InMemoryMappingStore`] keeps everything in process and is used by tests
//! and single-node deployments; [`MySqlMappingStore`] persists mappings in
//! MySQL and enforces the canonical mapping invariant with a unique index.

pub mod memory;
pub mod mysql;

pub use detour_core::store::{MappingStore, PutMode, PutOutcome, ReadMappingStore, Result};
pub use detour_core::StorageError;
pub use memory::InMemoryMappingStore;
pub use mysql::MySqlMappingStore;
