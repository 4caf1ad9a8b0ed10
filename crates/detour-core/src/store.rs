use crate::error::StorageError;
use crate::hierarchy::NodeId;
use crate::mapping::{Mapping, MappingId, MatchKind, RedirectKind};
use crate::path::SourcePath;
use async_trait::async_trait;
use std::cmp::Ordering;

/// Result type for mapping store operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// What `put` does when another canonical page mapping already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PutMode {
    /// Fail with [`StorageError::Conflict`].
    #[default]
    Reject,
    /// Remove the conflicting mappings as part of the same write.
    Replace,
}

/// What a successful `put` changed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PutOutcome {
    /// `true` if no mapping with this id existed before.
    pub created: bool,
    /// Mappings removed because they conflicted with the written one.
    pub replaced: Vec<MappingId>,
}

/// A read-only view of a mapping store.
///
/// Every query returning several mappings orders them by priority
/// (descending), then by `updated_at` (most recent first), then by id
/// (highest first). See [`resolution_order`].
#[async_trait]
pub trait ReadMappingStore: Send + Sync + 'static {
    /// Returns the mapping with the given id.
    async fn get(&self, id: MappingId) -> Result<Option<Mapping>>;

    /// Returns the mappings whose source equals `path`, optionally limited to
    /// one redirect kind, leaving out the ids in `exclude`.
    async fn find_by_source_path(
        &self,
        path: &SourcePath,
        kind: Option<RedirectKind>,
        exclude: &[MappingId],
    ) -> Result<Vec<Mapping>>;

    /// Returns every mapping with the given match kind.
    async fn find_by_match_kind(&self, kind: MatchKind) -> Result<Vec<Mapping>>;

    /// Returns every page mapping pointing at `page`.
    async fn find_by_page(&self, page: NodeId) -> Result<Vec<Mapping>>;

    /// Returns every stored mapping.
    async fn all(&self) -> Result<Vec<Mapping>>;
}

#[async_trait]
pub trait MappingStore: ReadMappingStore {
    /// Inserts or updates a mapping by id.
    ///
    /// Fails with [`StorageError::Conflict`] when another page mapping with
    /// the same canonical key exists, unless `mode` is [`PutMode::Replace`].
    /// Concurrent writers for the same canonical key never both succeed
    /// in leaving two canonical mappings behind.
    async fn put(&self, mapping: Mapping, mode: PutMode) -> Result<PutOutcome>;

    /// Stores a mapping under an id that must not be in use yet.
    ///
    /// Fails with [`StorageError::DuplicateId`] when a mapping with the same
    /// id exists. Canonical conflicts are handled as in [`put`](Self::put).
    async fn insert(&self, mapping: Mapping, mode: PutMode) -> Result<PutOutcome>;

    /// Removes a mapping. Returns `true` if it existed.
    async fn remove(&self, id: MappingId) -> Result<bool>;
}

/// The ordering used for every multi-mapping query.
pub fn resolution_order(a: &Mapping, b: &Mapping) -> Ordering {
    b.priority
        .cmp(&a.priority)
        .then_with(|| b.updated_at.cmp(&a.updated_at))
        .then_with(|| b.id.cmp(&a.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::Redirect;
    use jiff::{SignedDuration, Timestamp};

    #[test]
    fn orders_by_priority_then_recency_then_id() {
        let now = Timestamp::now();
        let earlier = now - SignedDuration::from_secs(10);
        let source = SourcePath::new("/a").unwrap();

        let low = Mapping::new(1, source.clone(), Redirect::link("/x")).with_priority(1);
        let high_old = Mapping::new(2, source.clone(), Redirect::link("/y"))
            .with_priority(5)
            .with_updated_at(earlier);
        let high_new = Mapping::new(3, source.clone(), Redirect::link("/z"))
            .with_priority(5)
            .with_updated_at(now);
        let high_new_bigger_id = Mapping::new(4, source, Redirect::link("/w"))
            .with_priority(5)
            .with_updated_at(now);

        let mut all = vec![low, high_old, high_new, high_new_bigger_id];
        all.sort_by(resolution_order);

        let ids: Vec<u64> = all.iter().map(|m| m.id.get()).collect();
        assert_eq!(ids, vec![4, 3, 2, 1]);
    }
}
