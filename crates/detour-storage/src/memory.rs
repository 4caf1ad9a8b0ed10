use async_trait::async_trait;
use dashmap::DashMap;
use detour_core::error::StorageError;
use detour_core::store::{
    resolution_order, MappingStore, PutMode, PutOutcome, ReadMappingStore, Result,
};
use detour_core::{Mapping, MappingId, MatchKind, NodeId, RedirectKind, SourcePath};
use parking_lot::Mutex;
use tracing::{debug, trace};

/// In-memory implementation of the mapping store using DashMap.
///
/// Reads never block each other. Writes are serialized by a single writer
/// lock so the canonical check and the insert happen as one step.
#[derive(Debug, Default)]
pub struct InMemoryMappingStore {
    mappings: DashMap<MappingId, Mapping>,
    by_source: DashMap<SourcePath, Vec<MappingId>>,
    writer: Mutex<()>,
}

impl InMemoryMappingStore {
    /// Creates a new in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new in-memory store with the specified capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            mappings: DashMap::with_capacity(capacity),
            by_source: DashMap::with_capacity(capacity),
            writer: Mutex::new(()),
        }
    }

    /// Number of stored mappings.
    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    fn write(&self, mapping: Mapping, mode: PutMode, insert_only: bool) -> Result<PutOutcome> {
        let _guard = self.writer.lock();

        if insert_only && self.mappings.contains_key(&mapping.id) {
            return Err(StorageError::DuplicateId(mapping.id));
        }

        let conflicts = match mapping.canonical_key() {
            Some(key) => self
                .ids_at(&key.source)
                .into_iter()
                .filter(|id| *id != mapping.id)
                .filter(|id| {
                    self.mappings
                        .get(id)
                        .is_some_and(|m| m.canonical_key().as_ref() == Some(&key))
                })
                .collect(),
            None => Vec::new(),
        };

        if let (Some(existing), PutMode::Reject) = (conflicts.first(), mode) {
            return Err(StorageError::Conflict {
                path: mapping.source.to_string(),
                existing: *existing,
            });
        }

        let id = mapping.id;
        let source = mapping.source.clone();
        let created = match self.mappings.insert(id, mapping) {
            Some(previous) if previous.source == source => false,
            Some(previous) => {
                self.unindex(&previous.source, id);
                self.index(source, id);
                false
            }
            None => {
                self.index(source, id);
                true
            }
        };

        for conflict in &conflicts {
            if let Some((_, removed)) = self.mappings.remove(conflict) {
                self.unindex(&removed.source, *conflict);
                debug!(id = %conflict, replaced_by = %id, "Replaced canonical mapping");
            }
        }

        Ok(PutOutcome {
            created,
            replaced: conflicts,
        })
    }

    fn ids_at(&self, source: &SourcePath) -> Vec<MappingId> {
        self.by_source
            .get(source)
            .map(|ids| ids.clone())
            .unwrap_or_default()
    }

    fn index(&self, source: SourcePath, id: MappingId) {
        self.by_source.entry(source).or_default().push(id);
    }

    fn unindex(&self, source: &SourcePath, id: MappingId) {
        let now_empty = match self.by_source.get_mut(source) {
            Some(mut ids) => {
                ids.retain(|existing| *existing != id);
                ids.is_empty()
            }
            None => false,
        };
        if now_empty {
            self.by_source.remove_if(source, |_, ids| ids.is_empty());
        }
    }

    fn collect<F>(&self, predicate: F) -> Vec<Mapping>
    where
        F: Fn(&Mapping) -> bool,
    {
        let mut found: Vec<Mapping> = self
            .mappings
            .iter()
            .filter(|entry| predicate(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        found.sort_by(resolution_order);
        found
    }
}

#[async_trait]
impl ReadMappingStore for InMemoryMappingStore {
    async fn get(&self, id: MappingId) -> Result<Option<Mapping>> {
        Ok(self.mappings.get(&id).map(|m| m.clone()))
    }

    async fn find_by_source_path(
        &self,
        path: &SourcePath,
        kind: Option<RedirectKind>,
        exclude: &[MappingId],
    ) -> Result<Vec<Mapping>> {
        trace!(path = %path, "Finding mappings by source path");

        let mut found: Vec<Mapping> = self
            .ids_at(path)
            .into_iter()
            .filter(|id| !exclude.contains(id))
            .filter_map(|id| self.mappings.get(&id).map(|m| m.clone()))
            .filter(|m| kind.map_or(true, |kind| m.redirect.kind() == kind))
            .collect();
        found.sort_by(resolution_order);
        Ok(found)
    }

    async fn find_by_match_kind(&self, kind: MatchKind) -> Result<Vec<Mapping>> {
        Ok(self.collect(|m| m.match_kind == kind))
    }

    async fn find_by_page(&self, page: NodeId) -> Result<Vec<Mapping>> {
        Ok(self.collect(|m| m.redirect.target_page() == Some(page)))
    }

    async fn all(&self) -> Result<Vec<Mapping>> {
        Ok(self.collect(|_| true))
    }
}

#[async_trait]
impl MappingStore for InMemoryMappingStore {
    async fn put(&self, mapping: Mapping, mode: PutMode) -> Result<PutOutcome> {
        mapping
            .validate()
            .map_err(|e| StorageError::InvalidData(e.to_string()))?;

        let id = mapping.id;
        let outcome = self.write(mapping, mode, false)?;
        debug!(id = %id, created = outcome.created, replaced = outcome.replaced.len(), "Stored mapping");
        Ok(outcome)
    }

    async fn insert(&self, mapping: Mapping, mode: PutMode) -> Result<PutOutcome> {
        mapping
            .validate()
            .map_err(|e| StorageError::InvalidData(e.to_string()))?;

        let id = mapping.id;
        let outcome = self.write(mapping, mode, true)?;
        debug!(id = %id, replaced = outcome.replaced.len(), "Inserted mapping");
        Ok(outcome)
    }

    async fn remove(&self, id: MappingId) -> Result<bool> {
        let _guard = self.writer.lock();

        match self.mappings.remove(&id) {
            Some((_, removed)) => {
                self.unindex(&removed.source, id);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
