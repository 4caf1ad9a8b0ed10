#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use detour_core::hierarchy::Result;
use detour_core::{
    ContentHierarchy, ContentNode, Mapping, NodeId, ProviderError, ReadMappingStore, Redirect,
    SourcePath, Stage,
};
use detour_generator::SeqGenerator;
use detour_storage::InMemoryMappingStore;
use detour_sync::{CancellationToken, InMemoryHierarchy, RetryPolicy, SyncConfig, Synchronizer};

pub type TestSynchronizer<P> = Synchronizer<InMemoryMappingStore, P, SeqGenerator>;

pub fn path(s: &str) -> SourcePath {
    SourcePath::new(s).unwrap()
}

pub fn fast_retry(max_retries: u32) -> RetryPolicy {
    RetryPolicy::builder()
        .max_retries(max_retries)
        .base_delay(Duration::from_millis(1))
        .max_delay(Duration::from_millis(5))
        .build()
}

pub fn config() -> SyncConfig {
    SyncConfig::builder().retry(fast_retry(3)).build()
}

/// `/a` (1) > `/a/b` (2) > `/a/b/c` (3) > `/a/b/c/d` (4), plus `/e` (5).
pub fn sample_tree() -> InMemoryHierarchy {
    let tree = InMemoryHierarchy::new();
    tree.add(1, None, "a");
    tree.add(2, Some(1), "b");
    tree.add(3, Some(2), "c");
    tree.add(4, Some(3), "d");
    tree.add(5, None, "e");
    tree
}

pub fn synchronizer<P: ContentHierarchy>(
    provider: P,
    config: SyncConfig,
) -> (Arc<InMemoryMappingStore>, Arc<P>, TestSynchronizer<P>) {
    let store = Arc::new(InMemoryMappingStore::new());
    let provider = Arc::new(provider);
    let sync = Synchronizer::new(
        Arc::clone(&store),
        Arc::clone(&provider),
        SeqGenerator::new(),
        config,
    );
    (store, provider, sync)
}

/// Every mapping as `(source, page, cached path)`, sorted by source.
pub async fn page_mappings(store: &InMemoryMappingStore) -> Vec<(String, u64, String)> {
    let mut out: Vec<_> = store
        .all()
        .await
        .unwrap()
        .into_iter()
        .filter_map(|m: Mapping| match m.redirect {
            Redirect::ToPage { page, path } => Some((m.source.to_string(), page.get(), path.to_string())),
            _ => None,
        })
        .collect();
    out.sort();
    out
}

/// Fails `get_children` for one node a number of times before delegating.
pub struct FlakyHierarchy {
    pub inner: InMemoryHierarchy,
    pub node: NodeId,
    pub failures: AtomicU32,
    pub transient: bool,
}

impl FlakyHierarchy {
    pub fn new(inner: InMemoryHierarchy, node: u64, failures: u32) -> Self {
        Self {
            inner,
            node: NodeId::new(node),
            failures: AtomicU32::new(failures),
            transient: true,
        }
    }

    pub fn permanent(inner: InMemoryHierarchy, node: u64) -> Self {
        Self {
            transient: false,
            ..Self::new(inner, node, u32::MAX)
        }
    }
}

#[async_trait]
impl ContentHierarchy for FlakyHierarchy {
    async fn get_node(&self, id: NodeId) -> Result<Option<ContentNode>> {
        self.inner.get_node(id).await
    }

    async fn get_children(&self, id: NodeId, include_deleted: bool) -> Result<Vec<ContentNode>> {
        if id == self.node {
            let left = self.failures.load(Ordering::SeqCst);
            if left > 0 {
                self.failures.store(left - 1, Ordering::SeqCst);
                return Err(if self.transient {
                    ProviderError::Transient(format!("{} temporarily unavailable", id))
                } else {
                    ProviderError::Failed(format!("{} is corrupt", id))
                });
            }
        }
        self.inner.get_children(id, include_deleted).await
    }

    async fn get_parent(&self, id: NodeId) -> Result<Option<ContentNode>> {
        self.inner.get_parent(id).await
    }

    async fn full_path_as_of(&self, id: NodeId, stage: Stage) -> Result<Option<SourcePath>> {
        self.inner.full_path_as_of(id, stage).await
    }
}

/// Cancels a token once the children of one node have been listed.
pub struct CancelAfterChildren {
    pub inner: InMemoryHierarchy,
    pub node: NodeId,
    pub token: CancellationToken,
}

#[async_trait]
impl ContentHierarchy for CancelAfterChildren {
    async fn get_node(&self, id: NodeId) -> Result<Option<ContentNode>> {
        self.inner.get_node(id).await
    }

    async fn get_children(&self, id: NodeId, include_deleted: bool) -> Result<Vec<ContentNode>> {
        let children = self.inner.get_children(id, include_deleted).await;
        if id == self.node {
            self.token.cancel();
        }
        children
    }

    async fn get_parent(&self, id: NodeId) -> Result<Option<ContentNode>> {
        self.inner.get_parent(id).await
    }

    async fn full_path_as_of(&self, id: NodeId, stage: Stage) -> Result<Option<SourcePath>> {
        self.inner.full_path_as_of(id, stage).await
    }
}

/// Lists `back_to` as an extra child of `node`.
pub struct CyclicHierarchy {
    pub inner: InMemoryHierarchy,
    pub node: NodeId,
    pub back_to: NodeId,
}

#[async_trait]
impl ContentHierarchy for CyclicHierarchy {
    async fn get_node(&self, id: NodeId) -> Result<Option<ContentNode>> {
        self.inner.get_node(id).await
    }

    async fn get_children(&self, id: NodeId, include_deleted: bool) -> Result<Vec<ContentNode>> {
        let mut children = self.inner.get_children(id, include_deleted).await?;
        if id == self.node {
            if let Some(node) = self.inner.get_node(self.back_to).await? {
                children.push(node);
            }
        }
        Ok(children)
    }

    async fn get_parent(&self, id: NodeId) -> Result<Option<ContentNode>> {
        self.inner.get_parent(id).await
    }

    async fn full_path_as_of(&self, id: NodeId, stage: Stage) -> Result<Option<SourcePath>> {
        self.inner.full_path_as_of(id, stage).await
    }
}
