use std::sync::Arc;

use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::report::{CascadeMode, CascadeReport, CascadeTask, DeleteReport};
use detour_core::{
    ContentHierarchy, CoreError, Mapping, MappingOrigin, MappingStore, NodeId, ProviderError,
    PutMode, Redirect, SourcePath, VANITY_PRIORITY,
};
use detour_generator::Generator;
use jiff::Timestamp;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Keeps page mappings in step with an external content hierarchy.
///
/// Each handler takes one lifecycle event. Path changes and creations
/// cascade over the node's subtree through an explicit work queue (see
/// [`Synchronizer::run`]); deletions convert page mappings into links once
/// the node is gone for good.
pub struct Synchronizer<S, P, G> {
    pub(crate) store: Arc<S>,
    pub(crate) provider: Arc<P>,
    pub(crate) generator: G,
    pub(crate) config: SyncConfig,
}

impl<S, P, G> Synchronizer<S, P, G>
where
    S: MappingStore,
    P: ContentHierarchy,
    G: Generator,
{
    pub fn new(store: Arc<S>, provider: Arc<P>, generator: G, config: SyncConfig) -> Self {
        Self {
            store,
            provider,
            generator,
            config,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn provider(&self) -> &Arc<P> {
        &self.provider
    }

    /// The root task for a path change, or `None` when the change needs no
    /// mappings: handling is disabled, nothing moved, or the old address was
    /// a placeholder.
    pub fn path_changed_root(
        &self,
        node: NodeId,
        old_path: &SourcePath,
        new_path: &SourcePath,
    ) -> Option<CascadeTask> {
        if !self.config.enabled {
            debug!(node = %node, "synchronizer disabled, ignoring path change");
            return None;
        }
        if old_path == new_path {
            debug!(node = %node, path = %old_path, "path unchanged");
            return None;
        }
        if self.is_placeholder(old_path) {
            debug!(node = %node, path = %old_path, "old path is a placeholder, no mappings needed");
            return None;
        }

        Some(CascadeTask::root(
            node,
            old_path.clone(),
            new_path.clone(),
            CascadeMode::PathChanged,
        ))
    }

    /// The root task for a newly registered inbound address.
    pub fn created_root(&self, node: NodeId, path: &SourcePath) -> Option<CascadeTask> {
        if !self.config.enabled {
            debug!(node = %node, "synchronizer disabled, ignoring creation");
            return None;
        }

        Some(CascadeTask::root(
            node,
            path.clone(),
            path.clone(),
            CascadeMode::Created,
        ))
    }

    /// Handles a node moving from `old_path` to `new_path`.
    ///
    /// The node and every descendant keep answering on their old addresses:
    /// `old_path/seg…` ends up pointing at the descendant now living at
    /// `new_path/seg…`.
    pub async fn on_path_changed(
        &self,
        node: NodeId,
        old_path: &SourcePath,
        new_path: &SourcePath,
    ) -> CascadeReport {
        info!(node = %node, from = %old_path, to = %new_path, "content path changed");
        let tasks = self
            .path_changed_root(node, old_path, new_path)
            .into_iter()
            .collect();
        self.run(node, tasks, &CancellationToken::new()).await
    }

    /// Registers `path` as an inbound address of `node` and of its subtree.
    ///
    /// Targets come from the provider's current paths. An address equal to
    /// its target is never stored.
    pub async fn on_created(&self, node: NodeId, path: &SourcePath) -> CascadeReport {
        info!(node = %node, path = %path, "content node created");
        let tasks = self.created_root(node, path).into_iter().collect();
        self.run(node, tasks, &CancellationToken::new()).await
    }

    /// Handles the removal of a node.
    ///
    /// Only once no live or draft version is left (or the provider has
    /// forgotten the node) are its page mappings turned into links to its
    /// last known path, so old addresses keep resolving.
    pub async fn on_deleted(&self, node: NodeId) -> Result<DeleteReport> {
        let mut report = DeleteReport {
            node,
            permanently_removed: false,
            last_path: None,
            converted: Vec::new(),
        };

        if !self.config.enabled {
            debug!(node = %node, "synchronizer disabled, ignoring deletion");
            return Ok(report);
        }

        let cancel = CancellationToken::new();
        let known = match self.fetch_node(node, &cancel).await {
            Ok(known) => known,
            Err(err) if err.is_not_found() => None,
            Err(err) => return Err(err),
        };

        if let Some(content) = &known {
            if !content.state.is_permanently_removed() {
                debug!(node = %node, state = ?content.state, "node still has a version, keeping mappings");
                return Ok(report);
            }
        }

        report.permanently_removed = true;
        report.last_path = self.current_path(node, &cancel).await?;

        let mappings = self.mappings_for_page(node, &cancel).await?;

        for mut mapping in mappings {
            let Redirect::ToPage { path, .. } = &mapping.redirect else {
                continue;
            };
            let link = report.last_path.as_ref().unwrap_or(path).to_string();

            mapping.redirect = Redirect::link(link);
            mapping.updated_at = Timestamp::now();
            let id = mapping.id;
            self.put(mapping, PutMode::Reject, &cancel).await?;
            report.converted.push(id);
        }

        info!(
            node = %node,
            converted = report.converted.len(),
            "converted page mappings of removed node into links"
        );
        Ok(report)
    }

    /// Sets, moves or removes the vanity address of a node.
    ///
    /// Returns the vanity mapping after the change, `None` once removed.
    pub async fn set_vanity(&self, node: NodeId, vanity: Option<&str>) -> Result<Option<Mapping>> {
        let cancel = CancellationToken::new();

        let existing = self
            .mappings_for_page(node, &cancel)
            .await?
            .into_iter()
            .find(|m| m.origin == MappingOrigin::Vanity);

        let vanity = vanity.map(str::trim).filter(|v| !v.is_empty());
        let Some(raw) = vanity else {
            if let Some(mapping) = existing {
                self.remove(mapping.id, &cancel).await?;
                info!(node = %node, mapping = %mapping.id, "removed vanity mapping");
            }
            return Ok(None);
        };

        let source = SourcePath::parse(raw, &self.config.path_policy)?;
        let target = self
            .current_path(node, &cancel)
            .await?
            .ok_or(SyncError::Provider(ProviderError::NotFound(node)))?;

        if source == target {
            return Err(SyncError::Core(CoreError::InvalidMapping(format!(
                "vanity path '{}' is the page's own path",
                source
            ))));
        }

        let taken = self.page_mappings_at(&source, &cancel).await?;
        if let Some(page) = taken
            .iter()
            .filter_map(|m| m.redirect.target_page())
            .find(|page| *page != node)
        {
            return Err(SyncError::VanityConflict { path: source, page });
        }

        let mapping = match existing {
            Some(mut mapping) => {
                mapping.source = source;
                mapping.redirect = Redirect::page(node, target);
                mapping.updated_at = Timestamp::now();
                self.put(mapping.clone(), PutMode::Reject, &cancel).await?;
                mapping
            }
            None => {
                let mapping =
                    Mapping::new(self.generator.next_id(), source, Redirect::page(node, target))
                        .with_priority(VANITY_PRIORITY)
                        .with_owner(node)
                        .with_origin(MappingOrigin::Vanity);
                self.insert(mapping.clone(), &cancel).await?;
                mapping
            }
        };

        info!(node = %node, mapping = %mapping.id, path = %mapping.source, "saved vanity mapping");
        Ok(Some(mapping))
    }

    fn is_placeholder(&self, path: &SourcePath) -> bool {
        let prefix = &self.config.placeholder_prefix;
        !prefix.is_empty()
            && path
                .segments()
                .last()
                .is_some_and(|segment| segment.starts_with(prefix.as_str()))
    }
}
