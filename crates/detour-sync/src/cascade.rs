use std::collections::{HashSet, VecDeque};

use crate::error::{Result, SyncError};
use crate::report::{CascadeMode, CascadeReport, CascadeStep, CascadeTask, FailedSubtree, StepAction};
use crate::retry::with_retry;
use crate::synchronizer::Synchronizer;
use detour_core::{
    ContentHierarchy, ContentNode, Mapping, MappingId, MappingOrigin, MappingStore, MatchKind,
    NodeId, PutMode, PutOutcome, Redirect, RedirectKind, SourcePath, Stage, AUTOMATIC_PRIORITY,
};
use detour_generator::Generator;
use jiff::Timestamp;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

impl<S, P, G> Synchronizer<S, P, G>
where
    S: MappingStore,
    P: ContentHierarchy,
    G: Generator,
{
    /// Walks the subtrees below `tasks` breadth first.
    ///
    /// A failing task is recorded in the report together with the error and
    /// its subtree is skipped; every other task still runs. Tasks deeper than
    /// `max_depth` fail with [`SyncError::DepthExceeded`]. Mappings written
    /// before a failure or a cancellation are kept, so running the failed
    /// tasks again later continues where this run stopped.
    pub async fn run(
        &self,
        root: NodeId,
        tasks: Vec<CascadeTask>,
        cancel: &CancellationToken,
    ) -> CascadeReport {
        let mut report = CascadeReport::new(root);
        let mut queue: VecDeque<CascadeTask> = tasks.into();
        let mut visited: HashSet<NodeId> = HashSet::new();

        while let Some(task) = queue.pop_front() {
            if cancel.is_cancelled() {
                info!(root = %root, pending = queue.len() + 1, "cascade cancelled");
                report.cancelled = true;
                break;
            }

            if task.depth > self.config.max_depth {
                let err = SyncError::DepthExceeded {
                    node: task.node,
                    depth: task.depth,
                    max_depth: self.config.max_depth,
                };
                error!(root = %root, node = %task.node, source = %task.source, error = %err, "skipping subtree");
                report.failed.push(FailedSubtree::new(task, err));
                continue;
            }

            if !visited.insert(task.node) {
                let err = SyncError::Cycle { node: task.node };
                error!(root = %root, node = %task.node, source = %task.source, error = %err, "skipping subtree");
                report.failed.push(FailedSubtree::new(task, err));
                continue;
            }

            let step = match self.apply(&task, cancel).await {
                Ok(step) => step,
                Err(err) => {
                    if matches!(err, SyncError::Cancelled) {
                        report.cancelled = true;
                    }
                    warn!(root = %root, node = %task.node, error = %err, "cascade step failed");
                    report.failed.push(FailedSubtree::new(task, err));
                    if report.cancelled {
                        break;
                    }
                    continue;
                }
            };

            match self.expand(&task, &step.target, cancel).await {
                Ok(children) => {
                    report.steps.push(step);
                    queue.extend(children);
                }
                Err(err) => {
                    if matches!(err, SyncError::Cancelled) {
                        report.cancelled = true;
                    }
                    warn!(root = %root, node = %task.node, error = %err, "failed to expand children");
                    report.steps.push(step);
                    report.failed.push(FailedSubtree::new(task, err));
                    if report.cancelled {
                        break;
                    }
                }
            }
        }

        report.finished_at = Timestamp::now();
        debug!(
            root = %root,
            steps = report.steps.len(),
            failed = report.failed.len(),
            cancelled = report.cancelled,
            "cascade finished"
        );
        report
    }

    /// Writes the inbound mapping of one node and tidies its other mappings.
    async fn apply(&self, task: &CascadeTask, cancel: &CancellationToken) -> Result<CascadeStep> {
        let target = match task.mode {
            CascadeMode::PathChanged => task.target.clone(),
            CascadeMode::Created => self
                .current_path(task.node, cancel)
                .await?
                .unwrap_or_else(|| task.target.clone()),
        };

        let action = if task.source == target {
            trace!(node = %task.node, path = %target, "inbound address is the node's own path");
            StepAction::SelfReference
        } else {
            self.upsert_inbound(task.node, &task.source, &target, cancel)
                .await?
        };

        let purged = self.purge_self_references(task.node, &target, cancel).await?;
        let refreshed = self.refresh_targets(task.node, &target, cancel).await?;

        Ok(CascadeStep {
            node: task.node,
            depth: task.depth,
            source: task.source.clone(),
            target,
            action,
            purged,
            refreshed,
        })
    }

    /// Builds the tasks for the children of `task`'s node.
    async fn expand(
        &self,
        task: &CascadeTask,
        target: &SourcePath,
        cancel: &CancellationToken,
    ) -> Result<Vec<CascadeTask>> {
        let policy = &self.config.path_policy;
        let children = self.children(task.node, cancel).await?;

        let mut tasks = Vec::with_capacity(children.len());
        for child in children {
            tasks.push(CascadeTask {
                node: child.id,
                source: task.source.join(&child.segment, policy)?,
                target: target.join(&child.segment, policy)?,
                depth: task.depth + 1,
                mode: task.mode,
            });
        }
        Ok(tasks)
    }

    /// Points the automatic page mapping at `source` to `node` at `target`,
    /// creating it when missing.
    async fn upsert_inbound(
        &self,
        node: NodeId,
        source: &SourcePath,
        target: &SourcePath,
        cancel: &CancellationToken,
    ) -> Result<StepAction> {
        let redirect = Redirect::page(node, target.clone());
        let existing = self
            .page_mappings_at(source, cancel)
            .await?
            .into_iter()
            .find(|m| m.match_kind == MatchKind::Exact && m.priority == AUTOMATIC_PRIORITY);

        match existing {
            Some(mapping) if mapping.redirect == redirect && mapping.owner == Some(node) => {
                trace!(node = %node, mapping = %mapping.id, "inbound mapping up to date");
                Ok(StepAction::Unchanged(mapping.id))
            }
            Some(mut mapping) => {
                let id = mapping.id;
                if mapping.redirect.target_page() != Some(node) {
                    info!(
                        mapping = %id,
                        source = %source,
                        node = %node,
                        "address taken over by another page"
                    );
                }
                mapping.redirect = redirect;
                mapping.owner = Some(node);
                mapping.updated_at = Timestamp::now();
                self.put(mapping, PutMode::Reject, cancel).await?;
                debug!(mapping = %id, source = %source, target = %target, "updated inbound mapping");
                Ok(StepAction::Updated(id))
            }
            None => {
                let mapping = Mapping::new(self.generator.next_id(), source.clone(), redirect)
                    .with_owner(node)
                    .with_origin(MappingOrigin::Automatic);
                let id = mapping.id;
                self.insert(mapping, cancel).await?;
                info!(mapping = %id, source = %source, target = %target, "created inbound mapping");
                Ok(StepAction::Created(id))
            }
        }
    }

    /// Removes exact page mappings of `node` whose source is the node's own path.
    async fn purge_self_references(
        &self,
        node: NodeId,
        target: &SourcePath,
        cancel: &CancellationToken,
    ) -> Result<Vec<MappingId>> {
        let mut purged = Vec::new();

        for mapping in self.page_mappings_at(target, cancel).await? {
            if mapping.match_kind == MatchKind::Exact && mapping.redirect.target_page() == Some(node)
            {
                self.remove(mapping.id, cancel).await?;
                debug!(mapping = %mapping.id, path = %target, "purged self-referential mapping");
                purged.push(mapping.id);
            }
        }

        Ok(purged)
    }

    /// Moves the cached target path of every page mapping of `node` to `target`.
    async fn refresh_targets(
        &self,
        node: NodeId,
        target: &SourcePath,
        cancel: &CancellationToken,
    ) -> Result<Vec<MappingId>> {
        let mut refreshed = Vec::new();

        for mut mapping in self.mappings_for_page(node, cancel).await? {
            let stale = matches!(&mapping.redirect, Redirect::ToPage { path, .. } if path != target);
            if !stale {
                continue;
            }

            mapping.redirect = Redirect::page(node, target.clone());
            mapping.updated_at = Timestamp::now();
            let id = mapping.id;
            self.put(mapping, PutMode::Reject, cancel).await?;
            trace!(mapping = %id, target = %target, "refreshed cached target path");
            refreshed.push(id);
        }

        Ok(refreshed)
    }

    pub(crate) async fn fetch_node(
        &self,
        node: NodeId,
        cancel: &CancellationToken,
    ) -> Result<Option<ContentNode>> {
        let provider = &self.provider;
        with_retry(&self.config.retry, cancel, "get_node", move || async move {
            Ok(provider.get_node(node).await?)
        })
        .await
    }

    /// The live path of `node`, else its draft path. Unknown nodes have none.
    pub(crate) async fn current_path(
        &self,
        node: NodeId,
        cancel: &CancellationToken,
    ) -> Result<Option<SourcePath>> {
        for stage in [Stage::Live, Stage::Draft] {
            let provider = &self.provider;
            let found = with_retry(&self.config.retry, cancel, "full_path_as_of", move || async move {
                Ok(provider.full_path_as_of(node, stage).await?)
            })
            .await;

            match found {
                Ok(Some(path)) => return Ok(Some(path)),
                Ok(None) => {}
                Err(err) if err.is_not_found() => return Ok(None),
                Err(err) => return Err(err),
            }
        }
        Ok(None)
    }

    /// Children including removed ones; a node the provider no longer knows
    /// has none.
    async fn children(&self, node: NodeId, cancel: &CancellationToken) -> Result<Vec<ContentNode>> {
        let provider = &self.provider;
        let children = with_retry(&self.config.retry, cancel, "get_children", move || async move {
            Ok(provider.get_children(node, true).await?)
        })
        .await;

        match children {
            Err(err) if err.is_not_found() => {
                debug!(node = %node, "node already gone, skipping its children");
                Ok(Vec::new())
            }
            other => other,
        }
    }

    pub(crate) async fn mappings_for_page(
        &self,
        node: NodeId,
        cancel: &CancellationToken,
    ) -> Result<Vec<Mapping>> {
        let store = &self.store;
        with_retry(&self.config.retry, cancel, "find_by_page", move || async move {
            Ok(store.find_by_page(node).await?)
        })
        .await
    }

    pub(crate) async fn page_mappings_at(
        &self,
        source: &SourcePath,
        cancel: &CancellationToken,
    ) -> Result<Vec<Mapping>> {
        let store = &self.store;
        with_retry(&self.config.retry, cancel, "find_by_source_path", move || async move {
            Ok(store
                .find_by_source_path(source, Some(RedirectKind::ToPage), &[])
                .await?)
        })
        .await
    }

    pub(crate) async fn put(
        &self,
        mapping: Mapping,
        mode: PutMode,
        cancel: &CancellationToken,
    ) -> Result<PutOutcome> {
        let store = &self.store;
        let mapping = &mapping;
        with_retry(&self.config.retry, cancel, "put", move || async move {
            Ok(store.put(mapping.clone(), mode).await?)
        })
        .await
    }

    /// Stores a mapping under a freshly generated id.
    pub(crate) async fn insert(
        &self,
        mapping: Mapping,
        cancel: &CancellationToken,
    ) -> Result<PutOutcome> {
        let store = &self.store;
        let mapping = &mapping;
        with_retry(&self.config.retry, cancel, "insert", move || async move {
            Ok(store.insert(mapping.clone(), PutMode::Reject).await?)
        })
        .await
    }

    pub(crate) async fn remove(&self, id: MappingId, cancel: &CancellationToken) -> Result<bool> {
        let store = &self.store;
        with_retry(&self.config.retry, cancel, "remove", move || async move {
            Ok(store.remove(id).await?)
        })
        .await
    }
}
