use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::config::PropagatorConfig;
use crate::error::Result;
use crate::log::PropagationLog;
use crate::report::{CascadeReport, CascadeTask, DeleteReport};
use crate::synchronizer::Synchronizer;
use dashmap::DashMap;
use detour_core::{ContentHierarchy, MappingStore, NodeId, SourcePath};
use detour_generator::Generator;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// A cascade running in the background.
#[derive(Debug)]
pub struct JobHandle {
    root: NodeId,
    cancel: CancellationToken,
    handle: JoinHandle<CascadeReport>,
}

impl JobHandle {
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Stops the job between two tasks. Mappings already written stay.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Waits for the job and returns its final report.
    pub async fn join(self) -> std::result::Result<CascadeReport, JoinError> {
        self.handle.await
    }
}

/// Runs cascades as background jobs.
///
/// At most `max_concurrent_jobs` cascades walk at once. Subtrees that fail
/// with a transient error are retried on their own, without walking the
/// rest of the tree again, until `max_attempts` runs have been made. Every
/// final report lands in the [`PropagationLog`].
pub struct Propagator<S, P, G> {
    synchronizer: Arc<Synchronizer<S, P, G>>,
    config: PropagatorConfig,
    permits: Arc<Semaphore>,
    /// Roots with queued or running jobs.
    jobs: Arc<DashMap<NodeId, RootJobs>>,
    epochs: AtomicU64,
    log: Arc<PropagationLog>,
}

/// The jobs of one root share a parent token; each runs on a child token.
struct RootJobs {
    token: CancellationToken,
    live: usize,
    /// Tells this entry apart from one created after a cancellation.
    epoch: u64,
}

impl<S, P, G> Propagator<S, P, G>
where
    S: MappingStore,
    P: ContentHierarchy,
    G: Generator,
{
    pub fn new(synchronizer: Arc<Synchronizer<S, P, G>>, config: PropagatorConfig) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(config.max_concurrent_jobs.max(1))),
            log: Arc::new(PropagationLog::new(config.log_capacity)),
            jobs: Arc::new(DashMap::new()),
            epochs: AtomicU64::new(0),
            synchronizer,
            config,
        }
    }

    pub fn synchronizer(&self) -> &Arc<Synchronizer<S, P, G>> {
        &self.synchronizer
    }

    pub fn log(&self) -> &Arc<PropagationLog> {
        &self.log
    }

    /// Number of roots with queued or running jobs.
    pub fn active_roots(&self) -> usize {
        self.jobs.len()
    }

    /// Queues the cascade for a path change.
    pub fn submit_path_changed(
        &self,
        node: NodeId,
        old_path: &SourcePath,
        new_path: &SourcePath,
    ) -> JobHandle {
        let tasks = self
            .synchronizer
            .path_changed_root(node, old_path, new_path)
            .into_iter()
            .collect();
        self.spawn(node, tasks)
    }

    /// Queues the cascade for a newly registered inbound address.
    pub fn submit_created(&self, node: NodeId, path: &SourcePath) -> JobHandle {
        let tasks = self.synchronizer.created_root(node, path).into_iter().collect();
        self.spawn(node, tasks)
    }

    /// Cancels the node's running cascades, then handles the deletion.
    pub async fn on_deleted(&self, node: NodeId) -> Result<DeleteReport> {
        self.cancel(node);
        self.synchronizer.on_deleted(node).await
    }

    /// Cancels every queued or running cascade rooted at `node`.
    pub fn cancel(&self, node: NodeId) -> bool {
        match self.jobs.remove(&node) {
            Some((_, jobs)) => {
                info!(node = %node, live = jobs.live, "cancelling propagation jobs");
                jobs.token.cancel();
                true
            }
            None => false,
        }
    }

    fn spawn(&self, root: NodeId, tasks: Vec<CascadeTask>) -> JobHandle {
        let (cancel, epoch) = {
            let mut entry = self.jobs.entry(root).or_insert_with(|| RootJobs {
                token: CancellationToken::new(),
                live: 0,
                epoch: self.epochs.fetch_add(1, Ordering::Relaxed),
            });
            entry.live += 1;
            (entry.token.child_token(), entry.epoch)
        };

        let job = Job {
            root,
            _guard: RootGuard {
                root,
                epoch,
                jobs: Arc::clone(&self.jobs),
            },
            synchronizer: Arc::clone(&self.synchronizer),
            config: self.config.clone(),
            permits: Arc::clone(&self.permits),
            log: Arc::clone(&self.log),
            cancel: cancel.clone(),
        };

        debug!(root = %root, tasks = tasks.len(), "queued propagation job");
        let handle = tokio::spawn(job.run(tasks));

        JobHandle {
            root,
            cancel,
            handle,
        }
    }
}

/// Counts one live job of a root. Dropping it drops the root's entry once
/// its last job is done.
struct RootGuard {
    root: NodeId,
    epoch: u64,
    jobs: Arc<DashMap<NodeId, RootJobs>>,
}

impl Drop for RootGuard {
    fn drop(&mut self) {
        let idle = match self.jobs.get_mut(&self.root) {
            Some(mut entry) if entry.epoch == self.epoch => {
                entry.live = entry.live.saturating_sub(1);
                entry.live == 0
            }
            _ => false,
        };

        if idle {
            let epoch = self.epoch;
            self.jobs
                .remove_if(&self.root, |_, entry| entry.epoch == epoch && entry.live == 0);
            trace!(root = %self.root, "no propagation jobs left for root");
        }
    }
}

struct Job<S, P, G> {
    root: NodeId,
    _guard: RootGuard,
    synchronizer: Arc<Synchronizer<S, P, G>>,
    config: PropagatorConfig,
    permits: Arc<Semaphore>,
    log: Arc<PropagationLog>,
    cancel: CancellationToken,
}

impl<S, P, G> Job<S, P, G>
where
    S: MappingStore,
    P: ContentHierarchy,
    G: Generator,
{
    async fn run(self, tasks: Vec<CascadeTask>) -> CascadeReport {
        let report = self.walk(tasks).await;
        self.log.record(report.clone());
        report
    }

    async fn walk(&self, tasks: Vec<CascadeTask>) -> CascadeReport {
        let _permit = tokio::select! {
            _ = self.cancel.cancelled() => return self.cancelled_before_start(),
            permit = Arc::clone(&self.permits).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => return self.cancelled_before_start(),
            },
        };

        let mut report = self.synchronizer.run(self.root, tasks, &self.cancel).await;

        while report.attempts < self.config.max_attempts
            && !report.cancelled
            && report.has_retryable_failures()
        {
            let delay = self.config.retry_delay * report.attempts;
            warn!(
                root = %self.root,
                attempt = report.attempts,
                failed = report.failed.len(),
                delay_ms = delay.as_millis() as u64,
                "retrying failed subtrees"
            );

            tokio::select! {
                _ = self.cancel.cancelled() => {
                    report.cancelled = true;
                    break;
                }
                _ = tokio::time::sleep(delay) => {}
            }

            let retry: Vec<CascadeTask> = report
                .take_retryable()
                .into_iter()
                .map(|failed| failed.task)
                .collect();
            let rerun = self.synchronizer.run(self.root, retry, &self.cancel).await;
            report.absorb(rerun);
        }

        info!(
            root = %self.root,
            steps = report.steps.len(),
            failed = report.failed.len(),
            attempts = report.attempts,
            cancelled = report.cancelled,
            "propagation job finished"
        );
        report
    }

    fn cancelled_before_start(&self) -> CascadeReport {
        let mut report = CascadeReport::new(self.root);
        report.cancelled = true;
        report
    }
}
