use crate::error::SyncError;
use detour_core::{MappingId, NodeId, SourcePath};
use jiff::Timestamp;
use serde::{Serialize, Serializer};

/// How a cascade task chooses the path its mapping points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CascadeMode {
    /// Ask the provider for the node's current path, falling back to the
    /// path derived from the parent's target.
    Created,
    /// Use the path derived from the parent's target.
    PathChanged,
}

/// One node to visit during a cascade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CascadeTask {
    pub node: NodeId,
    /// The inbound address that should keep reaching `node`.
    pub source: SourcePath,
    /// Where `node` lives now, as far as the cascade knows.
    pub target: SourcePath,
    /// Levels below the cascade root; the root is at depth 0.
    pub depth: usize,
    pub mode: CascadeMode,
}

impl CascadeTask {
    pub fn root(node: NodeId, source: SourcePath, target: SourcePath, mode: CascadeMode) -> Self {
        Self {
            node,
            source,
            target,
            depth: 0,
            mode,
        }
    }
}

/// What happened to the inbound mapping of one visited node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "mapping", rename_all = "snake_case")]
pub enum StepAction {
    Created(MappingId),
    Updated(MappingId),
    Unchanged(MappingId),
    /// The inbound address is the node's own path, so no mapping is kept.
    SelfReference,
}

impl StepAction {
    pub fn mapping(&self) -> Option<MappingId> {
        match self {
            StepAction::Created(id) | StepAction::Updated(id) | StepAction::Unchanged(id) => {
                Some(*id)
            }
            StepAction::SelfReference => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CascadeStep {
    pub node: NodeId,
    pub depth: usize,
    pub source: SourcePath,
    pub target: SourcePath,
    pub action: StepAction,
    /// Page mappings removed because their source is the node's own path.
    pub purged: Vec<MappingId>,
    /// Page mappings whose cached target path was moved to `target`.
    pub refreshed: Vec<MappingId>,
}

/// A task whose subtree was not processed.
#[derive(Debug, Clone, Serialize)]
pub struct FailedSubtree {
    pub task: CascadeTask,
    #[serde(serialize_with = "display")]
    pub error: SyncError,
}

impl FailedSubtree {
    pub fn new(task: CascadeTask, error: SyncError) -> Self {
        Self { task, error }
    }

    /// Whether running the task again may succeed.
    pub fn is_retryable(&self) -> bool {
        self.error.is_transient()
    }
}

/// The outcome of one cascade, possibly spread over several attempts.
#[derive(Debug, Clone, Serialize)]
pub struct CascadeReport {
    pub root: NodeId,
    pub steps: Vec<CascadeStep>,
    pub failed: Vec<FailedSubtree>,
    /// Set when the walk stopped because its job was cancelled.
    pub cancelled: bool,
    /// Runs it took to produce this report.
    pub attempts: u32,
    pub started_at: Timestamp,
    pub finished_at: Timestamp,
}

impl CascadeReport {
    pub fn new(root: NodeId) -> Self {
        let now = Timestamp::now();
        Self {
            root,
            steps: Vec::new(),
            failed: Vec::new(),
            cancelled: false,
            attempts: 1,
            started_at: now,
            finished_at: now,
        }
    }

    /// `true` when every task ran and nothing was cancelled.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && !self.cancelled
    }

    /// Ids of mappings the cascade created.
    pub fn created(&self) -> Vec<MappingId> {
        self.steps
            .iter()
            .filter_map(|step| match step.action {
                StepAction::Created(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    /// Whether any failure is worth another attempt.
    pub fn has_retryable_failures(&self) -> bool {
        self.failed.iter().any(FailedSubtree::is_retryable)
    }

    /// Removes and returns the retryable failures.
    pub fn take_retryable(&mut self) -> Vec<FailedSubtree> {
        let (retry, keep): (Vec<_>, Vec<_>) = std::mem::take(&mut self.failed)
            .into_iter()
            .partition(FailedSubtree::is_retryable);
        self.failed = keep;
        retry
    }

    /// Folds the report of a retry run into this one.
    pub fn absorb(&mut self, retry: CascadeReport) {
        self.steps.extend(retry.steps);
        self.failed.extend(retry.failed);
        self.cancelled |= retry.cancelled;
        self.attempts += 1;
        self.finished_at = retry.finished_at;
    }
}

/// The outcome of [`Synchronizer::on_deleted`](crate::Synchronizer::on_deleted).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteReport {
    pub node: NodeId,
    /// `false` when a live or draft version of the node still exists, in
    /// which case nothing was changed.
    pub permanently_removed: bool,
    /// The path converted mappings now link to, when the provider still knew it.
    pub last_path: Option<SourcePath>,
    /// Page mappings converted into link mappings.
    pub converted: Vec<MappingId>,
}

fn display<S: Serializer>(error: &SyncError, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(error)
}
