//! Keeps redirect mappings consistent with an external content hierarchy.
//!
//! The [`Synchronizer`] reacts to content lifecycle events (creation, path
//! changes, deletion) and writes page mappings so that old addresses keep
//! resolving. Subtrees are walked with an explicit, depth-bounded work queue;
//! the [`Propagator`] runs those walks as cancellable background jobs and
//! retries failed subtrees on their own.

mod cascade;
pub mod config;
pub mod error;
pub mod log;
pub mod memory;
pub mod propagator;
pub mod report;
mod retry;
pub mod synchronizer;

pub use config::{PropagatorConfig, RetryPolicy, SyncConfig};
pub use error::{Result, SyncError};
pub use log::PropagationLog;
pub use memory::InMemoryHierarchy;
pub use propagator::{JobHandle, Propagator};
pub use report::{
    CascadeMode, CascadeReport, CascadeStep, CascadeTask, DeleteReport, FailedSubtree, StepAction,
};
pub use synchronizer::Synchronizer;
pub use tokio_util::sync::CancellationToken;
