use detour_core::PathPolicy;
use rand::Rng;
use std::time::Duration;
use typed_builder::TypedBuilder;

/// Exponential backoff for transient provider and store failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TypedBuilder)]
pub struct RetryPolicy {
    /// Retries after the first attempt; `0` disables retrying.
    #[builder(default = 3)]
    pub max_retries: u32,
    #[builder(default = Duration::from_millis(50))]
    pub base_delay: Duration,
    #[builder(default = Duration::from_secs(2))]
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self::builder().max_retries(0).build()
    }

    /// Delay before retry number `attempt` (1-based): the base delay doubled
    /// per attempt, capped at `max_delay`, plus up to 10% jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let factor = 2u32.saturating_pow(attempt - 1);
        let capped = self.base_delay.saturating_mul(factor).min(self.max_delay);

        let jitter_range = capped.as_millis() as u64 / 10;
        let jitter = if jitter_range > 0 {
            rand::thread_rng().gen_range(0..jitter_range)
        } else {
            0
        };

        capped + Duration::from_millis(jitter)
    }
}

/// Settings for the [`Synchronizer`](crate::Synchronizer).
#[derive(Debug, Clone, TypedBuilder)]
pub struct SyncConfig {
    /// When `false`, content events are logged and otherwise ignored.
    #[builder(default = true)]
    pub enabled: bool,
    /// Path changes away from a segment with this prefix create no mappings.
    #[builder(default = "new-".to_string(), setter(into))]
    pub placeholder_prefix: String,
    /// Deepest level below the cascade root that is still processed.
    #[builder(default = 32)]
    pub max_depth: usize,
    #[builder(default)]
    pub path_policy: PathPolicy,
    #[builder(default)]
    pub retry: RetryPolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Settings for the asynchronous [`Propagator`](crate::Propagator).
#[derive(Debug, Clone, TypedBuilder)]
pub struct PropagatorConfig {
    /// Cascades allowed to run at the same time.
    #[builder(default = 4)]
    pub max_concurrent_jobs: usize,
    /// Runs per job, counting the first one. Later runs only revisit
    /// subtrees that failed with a transient error.
    #[builder(default = 3)]
    pub max_attempts: u32,
    #[builder(default = Duration::from_millis(200))]
    pub retry_delay: Duration,
    /// Reports kept by the propagation log.
    #[builder(default = 256)]
    pub log_capacity: usize,
}

impl Default for PropagatorConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}
