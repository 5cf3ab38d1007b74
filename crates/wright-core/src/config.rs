//! Run configuration for the pipeline controller.

use std::time::Duration;

use crate::retry::RetryPolicy;

/// Configuration for a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Retries allowed per task (and per model stage) after the first
    /// attempt. `3` means at most four attempts.
    pub retry_max: u32,
    /// Maximum number of executor invocations computing at once. Commits
    /// stay in graph order regardless.
    pub max_concurrency: usize,
    /// Wall time limit for a single executor attempt.
    pub task_timeout: Duration,
    /// First backoff delay after an external-call failure.
    pub backoff_base: Duration,
    /// Upper bound on any single backoff delay.
    pub backoff_max: Duration,
    /// How long a cancelled run waits for aborted in-flight attempts to
    /// wind down before returning.
    pub drain_timeout: Duration,
}

impl PipelineConfig {
    pub const DEFAULT_RETRY_MAX: u32 = 3;
    pub const DEFAULT_MAX_CONCURRENCY: usize = 1;
    pub const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(600);
    pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(500);
    pub const DEFAULT_BACKOFF_MAX: Duration = Duration::from_secs(30);
    pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

    /// Backoff policy derived from this configuration.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            retry_max: self.retry_max,
            backoff_base: self.backoff_base,
            backoff_max: self.backoff_max,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            retry_max: Self::DEFAULT_RETRY_MAX,
            max_concurrency: Self::DEFAULT_MAX_CONCURRENCY,
            task_timeout: Self::DEFAULT_TASK_TIMEOUT,
            backoff_base: Self::DEFAULT_BACKOFF_BASE,
            backoff_max: Self::DEFAULT_BACKOFF_MAX,
            drain_timeout: Self::DEFAULT_DRAIN_TIMEOUT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.retry_max, 3);
        assert_eq!(cfg.max_concurrency, 1);
        assert_eq!(cfg.task_timeout, Duration::from_secs(600));
        assert_eq!(cfg.drain_timeout, Duration::from_secs(5));
    }

    #[test]
    fn retry_policy_mirrors_config() {
        let cfg = PipelineConfig {
            retry_max: 5,
            backoff_base: Duration::from_millis(10),
            backoff_max: Duration::from_millis(80),
            ..PipelineConfig::default()
        };
        let policy = cfg.retry_policy();
        assert_eq!(policy.retry_max, 5);
        assert_eq!(policy.backoff_base, Duration::from_millis(10));
        assert_eq!(policy.backoff_max, Duration::from_millis(80));
    }
}
