//! Worker configuration, read from the environment per spec.md §6.

use std::time::Duration;

/// Five env vars control both workers:
/// - `POLL_INTERVAL_MS`            — delay between empty polls.
/// - `BATCH_SIZE`                  — schedules claimed per scheduler tick.
/// - `MAX_CONCURRENT_EXECUTIONS`   — job-queue worker concurrency ceiling.
/// - `JOB_MAX_ATTEMPTS`            — default retry budget for a queued job.
/// - `APPROVAL_SWEEP_INTERVAL_MS`  — how often overdue approvals are expired.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub poll_interval: Duration,
    pub batch_size: i64,
    pub max_concurrent_executions: usize,
    pub job_max_attempts: i32,
    pub approval_sweep_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            batch_size: 20,
            max_concurrent_executions: 10,
            job_max_attempts: 3,
            approval_sweep_interval: Duration::from_secs(60),
        }
    }
}

impl WorkerConfig {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            poll_interval: env_millis("POLL_INTERVAL_MS", default.poll_interval),
            batch_size: env_i64("BATCH_SIZE", default.batch_size),
            max_concurrent_executions: env_usize("MAX_CONCURRENT_EXECUTIONS", default.max_concurrent_executions),
            job_max_attempts: env_i32("JOB_MAX_ATTEMPTS", default.job_max_attempts),
            approval_sweep_interval: env_millis("APPROVAL_SWEEP_INTERVAL_MS", default.approval_sweep_interval),
        }
    }
}

fn env_millis(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(default)
}

fn env_i64(key: &str, default: i64) -> i64 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_i32(key: &str, default: i32) -> i32 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}
