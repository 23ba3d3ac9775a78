//! Scheduler worker — polls `workflow_schedules` for rows due to fire and
//! enqueues a job per due schedule, then advances `next_run_at` so the same
//! schedule isn't picked up again on the following tick.
//!
//! Also sweeps overdue approvals on its own interval, per
//! `WorkerConfig::approval_sweep_interval` (spec.md §6).

use std::sync::Arc;

use engine::scheduler::Scheduler;
use nodes::adapters::{SystemClock, SystemCronParser};
use tracing::{error, info, warn};

use crate::adapters::{PgApprovals, PgScheduleStore};
use crate::config::WorkerConfig;
use crate::error::QueueError;

pub struct SchedulerWorker {
    pool: db::DbPool,
    scheduler: Scheduler,
    approvals: PgApprovals,
    config: WorkerConfig,
}

impl SchedulerWorker {
    pub fn new(pool: db::DbPool, config: WorkerConfig) -> Self {
        let store = Arc::new(PgScheduleStore::new(pool.clone()));
        let scheduler = Scheduler::new(store, Arc::new(SystemCronParser), Arc::new(SystemClock));
        Self {
            approvals: PgApprovals::new(pool.clone()),
            pool,
            scheduler,
            config,
        }
    }

    pub async fn run(self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        info!("scheduler worker started");
        let mut next_sweep = tokio::time::Instant::now() + self.config.approval_sweep_interval;

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("scheduler worker shutting down");
                        return;
                    }
                }
                _ = tokio::time::sleep_until(next_sweep) => {
                    if let Err(e) = self.sweep_approvals().await {
                        error!("approval sweep failed: {e}");
                    }
                    next_sweep = tokio::time::Instant::now() + self.config.approval_sweep_interval;
                }
                fired = self.tick() => {
                    match fired {
                        Ok(0) => tokio::time::sleep(self.config.poll_interval).await,
                        Ok(_) => continue,
                        Err(e) => {
                            error!("scheduler worker tick failed: {e}");
                            tokio::time::sleep(self.config.poll_interval).await;
                        }
                    }
                }
            }
        }
    }

    /// Enqueue a job for every schedule due right now. Returns the count fired.
    async fn tick(&self) -> Result<usize, QueueError> {
        let due = self.scheduler.due(self.config.batch_size).await?;

        for schedule in &due {
            let execution_input = serde_json::json!({ "scheduleId": schedule.id });
            match db::repository::jobs::enqueue_job(&self.pool, schedule.workflow_id, execution_input).await {
                Ok(_) => {
                    if let Err(e) = self.scheduler.mark_run_success(schedule).await {
                        warn!(schedule_id = %schedule.id, "failed to advance schedule: {e}");
                    }
                }
                Err(e) => {
                    warn!(schedule_id = %schedule.id, "failed to enqueue job: {e}");
                    if let Err(e) = self.scheduler.mark_run_failure(schedule, e.to_string()).await {
                        warn!(schedule_id = %schedule.id, "failed to record schedule failure: {e}");
                    }
                }
            }
        }

        Ok(due.len())
    }

    async fn sweep_approvals(&self) -> Result<(), QueueError> {
        let expired = self.approvals.expire_overdue().await?;
        if !expired.is_empty() {
            info!(count = expired.len(), "expired overdue approvals");
        }
        Ok(())
    }
}

pub fn spawn(pool: db::DbPool, config: WorkerConfig, shutdown: tokio::sync::watch::Receiver<bool>) -> tokio::task::JoinHandle<()> {
    let worker = SchedulerWorker::new(pool, config);
    tokio::spawn(async move { worker.run(shutdown).await })
}
