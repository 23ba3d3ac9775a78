//! Job-queue worker — claims rows from `job_queue` (enqueued by the API's
//! fire-and-forget execute/webhook handlers) and drives each one through a
//! `WorkflowExecutor`.
//!
//! Node-level retries already happen inside `WorkflowExecutor::run`; a job
//! is only retried at this level when something fails before or around the
//! executor itself (e.g. a transient database error resolving the
//! workflow), mirroring the teacher's `fetch_next_job` / `fail_job` split.

use std::sync::Arc;

use engine::executor::{ExecutionOutcome, ExecutorConfig, NodeRegistry, TriggerInput, WorkflowExecutor};
use engine::logger::Logger;
use engine::EngineError;
use nodes::adapters::SystemClock;
use tracing::{error, info, warn};

use crate::adapters::{LoggingEmailSink, PgExecutionSink, PgLogSink, PgRecordStore, PgWorkflowSource};
use crate::config::WorkerConfig;
use crate::error::QueueError;

pub struct JobWorker {
    pool: db::DbPool,
    workflow_source: Arc<PgWorkflowSource>,
    executor: WorkflowExecutor,
    config: WorkerConfig,
}

impl JobWorker {
    pub fn new(pool: db::DbPool, config: WorkerConfig) -> Self {
        let executor = WorkflowExecutor::new(
            NodeRegistry::new(),
            Arc::new(PgExecutionSink::new(pool.clone())),
            ExecutorConfig::default(),
            Arc::new(LoggingEmailSink),
            None,
            Arc::new(PgRecordStore::new(pool.clone())),
            Arc::new(SystemClock),
            Arc::new(Logger::new(Arc::new(PgLogSink::new(pool.clone())))),
        );

        Self {
            workflow_source: Arc::new(PgWorkflowSource::new(pool.clone())),
            pool,
            executor,
            config,
        }
    }

    /// Poll forever until `shutdown` fires.
    pub async fn run(self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        info!("job worker started");
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("job worker shutting down");
                        return;
                    }
                }
                processed = self.tick() => {
                    match processed {
                        Ok(true) => continue,
                        Ok(false) => tokio::time::sleep(self.config.poll_interval).await,
                        Err(e) => {
                            error!("job worker tick failed: {e}");
                            tokio::time::sleep(self.config.poll_interval).await;
                        }
                    }
                }
            }
        }
    }

    /// Claim and process one job. Returns `true` if a job was found.
    async fn tick(&self) -> Result<bool, QueueError> {
        let Some(job) = db::repository::jobs::fetch_next_job(&self.pool).await? else {
            return Ok(false);
        };

        match self.process(&job).await {
            Ok(()) => {
                db::repository::jobs::complete_job(&self.pool, job.id).await?;
            }
            Err(e) => {
                warn!(job_id = %job.id, "job processing failed: {e}");
                db::repository::jobs::fail_job(&self.pool, job.id, self.config.job_max_attempts).await?;
            }
        }

        Ok(true)
    }

    async fn process(&self, job: &db::models::JobRow) -> Result<(), QueueError> {
        let workflow = self.workflow_source.get(job.workflow_id).await?;

        if !workflow.is_active {
            return Err(QueueError::Engine(EngineError::WorkflowNotFound(workflow.id)));
        }

        let input = TriggerInput {
            payload: job.payload.clone(),
            user: None,
            organization: None,
            trigger: None,
        };

        let outcome = self.executor.run(&workflow, input).await?;

        let execution_id = match &outcome {
            ExecutionOutcome::Completed { execution_id, .. } => *execution_id,
            ExecutionOutcome::Paused { execution_id, .. } => *execution_id,
        };
        db::repository::jobs::set_execution_id(&self.pool, job.id, execution_id).await?;

        info!(job_id = %job.id, workflow_id = %job.workflow_id, ?outcome, "workflow execution finished");
        Ok(())
    }
}

/// Spawn a `JobWorker`, returning its join handle.
pub fn spawn(pool: db::DbPool, config: WorkerConfig, shutdown: tokio::sync::watch::Receiver<bool>) -> tokio::task::JoinHandle<()> {
    let worker = JobWorker::new(pool, config);
    tokio::spawn(async move { worker.run(shutdown).await })
}
