use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use db::DbPool;
use engine::dispatcher::WorkflowSource;
use engine::executor::ExecutionSink;
use engine::logger::LogSink;
use engine::models::{
    Approval, ApprovalStatus, Connection, ExecutionLog, ExecutionStatus, NodeExecution, NodeExecutionStatus,
    Workflow, WorkflowExecution, WorkflowNode, WorkflowSchedule, WorkflowTrigger,
};
use engine::scheduler::ScheduleStore;
use serde::de::Error as _;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

fn corrupt(msg: impl std::fmt::Display) -> db::DbError {
    db::DbError::CorruptJson(serde_json::Error::custom(msg))
}

/// The shape persisted in `workflows.definition`.
#[derive(Debug, Serialize, Deserialize)]
struct WorkflowDefinition {
    triggers: Vec<WorkflowTrigger>,
    nodes: Vec<WorkflowNode>,
    connections: Vec<Connection>,
}

fn row_to_workflow(row: db::models::WorkflowRow) -> Result<Workflow, db::DbError> {
    let def: WorkflowDefinition = serde_json::from_value(row.definition)?;
    Ok(Workflow {
        id: row.id,
        organization_id: row.organization_id,
        name: row.name,
        triggers: def.triggers,
        nodes: def.nodes,
        connections: def.connections,
        is_active: row.is_active,
        created_at: row.created_at,
    })
}

fn db_exec_status(s: ExecutionStatus) -> db::models::ExecutionStatus {
    match s {
        ExecutionStatus::Running => db::models::ExecutionStatus::Running,
        ExecutionStatus::Succeeded => db::models::ExecutionStatus::Succeeded,
        ExecutionStatus::Failed => db::models::ExecutionStatus::Failed,
        ExecutionStatus::PendingApproval => db::models::ExecutionStatus::PendingApproval,
        ExecutionStatus::Cancelled => db::models::ExecutionStatus::Cancelled,
    }
}

fn engine_exec_status(s: &str) -> Result<ExecutionStatus, db::DbError> {
    use std::str::FromStr;
    match db::models::ExecutionStatus::from_str(s) {
        Ok(db::models::ExecutionStatus::Running) => Ok(ExecutionStatus::Running),
        Ok(db::models::ExecutionStatus::Succeeded) => Ok(ExecutionStatus::Succeeded),
        Ok(db::models::ExecutionStatus::Failed) => Ok(ExecutionStatus::Failed),
        Ok(db::models::ExecutionStatus::PendingApproval) => Ok(ExecutionStatus::PendingApproval),
        Ok(db::models::ExecutionStatus::Cancelled) => Ok(ExecutionStatus::Cancelled),
        Err(e) => Err(corrupt(e)),
    }
}

fn row_to_execution(row: db::models::WorkflowExecutionRow) -> Result<WorkflowExecution, db::DbError> {
    Ok(WorkflowExecution {
        id: row.id,
        workflow_id: row.workflow_id,
        status: engine_exec_status(&row.status)?,
        input: row.input,
        output: row.output,
        started_at: row.started_at,
        finished_at: row.finished_at,
    })
}

fn node_status_str(s: NodeExecutionStatus) -> &'static str {
    match s {
        NodeExecutionStatus::Succeeded => "succeeded",
        NodeExecutionStatus::Failed => "failed",
        NodeExecutionStatus::Skipped => "skipped",
    }
}

fn row_to_node_execution(row: db::models::NodeExecutionRow) -> Result<NodeExecution, db::DbError> {
    use std::str::FromStr;
    let status = db::models::NodeExecutionStatus::from_str(&row.status)
        .map_err(corrupt)?;
    let status = match status {
        db::models::NodeExecutionStatus::Succeeded => NodeExecutionStatus::Succeeded,
        db::models::NodeExecutionStatus::Failed => NodeExecutionStatus::Failed,
        db::models::NodeExecutionStatus::Skipped => NodeExecutionStatus::Skipped,
    };
    Ok(NodeExecution {
        id: row.id,
        execution_id: row.execution_id,
        node_id: row.node_id,
        status,
        input: row.input,
        output: row.output,
        result_key: row.result_key,
        started_at: row.started_at,
        finished_at: row.finished_at,
    })
}

fn row_to_schedule(row: db::models::WorkflowScheduleRow) -> WorkflowSchedule {
    WorkflowSchedule {
        id: row.id,
        workflow_id: row.workflow_id,
        cron: row.cron,
        frequency: row.frequency.as_deref().and_then(parse_frequency),
        timezone: row.timezone,
        start_at: row.start_at,
        end_at: row.end_at,
        next_run_at: row.next_run_at,
        is_active: row.is_active,
        retry_count: row.retry_count,
        last_error: row.last_error,
        last_error_at: row.last_error_at,
        metadata: row.metadata,
    }
}

fn parse_frequency(s: &str) -> Option<nodes::config::ScheduleFrequency> {
    use nodes::config::ScheduleFrequency::*;
    match s.to_ascii_uppercase().as_str() {
        "HOURLY" => Some(Hourly),
        "DAILY" => Some(Daily),
        "WEEKLY" => Some(Weekly),
        "MONTHLY" => Some(Monthly),
        "YEARLY" => Some(Yearly),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// ExecutionSink
// ---------------------------------------------------------------------------

pub struct PgExecutionSink {
    pool: DbPool,
}

impl PgExecutionSink {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ExecutionSink for PgExecutionSink {
    async fn create_execution(&self, workflow_id: Uuid, input: Value) -> Result<WorkflowExecution, db::DbError> {
        let row = db::repository::executions::create_execution(&self.pool, workflow_id, input).await?;
        row_to_execution(row)
    }

    async fn update_execution_status(
        &self,
        execution_id: Uuid,
        status: ExecutionStatus,
        output: Option<Value>,
    ) -> Result<(), db::DbError> {
        let status = db_exec_status(status).to_string();
        db::repository::executions::update_execution_status(&self.pool, execution_id, &status, output).await
    }

    async fn insert_node_execution(&self, row: NodeExecution) -> Result<(), db::DbError> {
        let finished_at = row.finished_at.unwrap_or_else(Utc::now);
        db::repository::executions::insert_node_execution(
            &self.pool,
            row.id,
            row.execution_id,
            &row.node_id,
            row.input,
            row.output,
            node_status_str(row.status),
            row.result_key.as_deref(),
            row.started_at,
            finished_at,
        )
        .await?;
        Ok(())
    }

    async fn node_executions_for(&self, execution_id: Uuid) -> Result<Vec<NodeExecution>, db::DbError> {
        let rows = db::repository::executions::node_executions_for(&self.pool, execution_id).await?;
        rows.into_iter().map(row_to_node_execution).collect()
    }

    async fn create_approval(&self, approval: Approval) -> Result<(), db::DbError> {
        db::repository::approvals::create_approval(
            &self.pool,
            db::repository::approvals::NewApproval {
                id: approval.id,
                execution_id: approval.execution_id,
                node_id: approval.node_id,
                approver_ids: approval.approver_ids,
                expires_at: approval.expires_at,
            },
        )
        .await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// WorkflowSource
// ---------------------------------------------------------------------------

pub struct PgWorkflowSource {
    pool: DbPool,
}

impl PgWorkflowSource {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, id: Uuid) -> Result<Workflow, db::DbError> {
        let row = db::repository::workflows::get_workflow(&self.pool, id).await?;
        row_to_workflow(row)
    }

    pub async fn find_by_webhook_path(&self, path: &str) -> Result<Option<Workflow>, db::DbError> {
        match db::repository::workflows::find_by_webhook_path(&self.pool, path).await? {
            Some(row) => Ok(Some(row_to_workflow(row)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl WorkflowSource for PgWorkflowSource {
    async fn active_event_workflows(&self, organization_id: Uuid, module: &str) -> Result<Vec<Workflow>, db::DbError> {
        let rows =
            db::repository::workflows::active_event_workflows(&self.pool, organization_id, module).await?;
        rows.into_iter().map(row_to_workflow).collect()
    }
}

// ---------------------------------------------------------------------------
// ScheduleStore
// ---------------------------------------------------------------------------

pub struct PgScheduleStore {
    pool: DbPool,
}

impl PgScheduleStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ScheduleStore for PgScheduleStore {
    async fn due_schedules(&self, as_of: DateTime<Utc>, limit: i64) -> Result<Vec<WorkflowSchedule>, db::DbError> {
        let rows = db::repository::schedules::due_schedules(&self.pool, as_of, limit).await?;
        Ok(rows.into_iter().map(row_to_schedule).collect())
    }

    async fn mark_run_success(&self, schedule_id: Uuid, next_run_at: DateTime<Utc>) -> Result<(), db::DbError> {
        db::repository::schedules::mark_run_success(&self.pool, schedule_id, next_run_at).await
    }

    async fn mark_run_failure(
        &self,
        schedule_id: Uuid,
        next_run_at: DateTime<Utc>,
        retry_count: i32,
        error: &str,
    ) -> Result<(), db::DbError> {
        db::repository::schedules::mark_run_failure(&self.pool, schedule_id, next_run_at, retry_count, error).await
    }

    async fn deactivate(&self, schedule_id: Uuid) -> Result<(), db::DbError> {
        db::repository::schedules::deactivate(&self.pool, schedule_id).await
    }
}

// ---------------------------------------------------------------------------
// LogSink
// ---------------------------------------------------------------------------

pub struct PgLogSink {
    pool: DbPool,
}

impl PgLogSink {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LogSink for PgLogSink {
    async fn write(&self, log: ExecutionLog) -> Result<(), db::DbError> {
        let level = match log.level {
            engine::models::LogLevel::Info => "INFO",
            engine::models::LogLevel::Warn => "WARN",
            engine::models::LogLevel::Error => "ERROR",
        };
        db::repository::executions::insert_log(
            &self.pool,
            db::models::ExecutionLogRow {
                id: log.id,
                execution_id: log.execution_id,
                node_id: log.node_id,
                level: level.to_string(),
                message: log.message,
                created_at: log.created_at,
            },
        )
        .await
    }
}

// ---------------------------------------------------------------------------
// Approval resume helper
// ---------------------------------------------------------------------------

/// Not a port trait — `resume_after_approval` is driven by the API handler,
/// which needs the approval row itself (approver, expiry) before it can
/// decide whether to call into the executor at all.
pub struct PgApprovals {
    pool: DbPool,
}

impl PgApprovals {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, id: Uuid) -> Result<Approval, db::DbError> {
        let row = db::repository::approvals::get_approval(&self.pool, id).await?;
        row_to_approval(row)
    }

    pub async fn decide(&self, id: Uuid, approved: bool, decided_by: Uuid) -> Result<(), db::DbError> {
        let status = if approved { "approved" } else { "rejected" };
        db::repository::approvals::decide_approval(&self.pool, id, status, decided_by).await
    }

    /// Expire every pending approval past its deadline and cancel the
    /// execution each was blocking. Returns the expired approvals.
    pub async fn expire_overdue(&self) -> Result<Vec<Approval>, db::DbError> {
        let rows = db::repository::approvals::expire_overdue(&self.pool, Utc::now()).await?;
        let mut expired = Vec::with_capacity(rows.len());
        for row in rows {
            let approval = row_to_approval(row)?;
            db::repository::executions::update_execution_status(
                &self.pool,
                approval.execution_id,
                &db::models::ExecutionStatus::Cancelled.to_string(),
                None,
            )
            .await?;
            expired.push(approval);
        }
        Ok(expired)
    }
}

fn row_to_approval(row: db::models::ApprovalRow) -> Result<Approval, db::DbError> {
    use std::str::FromStr;
    let status = db::models::ApprovalStatus::from_str(&row.status)
        .map_err(corrupt)?;
    let status = match status {
        db::models::ApprovalStatus::Pending => ApprovalStatus::Pending,
        db::models::ApprovalStatus::Approved => ApprovalStatus::Approved,
        db::models::ApprovalStatus::Rejected => ApprovalStatus::Rejected,
        db::models::ApprovalStatus::Expired => ApprovalStatus::Expired,
    };
    Ok(Approval {
        id: row.id,
        execution_id: row.execution_id,
        node_id: row.node_id,
        approver_ids: row.approver_ids,
        status,
        decided_by: row.decided_by,
        expires_at: row.expires_at,
        created_at: row.created_at,
    })
}

/// Convenience bundle so callers (the job worker, the CLI, the API) don't
/// have to wire up four separate `Arc`s by hand.
#[derive(Clone)]
pub struct PgPorts {
    pub execution_sink: Arc<PgExecutionSink>,
    pub workflow_source: Arc<PgWorkflowSource>,
    pub schedule_store: Arc<PgScheduleStore>,
    pub log_sink: Arc<PgLogSink>,
}

impl PgPorts {
    pub fn new(pool: DbPool) -> Self {
        Self {
            execution_sink: Arc::new(PgExecutionSink::new(pool.clone())),
            workflow_source: Arc::new(PgWorkflowSource::new(pool.clone())),
            schedule_store: Arc::new(PgScheduleStore::new(pool.clone())),
            log_sink: Arc::new(PgLogSink::new(pool)),
        }
    }
}
