//! Execution, node-execution, and execution-log repository functions.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    models::{ExecutionLogRow, NodeExecutionRow, WorkflowExecutionRow},
    DbError,
};

// ---------------------------------------------------------------------------
// workflow_executions
// ---------------------------------------------------------------------------

/// Create a new workflow execution record in `running` status.
pub async fn create_execution(
    pool: &PgPool,
    workflow_id: Uuid,
    input: serde_json::Value,
) -> Result<WorkflowExecutionRow, DbError> {
    let id = Uuid::new_v4();
    let now = Utc::now();

    let row = sqlx::query_as!(
        WorkflowExecutionRow,
        r#"
        INSERT INTO workflow_executions (id, workflow_id, status, input, output, started_at)
        VALUES ($1, $2, 'running', $3, NULL, $4)
        RETURNING id, workflow_id, status, input, output, started_at, finished_at
        "#,
        id,
        workflow_id,
        input,
        now,
    )
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Fetch a single workflow execution by its primary key.
pub async fn get_execution(pool: &PgPool, id: Uuid) -> Result<WorkflowExecutionRow, DbError> {
    let row = sqlx::query_as!(
        WorkflowExecutionRow,
        r#"SELECT id, workflow_id, status, input, output, started_at, finished_at
           FROM workflow_executions WHERE id = $1"#,
        id,
    )
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)?;

    Ok(row)
}

/// Update the `status` (and `output`) of a workflow execution. `finished_at`
/// is set whenever `status` is a terminal one (anything but `running` or
/// `pending_approval`).
pub async fn update_execution_status(
    pool: &PgPool,
    execution_id: Uuid,
    status: &str,
    output: Option<serde_json::Value>,
) -> Result<(), DbError> {
    let terminal = !matches!(status, "running" | "pending_approval");
    let finished_at = terminal.then(Utc::now);

    sqlx::query!(
        r#"
        UPDATE workflow_executions
        SET status = $1, output = COALESCE($2, output), finished_at = COALESCE($3, finished_at)
        WHERE id = $4
        "#,
        status,
        output,
        finished_at,
        execution_id,
    )
    .execute(pool)
    .await?;

    Ok(())
}

// ---------------------------------------------------------------------------
// node_executions
// ---------------------------------------------------------------------------

/// Insert a completed node execution record.
#[allow(clippy::too_many_arguments)]
pub async fn insert_node_execution(
    pool: &PgPool,
    id: Uuid,
    execution_id: Uuid,
    node_id: &str,
    input: serde_json::Value,
    output: Option<serde_json::Value>,
    status: &str,
    result_key: Option<&str>,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
) -> Result<NodeExecutionRow, DbError> {
    let row = sqlx::query_as!(
        NodeExecutionRow,
        r#"
        INSERT INTO node_executions
            (id, execution_id, node_id, input, output, status, result_key, started_at, finished_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING id, execution_id, node_id, input, output, status, result_key, started_at, finished_at
        "#,
        id,
        execution_id,
        node_id,
        input,
        output,
        status,
        result_key,
        started_at,
        finished_at,
    )
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// All node executions for a given workflow execution, oldest first. Backs
/// `resumeAfterApproval`'s `RunState` rebuild.
pub async fn node_executions_for(pool: &PgPool, execution_id: Uuid) -> Result<Vec<NodeExecutionRow>, DbError> {
    let rows = sqlx::query_as!(
        NodeExecutionRow,
        r#"
        SELECT id, execution_id, node_id, input, output, status, result_key, started_at, finished_at
        FROM node_executions
        WHERE execution_id = $1
        ORDER BY started_at ASC
        "#,
        execution_id,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

// ---------------------------------------------------------------------------
// execution_logs
// ---------------------------------------------------------------------------

/// Append an execution log line. Best-effort from the caller's side
/// (`engine::logger::Logger` already swallows this error).
pub async fn insert_log(pool: &PgPool, log: ExecutionLogRow) -> Result<(), DbError> {
    sqlx::query!(
        r#"
        INSERT INTO execution_logs (id, execution_id, node_id, level, message, created_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
        log.id,
        log.execution_id,
        log.node_id,
        log.level,
        log.message,
        log.created_at,
    )
    .execute(pool)
    .await?;

    Ok(())
}
