use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use engine::executor::{ExecutorConfig, NodeRegistry, WorkflowExecutor};
use engine::logger::Logger;
use nodes::adapters::SystemClock;
use queue::adapters::{LoggingEmailSink, PgApprovals, PgExecutionSink, PgLogSink, PgRecordStore, PgWorkflowSource};
use serde::Deserialize;
use uuid::Uuid;

use super::AppState;

#[derive(Deserialize)]
pub struct DecideApprovalDto {
    pub approved: bool,
    pub decided_by: Uuid,
}

pub async fn get(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<engine::models::Approval>, StatusCode> {
    let approvals = PgApprovals::new(state.pool.clone());
    match approvals.get(id).await {
        Ok(approval) => Ok(Json(approval)),
        Err(db::DbError::NotFound) => Err(StatusCode::NOT_FOUND),
        Err(_) => Err(StatusCode::INTERNAL_SERVER_ERROR),
    }
}

/// Record an approver's decision and, if it resolves the pause, resume the
/// execution inline. The approval and the execution it blocks both live in
/// Postgres, so a second process picking up the next job never races this.
pub async fn decide(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(payload): Json<DecideApprovalDto>,
) -> Result<StatusCode, StatusCode> {
    let approvals = PgApprovals::new(state.pool.clone());

    let approval = match approvals.get(id).await {
        Ok(a) => a,
        Err(db::DbError::NotFound) => return Err(StatusCode::NOT_FOUND),
        Err(_) => return Err(StatusCode::INTERNAL_SERVER_ERROR),
    };

    if approvals.decide(id, payload.approved, payload.decided_by).await.is_err() {
        return Err(StatusCode::CONFLICT);
    }

    let exec_row = match db::repository::executions::get_execution(&state.pool, approval.execution_id).await {
        Ok(e) => e,
        Err(_) => return Err(StatusCode::INTERNAL_SERVER_ERROR),
    };

    let workflow_source = PgWorkflowSource::new(state.pool.clone());
    let workflow = match workflow_source.get(exec_row.workflow_id).await {
        Ok(w) => w,
        Err(_) => return Err(StatusCode::INTERNAL_SERVER_ERROR),
    };

    let executor = WorkflowExecutor::new(
        NodeRegistry::new(),
        Arc::new(PgExecutionSink::new(state.pool.clone())),
        ExecutorConfig::default(),
        Arc::new(LoggingEmailSink),
        None,
        Arc::new(PgRecordStore::new(state.pool.clone())),
        Arc::new(SystemClock),
        Arc::new(Logger::new(Arc::new(PgLogSink::new(state.pool.clone())))),
    );

    match executor
        .resume_after_approval(&workflow, approval.execution_id, &approval.node_id, payload.approved)
        .await
    {
        Ok(_) => Ok(StatusCode::NO_CONTENT),
        Err(_) => Err(StatusCode::INTERNAL_SERVER_ERROR),
    }
}
