use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::Value;
use uuid::Uuid;
use super::AppState;
use db::repository::jobs as job_repo;

#[derive(serde::Deserialize)]
pub struct ExecuteWorkflowDto {
    #[serde(default)]
    pub input: Value,
}

/// Enqueue a manual execution. The `workflow_executions` row itself is
/// created by the job worker's `WorkflowExecutor::run` once it picks this
/// job up — see `db::models::JobRow`.
pub async fn execute(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(payload): Json<ExecuteWorkflowDto>,
) -> Result<(StatusCode, Json<db::models::JobRow>), StatusCode> {
    match job_repo::enqueue_job(&state.pool, id, payload.input).await {
        Ok(job) => Ok((StatusCode::ACCEPTED, Json(job))),
        Err(_) => Err(StatusCode::INTERNAL_SERVER_ERROR),
    }
}

pub async fn get(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<db::models::WorkflowExecutionRow>, StatusCode> {
    match db::repository::executions::get_execution(&state.pool, id).await {
        Ok(exec) => Ok(Json(exec)),
        Err(db::DbError::NotFound) => Err(StatusCode::NOT_FOUND),
        Err(_) => Err(StatusCode::INTERNAL_SERVER_ERROR),
    }
}
