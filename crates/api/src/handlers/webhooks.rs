use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::Value;
use super::AppState;
use db::repository::{jobs as job_repo, workflows as wf_repo};

pub async fn handle_webhook(
    Path(path): Path<String>,
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> Result<(StatusCode, Json<Value>), StatusCode> {
    let wf_row = match wf_repo::find_by_webhook_path(&state.pool, &path).await {
        Ok(Some(w)) => w,
        Ok(None) => return Err(StatusCode::NOT_FOUND),
        Err(_) => return Err(StatusCode::INTERNAL_SERVER_ERROR),
    };

    match job_repo::enqueue_job(&state.pool, wf_row.id, payload).await {
        Ok(_) => Ok((StatusCode::ACCEPTED, Json(serde_json::json!({"message": "webhook accepted"})))),
        Err(_) => Err(StatusCode::INTERNAL_SERVER_ERROR),
    }
}
