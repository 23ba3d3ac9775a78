use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;
use super::AppState;
use db::repository::workflows::{self as wf_repo, NewWorkflow};
use engine::{Connection, Trigger, WorkflowNode, WorkflowTrigger};
use nodes::NodeKind;

/// The shape a client posts to create a workflow — `organization_id` plus
/// the fields `workflows.definition` stores as one JSONB document.
#[derive(Deserialize)]
pub struct CreateWorkflowDto {
    pub organization_id: Uuid,
    pub name: String,
    pub trigger: Trigger,
    pub nodes: Vec<WorkflowNode>,
    pub connections: Vec<Connection>,
}

pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<db::models::WorkflowRow>>, StatusCode> {
    match wf_repo::list_workflows(&state.pool).await {
        Ok(workflows) => Ok(Json(workflows)),
        Err(_) => Err(StatusCode::INTERNAL_SERVER_ERROR),
    }
}

pub async fn get(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<db::models::WorkflowRow>, StatusCode> {
    match wf_repo::get_workflow(&state.pool, id).await {
        Ok(wf) => Ok(Json(wf)),
        Err(db::DbError::NotFound) => Err(StatusCode::NOT_FOUND),
        Err(_) => Err(StatusCode::INTERNAL_SERVER_ERROR),
    }
}

pub async fn create(
    State(state): State<AppState>,
    Json(payload): Json<CreateWorkflowDto>,
) -> Result<(StatusCode, Json<db::models::WorkflowRow>), StatusCode> {
    let (trigger_type, trigger_module, trigger_event_type, webhook_path) = match &payload.trigger {
        Trigger::Webhook { path } => ("webhook", None, None, Some(path.as_str())),
        Trigger::Manual => ("manual", None, None, None),
        Trigger::Event { module, event_type, .. } => ("event", Some(module.as_str()), Some(event_type.as_str()), None),
        Trigger::Scheduled => ("scheduled", None, None, None),
    };

    let trigger_node_id = payload
        .nodes
        .iter()
        .find(|n| matches!(n.kind, NodeKind::Trigger))
        .map(|n| n.id.clone())
        .unwrap_or_else(|| "trigger".to_string());
    let trigger = WorkflowTrigger::new(trigger_node_id, payload.trigger.clone());

    let definition: Value = serde_json::json!({
        "triggers": [trigger],
        "nodes": payload.nodes,
        "connections": payload.connections,
    });

    let new = NewWorkflow {
        organization_id: payload.organization_id,
        name: &payload.name,
        trigger_type,
        trigger_module,
        trigger_event_type,
        webhook_path,
        definition,
    };

    match wf_repo::create_workflow(&state.pool, new).await {
        Ok(wf) => Ok((StatusCode::CREATED, Json(wf))),
        Err(_) => Err(StatusCode::INTERNAL_SERVER_ERROR),
    }
}

pub async fn delete(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<StatusCode, StatusCode> {
    match wf_repo::delete_workflow(&state.pool, id).await {
        Ok(_) => Ok(StatusCode::NO_CONTENT),
        Err(db::DbError::NotFound) => Err(StatusCode::NOT_FOUND),
        Err(_) => Err(StatusCode::INTERNAL_SERVER_ERROR),
    }
}
