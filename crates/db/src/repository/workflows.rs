//! Workflow CRUD operations.

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{DbError, models::WorkflowRow};

/// Everything needed to insert a workflow row. `trigger_type`/`trigger_module`/
/// `trigger_event_type`/`webhook_path` are denormalized out of `definition`
/// so the webhook handler and event dispatcher can look workflows up by
/// indexed column instead of scanning every row's JSON.
pub struct NewWorkflow<'a> {
    pub organization_id: Uuid,
    pub name: &'a str,
    pub trigger_type: &'a str,
    pub trigger_module: Option<&'a str>,
    pub trigger_event_type: Option<&'a str>,
    pub webhook_path: Option<&'a str>,
    pub definition: serde_json::Value,
}

/// Insert a new workflow into the database.
pub async fn create_workflow(pool: &PgPool, new: NewWorkflow<'_>) -> Result<WorkflowRow, DbError> {
    let id = Uuid::new_v4();
    let now = Utc::now();

    let row = sqlx::query_as!(
        WorkflowRow,
        r#"
        INSERT INTO workflows
            (id, organization_id, name, trigger_type, trigger_module, trigger_event_type,
             webhook_path, definition, is_active, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, true, $9)
        RETURNING id, organization_id, name, trigger_type, trigger_module, trigger_event_type,
                  webhook_path, definition, is_active, created_at
        "#,
        id,
        new.organization_id,
        new.name,
        new.trigger_type,
        new.trigger_module,
        new.trigger_event_type,
        new.webhook_path,
        new.definition,
        now,
    )
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Fetch a single workflow by its primary key.
pub async fn get_workflow(pool: &PgPool, id: Uuid) -> Result<WorkflowRow, DbError> {
    let row = sqlx::query_as!(
        WorkflowRow,
        r#"
        SELECT id, organization_id, name, trigger_type, trigger_module, trigger_event_type,
               webhook_path, definition, is_active, created_at
        FROM workflows WHERE id = $1
        "#,
        id,
    )
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)?;

    Ok(row)
}

/// Return all workflows ordered by creation time (newest first).
pub async fn list_workflows(pool: &PgPool) -> Result<Vec<WorkflowRow>, DbError> {
    let rows = sqlx::query_as!(
        WorkflowRow,
        r#"
        SELECT id, organization_id, name, trigger_type, trigger_module, trigger_event_type,
               webhook_path, definition, is_active, created_at
        FROM workflows ORDER BY created_at DESC
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Active workflows in `organization_id` with an `event` trigger matching
/// `module`. Backs `engine::dispatcher::WorkflowSource`. `trigger_module`
/// is a coarse, indexed pre-filter; the dispatcher does the fine-grained
/// entity_type/event_type/condition matching in memory over the full
/// `Workflow.triggers` list once these rows are deserialized.
pub async fn active_event_workflows(
    pool: &PgPool,
    organization_id: Uuid,
    module: &str,
) -> Result<Vec<WorkflowRow>, DbError> {
    let rows = sqlx::query_as!(
        WorkflowRow,
        r#"
        SELECT id, organization_id, name, trigger_type, trigger_module, trigger_event_type,
               webhook_path, definition, is_active, created_at
        FROM workflows
        WHERE is_active AND organization_id = $1 AND trigger_type = 'event' AND trigger_module = $2
        "#,
        organization_id,
        module,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Active workflow whose webhook `path` matches. Backs the webhook handler.
pub async fn find_by_webhook_path(pool: &PgPool, path: &str) -> Result<Option<WorkflowRow>, DbError> {
    let row = sqlx::query_as!(
        WorkflowRow,
        r#"
        SELECT id, organization_id, name, trigger_type, trigger_module, trigger_event_type,
               webhook_path, definition, is_active, created_at
        FROM workflows
        WHERE is_active AND trigger_type = 'webhook' AND webhook_path = $1
        "#,
        path,
    )
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Permanently delete a workflow by its primary key.
///
/// Returns `DbError::NotFound` if no row was deleted.
pub async fn delete_workflow(pool: &PgPool, id: Uuid) -> Result<(), DbError> {
    let result = sqlx::query!("DELETE FROM workflows WHERE id = $1", id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }

    Ok(())
}
