//! Approval repository functions — the `APPROVAL` node's pause/resume state.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{models::ApprovalRow, DbError};

pub struct NewApproval {
    pub id: Uuid,
    pub execution_id: Uuid,
    pub node_id: String,
    pub approver_ids: Vec<Uuid>,
    pub expires_at: Option<DateTime<Utc>>,
}

pub async fn create_approval(pool: &PgPool, new: NewApproval) -> Result<ApprovalRow, DbError> {
    let now = Utc::now();

    let row = sqlx::query_as!(
        ApprovalRow,
        r#"
        INSERT INTO approvals (id, execution_id, node_id, approver_ids, status, decided_by, expires_at, created_at)
        VALUES ($1, $2, $3, $4, 'pending', NULL, $5, $6)
        RETURNING id, execution_id, node_id, approver_ids, status, decided_by, expires_at, created_at
        "#,
        new.id,
        new.execution_id,
        new.node_id,
        &new.approver_ids,
        new.expires_at,
        now,
    )
    .fetch_one(pool)
    .await?;

    Ok(row)
}

pub async fn get_approval(pool: &PgPool, id: Uuid) -> Result<ApprovalRow, DbError> {
    let row = sqlx::query_as!(
        ApprovalRow,
        r#"SELECT id, execution_id, node_id, approver_ids, status, decided_by, expires_at, created_at
           FROM approvals WHERE id = $1"#,
        id,
    )
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)?;

    Ok(row)
}

/// Record an approver's decision. `status` is `"approved"` or `"rejected"`.
pub async fn decide_approval(pool: &PgPool, id: Uuid, status: &str, decided_by: Uuid) -> Result<(), DbError> {
    let result = sqlx::query!(
        r#"
        UPDATE approvals
        SET status = $1, decided_by = $2
        WHERE id = $3 AND status = 'pending'
        "#,
        status,
        decided_by,
        id,
    )
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }

    Ok(())
}

/// Expire every pending approval whose deadline has passed. Returns the
/// expired rows so the caller can cancel their executions.
pub async fn expire_overdue(pool: &PgPool, as_of: DateTime<Utc>) -> Result<Vec<ApprovalRow>, DbError> {
    let rows = sqlx::query_as!(
        ApprovalRow,
        r#"
        UPDATE approvals
        SET status = 'expired'
        WHERE status = 'pending' AND expires_at IS NOT NULL AND expires_at <= $1
        RETURNING id, execution_id, node_id, approver_ids, status, decided_by, expires_at, created_at
        "#,
        as_of,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
