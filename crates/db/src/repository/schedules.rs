//! Workflow schedule repository functions.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{models::WorkflowScheduleRow, DbError};

/// Fields needed to create a schedule. Either `cron` or `frequency` should be
/// set; `engine::scheduler::Scheduler::next_fire` prefers `cron` when both
/// are, and defaults to a 5-minute poll when neither is.
pub struct NewSchedule {
    pub workflow_id: Uuid,
    pub cron: Option<String>,
    pub frequency: Option<String>,
    pub timezone: Option<String>,
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
    pub next_run_at: DateTime<Utc>,
}

pub async fn create_schedule(pool: &PgPool, new: NewSchedule) -> Result<WorkflowScheduleRow, DbError> {
    let id = Uuid::new_v4();

    let row = sqlx::query_as!(
        WorkflowScheduleRow,
        r#"
        INSERT INTO workflow_schedules
            (id, workflow_id, cron, frequency, timezone, start_at, end_at, next_run_at, is_active)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, true)
        RETURNING id, workflow_id, cron, frequency, timezone, start_at, end_at, next_run_at, is_active,
                  retry_count, last_error, last_error_at, metadata
        "#,
        id,
        new.workflow_id,
        new.cron,
        new.frequency,
        new.timezone,
        new.start_at,
        new.end_at,
        new.next_run_at,
    )
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Active schedules due to fire at or before `as_of`, earliest first. Backs
/// `engine::scheduler::ScheduleStore::due_schedules`.
pub async fn due_schedules(pool: &PgPool, as_of: DateTime<Utc>, limit: i64) -> Result<Vec<WorkflowScheduleRow>, DbError> {
    let rows = sqlx::query_as!(
        WorkflowScheduleRow,
        r#"
        SELECT id, workflow_id, cron, frequency, timezone, start_at, end_at, next_run_at, is_active,
               retry_count, last_error, last_error_at, metadata
        FROM workflow_schedules
        WHERE is_active
          AND next_run_at <= $1
          AND (start_at IS NULL OR start_at <= $1)
          AND (end_at IS NULL OR end_at > $1)
        ORDER BY next_run_at ASC
        LIMIT $2
        "#,
        as_of,
        limit,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Record a successful fire: advance `next_run_at` and clear retry state.
/// Backs `ScheduleStore::mark_run_success`.
pub async fn mark_run_success(pool: &PgPool, schedule_id: Uuid, next_run_at: DateTime<Utc>) -> Result<(), DbError> {
    sqlx::query!(
        r#"
        UPDATE workflow_schedules
        SET next_run_at = $1, retry_count = 0, last_error = NULL, last_error_at = NULL
        WHERE id = $2
        "#,
        next_run_at,
        schedule_id,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Record a failed fire: bump `retry_count`, stamp the error, and push
/// `next_run_at` out to the backoff target. Backs
/// `ScheduleStore::mark_run_failure`.
pub async fn mark_run_failure(
    pool: &PgPool,
    schedule_id: Uuid,
    next_run_at: DateTime<Utc>,
    retry_count: i32,
    error: &str,
) -> Result<(), DbError> {
    sqlx::query!(
        r#"
        UPDATE workflow_schedules
        SET next_run_at = $1, retry_count = $2, last_error = $3, last_error_at = $4
        WHERE id = $5
        "#,
        next_run_at,
        retry_count,
        error,
        Utc::now(),
        schedule_id,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Deactivate a schedule whose next candidate run would exceed `end_at`.
/// Backs `ScheduleStore::deactivate`.
pub async fn deactivate(pool: &PgPool, schedule_id: Uuid) -> Result<(), DbError> {
    sqlx::query!(
        "UPDATE workflow_schedules SET is_active = false WHERE id = $1",
        schedule_id,
    )
    .execute(pool)
    .await?;

    Ok(())
}
