//! Generic record storage — backs `nodes::adapters::RecordStore` without any
//! model-specific business rule. `model`/`fields`/filtering by field are all
//! opaque JSON as far as this module is concerned.

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{models::RecordRow, DbError};

pub async fn create_record(
    pool: &PgPool,
    organization_id: Uuid,
    model: &str,
    fields: serde_json::Value,
) -> Result<RecordRow, DbError> {
    let id = Uuid::new_v4();
    let now = Utc::now();

    let row = sqlx::query_as!(
        RecordRow,
        r#"
        INSERT INTO records (id, organization_id, model, fields, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $5)
        RETURNING id, organization_id, model, fields, created_at, updated_at
        "#,
        id,
        organization_id,
        model,
        fields,
        now,
    )
    .fetch_one(pool)
    .await?;

    Ok(row)
}

pub async fn update_record(
    pool: &PgPool,
    organization_id: Uuid,
    model: &str,
    record_id: Uuid,
    fields: serde_json::Value,
) -> Result<RecordRow, DbError> {
    let row = sqlx::query_as!(
        RecordRow,
        r#"
        UPDATE records
        SET fields = fields || $1, updated_at = $2
        WHERE id = $3 AND organization_id = $4 AND model = $5
        RETURNING id, organization_id, model, fields, created_at, updated_at
        "#,
        fields,
        Utc::now(),
        record_id,
        organization_id,
        model,
    )
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)?;

    Ok(row)
}

/// All records of `model` for an organization. Condition-group filtering,
/// ordering, and pagination are applied by the caller in memory — the
/// predicate language lives in `nodes::resolver::condition`, not SQL, so
/// there is exactly one evaluator for it across QUERY nodes and FILTER nodes.
pub async fn find_all(pool: &PgPool, organization_id: Uuid, model: &str) -> Result<Vec<RecordRow>, DbError> {
    let rows = sqlx::query_as!(
        RecordRow,
        r#"
        SELECT id, organization_id, model, fields, created_at, updated_at
        FROM records
        WHERE organization_id = $1 AND model = $2
        ORDER BY created_at ASC
        "#,
        organization_id,
        model,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
