use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use engine::scheduler::Scheduler;
use nodes::adapters::{SystemClock, SystemCronParser};
use nodes::config::ScheduleFrequency;
use queue::adapters::PgScheduleStore;
use serde::Deserialize;
use uuid::Uuid;

use super::AppState;

#[derive(Deserialize)]
pub struct CreateScheduleDto {
    pub cron: Option<String>,
    pub frequency: Option<ScheduleFrequency>,
    pub timezone: Option<String>,
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
}

pub async fn create(
    Path(workflow_id): Path<Uuid>,
    State(state): State<AppState>,
    Json(payload): Json<CreateScheduleDto>,
) -> Result<(StatusCode, Json<db::models::WorkflowScheduleRow>), StatusCode> {
    let scheduler = Scheduler::new(
        Arc::new(PgScheduleStore::new(state.pool.clone())),
        Arc::new(SystemCronParser),
        Arc::new(SystemClock),
    );

    let draft = engine::models::WorkflowSchedule {
        id: Uuid::nil(),
        workflow_id,
        cron: payload.cron.clone(),
        frequency: payload.frequency,
        timezone: payload.timezone.clone(),
        start_at: payload.start_at,
        end_at: payload.end_at,
        next_run_at: Utc::now(),
        is_active: true,
        retry_count: 0,
        last_error: None,
        last_error_at: None,
        metadata: serde_json::Value::Null,
    };

    let next_run_at = match scheduler.next_fire(&draft, payload.start_at.unwrap_or_else(Utc::now)) {
        Ok(t) => t,
        Err(_) => return Err(StatusCode::BAD_REQUEST),
    };

    let new = db::repository::schedules::NewSchedule {
        workflow_id,
        cron: payload.cron,
        frequency: payload.frequency.map(|f| format!("{f:?}").to_uppercase()),
        timezone: payload.timezone,
        start_at: payload.start_at,
        end_at: payload.end_at,
        next_run_at,
    };

    match db::repository::schedules::create_schedule(&state.pool, new).await {
        Ok(row) => Ok((StatusCode::CREATED, Json(row))),
        Err(_) => Err(StatusCode::INTERNAL_SERVER_ERROR),
    }
}
