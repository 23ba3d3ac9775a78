//! Scheduler — computes each `WorkflowSchedule`'s next fire time and surfaces
//! due schedules to the scheduler worker. Pure and testable: all time and
//! persistence access is injected.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Months, Utc};
use nodes::adapters::{Clock, CronParser};
use nodes::config::ScheduleFrequency;
use uuid::Uuid;

use crate::models::WorkflowSchedule;
use crate::EngineError;

#[async_trait]
pub trait ScheduleStore: Send + Sync {
    async fn due_schedules(&self, as_of: DateTime<Utc>, limit: i64) -> Result<Vec<WorkflowSchedule>, db::DbError>;

    /// Advance `next_run_at` and clear the retry/error state after a
    /// successful fire.
    async fn mark_run_success(&self, schedule_id: Uuid, next_run_at: DateTime<Utc>) -> Result<(), db::DbError>;

    /// Record a failed fire: bump `retry_count`, stamp `last_error`/
    /// `last_error_at`, and push `next_run_at` out to the backoff target.
    async fn mark_run_failure(
        &self,
        schedule_id: Uuid,
        next_run_at: DateTime<Utc>,
        retry_count: i32,
        error: &str,
    ) -> Result<(), db::DbError>;

    /// Deactivate a schedule whose next candidate run would exceed `end_at`.
    async fn deactivate(&self, schedule_id: Uuid) -> Result<(), db::DbError>;
}

pub struct Scheduler {
    store: Arc<dyn ScheduleStore>,
    cron_parser: Arc<dyn CronParser>,
    clock: Arc<dyn Clock>,
}

impl Scheduler {
    pub fn new(store: Arc<dyn ScheduleStore>, cron_parser: Arc<dyn CronParser>, clock: Arc<dyn Clock>) -> Self {
        Self { store, cron_parser, clock }
    }

    /// Compute the next fire time strictly after `from`. When both `cron` and
    /// `frequency` are set, `cron` wins (Open Question (a)).
    pub fn next_fire(&self, schedule: &WorkflowSchedule, from: DateTime<Utc>) -> Result<DateTime<Utc>, EngineError> {
        if let Some(cron) = &schedule.cron {
            return self
                .cron_parser
                .next(cron, from, schedule.timezone.as_deref())
                .map_err(|e| EngineError::DefinitionError(e.to_string()));
        }

        match schedule.frequency {
            Some(ScheduleFrequency::Hourly) => Ok(from + chrono::Duration::hours(1)),
            Some(ScheduleFrequency::Daily) => Ok(from + chrono::Duration::days(1)),
            Some(ScheduleFrequency::Weekly) => Ok(from + chrono::Duration::weeks(1)),
            Some(ScheduleFrequency::Monthly) => from
                .checked_add_months(Months::new(1))
                .ok_or_else(|| EngineError::DefinitionError("monthly schedule overflowed".into())),
            Some(ScheduleFrequency::Yearly) => from
                .checked_add_months(Months::new(12))
                .ok_or_else(|| EngineError::DefinitionError("yearly schedule overflowed".into())),
            // Neither cron nor frequency is a perfectly valid schedule state
            // (e.g. a one-off scheduled for `start_at` with no recurrence) —
            // it just re-checks every 5 minutes rather than never again.
            None => Ok(from + chrono::Duration::minutes(5)),
        }
    }

    /// Fetch schedules due as of the injected clock's current time.
    pub async fn due(&self, limit: i64) -> Result<Vec<WorkflowSchedule>, db::DbError> {
        self.store.due_schedules(self.clock.now(), limit).await
    }

    /// Record a successful fire and advance `next_run_at`. If the next
    /// candidate run would exceed `end_at`, deactivate the schedule instead.
    pub async fn mark_run_success(&self, schedule: &WorkflowSchedule) -> Result<(), EngineError> {
        let candidate = self.next_fire(schedule, self.clock.now())?;

        if let Some(end_at) = schedule.end_at {
            if candidate > end_at {
                return self.store.deactivate(schedule.id).await.map_err(EngineError::from);
            }
        }

        self.store
            .mark_run_success(schedule.id, candidate)
            .await
            .map_err(EngineError::from)
    }

    /// Record a failed fire. Backs off exponentially from the last
    /// `retry_count`: `clamp(60 * 2^(retry_count - 1), 60, 86_400)` seconds —
    /// 60s, 120s, 240s, ... capped at a day.
    pub async fn mark_run_failure(&self, schedule: &WorkflowSchedule, error: impl Into<String>) -> Result<(), EngineError> {
        let retry_count = schedule.retry_count + 1;
        let exponent = (retry_count - 1).max(0).min(20) as u32;
        let delay_secs = (60i64 * 2i64.pow(exponent)).clamp(60, 86_400);
        let next_run_at = self.clock.now() + chrono::Duration::seconds(delay_secs);

        self.store
            .mark_run_failure(schedule.id, next_run_at, retry_count, &error.into())
            .await
            .map_err(EngineError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn schedule(cron: Option<&str>, frequency: Option<ScheduleFrequency>) -> WorkflowSchedule {
        schedule_with_end(cron, frequency, None)
    }

    fn schedule_with_end(
        cron: Option<&str>,
        frequency: Option<ScheduleFrequency>,
        end_at: Option<DateTime<Utc>>,
    ) -> WorkflowSchedule {
        WorkflowSchedule {
            id: Uuid::new_v4(),
            workflow_id: Uuid::new_v4(),
            cron: cron.map(String::from),
            frequency,
            timezone: None,
            start_at: None,
            end_at,
            next_run_at: Utc::now(),
            is_active: true,
            retry_count: 0,
            last_error: None,
            last_error_at: None,
            metadata: serde_json::Value::Null,
        }
    }

    #[derive(Default)]
    struct RecordingStore {
        deactivated: std::sync::Mutex<Vec<Uuid>>,
        successes: std::sync::Mutex<Vec<(Uuid, DateTime<Utc>)>>,
        failures: std::sync::Mutex<Vec<(Uuid, DateTime<Utc>, i32, String)>>,
    }

    #[async_trait]
    impl ScheduleStore for RecordingStore {
        async fn due_schedules(&self, _as_of: DateTime<Utc>, _limit: i64) -> Result<Vec<WorkflowSchedule>, db::DbError> {
            Ok(vec![])
        }
        async fn mark_run_success(&self, schedule_id: Uuid, next_run_at: DateTime<Utc>) -> Result<(), db::DbError> {
            self.successes.lock().unwrap().push((schedule_id, next_run_at));
            Ok(())
        }
        async fn mark_run_failure(
            &self,
            schedule_id: Uuid,
            next_run_at: DateTime<Utc>,
            retry_count: i32,
            error: &str,
        ) -> Result<(), db::DbError> {
            self.failures
                .lock()
                .unwrap()
                .push((schedule_id, next_run_at, retry_count, error.to_string()));
            Ok(())
        }
        async fn deactivate(&self, schedule_id: Uuid) -> Result<(), db::DbError> {
            self.deactivated.lock().unwrap().push(schedule_id);
            Ok(())
        }
    }

    struct DummyCron;
    impl CronParser for DummyCron {
        fn next(&self, _expression: &str, from: DateTime<Utc>, _timezone: Option<&str>) -> Result<DateTime<Utc>, nodes::adapters::AdapterError> {
            Ok(from + chrono::Duration::hours(1))
        }
    }

    struct FixedClock(DateTime<Utc>);
    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    fn scheduler() -> Scheduler {
        scheduler_with_store(Arc::new(RecordingStore::default()))
    }

    fn scheduler_with_store(store: Arc<RecordingStore>) -> Scheduler {
        Scheduler::new(
            store,
            Arc::new(DummyCron),
            Arc::new(FixedClock(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap())),
        )
    }

    #[test]
    fn cron_wins_over_frequency_when_both_set() {
        let s = schedule(Some("0 * * * *"), Some(ScheduleFrequency::Daily));
        let from = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let next = scheduler().next_fire(&s, from).unwrap();
        // DummyCron always advances by one hour; a Daily fallback would have
        // advanced by 24 hours instead.
        assert_eq!(next, from + chrono::Duration::hours(1));
    }

    #[test]
    fn monthly_frequency_advances_by_one_month() {
        let s = schedule(None, Some(ScheduleFrequency::Monthly));
        let from = Utc.with_ymd_and_hms(2026, 1, 15, 0, 0, 0).unwrap();
        let next = scheduler().next_fire(&s, from).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 2, 15, 0, 0, 0).unwrap());
    }

    #[test]
    fn neither_cron_nor_frequency_defaults_to_five_minutes() {
        let s = schedule(None, None);
        let from = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let next = scheduler().next_fire(&s, from).unwrap();
        assert_eq!(next, from + chrono::Duration::minutes(5));
    }

    #[tokio::test]
    async fn mark_run_success_advances_next_run_at() {
        let store = Arc::new(RecordingStore::default());
        let s = schedule(None, Some(ScheduleFrequency::Daily));
        scheduler_with_store(store.clone()).mark_run_success(&s).await.unwrap();
        let successes = store.successes.lock().unwrap();
        assert_eq!(successes.len(), 1);
        assert_eq!(successes[0].0, s.id);
    }

    #[tokio::test]
    async fn mark_run_success_deactivates_when_candidate_exceeds_end_at() {
        let store = Arc::new(RecordingStore::default());
        let end_at = Utc.with_ymd_and_hms(2026, 1, 1, 0, 30, 0).unwrap();
        let s = schedule_with_end(None, Some(ScheduleFrequency::Daily), Some(end_at));
        scheduler_with_store(store.clone()).mark_run_success(&s).await.unwrap();
        assert_eq!(store.deactivated.lock().unwrap().as_slice(), &[s.id]);
        assert!(store.successes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn mark_run_failure_backs_off_60_then_120_then_240_seconds() {
        let store = Arc::new(RecordingStore::default());
        let sched = scheduler_with_store(store.clone());
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();

        let mut s = schedule(None, Some(ScheduleFrequency::Daily));
        sched.mark_run_failure(&s, "boom").await.unwrap();
        assert_eq!(store.failures.lock().unwrap()[0].1, now + chrono::Duration::seconds(60));

        s.retry_count = 1;
        sched.mark_run_failure(&s, "boom").await.unwrap();
        assert_eq!(store.failures.lock().unwrap()[1].1, now + chrono::Duration::seconds(120));

        s.retry_count = 2;
        sched.mark_run_failure(&s, "boom").await.unwrap();
        assert_eq!(store.failures.lock().unwrap()[2].1, now + chrono::Duration::seconds(240));

        // Many consecutive failures stay capped at one day.
        s.retry_count = 20;
        sched.mark_run_failure(&s, "boom").await.unwrap();
        assert_eq!(store.failures.lock().unwrap()[3].1, now + chrono::Duration::seconds(86_400));
    }
}
