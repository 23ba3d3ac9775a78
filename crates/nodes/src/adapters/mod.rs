//! Side-effect adapters — the narrow ports the engine core calls through
//! rather than depending on any transport client, ORM, or wall clock
//! directly (design note: "the record-touching nodes must be routed through
//! a narrow `RecordStore` port so the engine core is decoupled from the
//! persistence library").

mod cron_parser;

pub use cron_parser::SystemCronParser;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("adapter error: {0}")]
    Failed(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html_body: Option<String>,
    pub text_body: Option<String>,
    pub from_name: Option<String>,
    pub from_email: Option<String>,
    pub reply_to: Option<String>,
    #[serde(default)]
    pub cc: Vec<String>,
    #[serde(default)]
    pub bcc: Vec<String>,
    #[serde(default)]
    pub attachments: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailResult {
    pub success: bool,
    pub message_id: Option<String>,
    pub error: Option<String>,
}

/// Capability the EMAIL node calls through. Implementations live outside
/// this workspace (a real SMTP/API client); only the interface is specified
/// here, per spec.md §6.
#[async_trait]
pub trait EmailSink: Send + Sync {
    async fn send(&self, message: EmailMessage) -> Result<EmailResult, AdapterError>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SmsMessage {
    pub to: String,
    pub message: String,
    pub from_number: Option<String>,
    pub media_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmsResult {
    pub success: bool,
    pub message_sid: Option<String>,
    pub status: Option<String>,
    #[serde(default)]
    pub skipped: bool,
    pub error: Option<String>,
}

/// Must return `skipped: true, success: true` when the provider is
/// unconfigured (spec.md §6).
#[async_trait]
pub trait SmsSink: Send + Sync {
    async fn send(&self, message: SmsMessage) -> Result<SmsResult, AdapterError>;
}

/// Relational capability for QUERY / CREATE_RECORD / UPDATE_RECORD. `model`
/// is drawn from an enumerated set (Lead, Customer, Project, Task, Invoice,
/// Employee, Payroll, TimeOff — see `RecordModel`).
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn find_many(
        &self,
        model: RecordModel,
        args: FindManyArgs,
    ) -> Result<Vec<Value>, AdapterError>;

    async fn create(&self, model: RecordModel, fields: Value) -> Result<Value, AdapterError>;

    async fn update(
        &self,
        model: RecordModel,
        record_id: Value,
        fields: Value,
    ) -> Result<Value, AdapterError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum RecordModel {
    Lead,
    Customer,
    Project,
    Task,
    Invoice,
    Employee,
    Payroll,
    TimeOff,
}

impl RecordModel {
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "lead" => Some(Self::Lead),
            "customer" => Some(Self::Customer),
            "project" => Some(Self::Project),
            "task" => Some(Self::Task),
            "invoice" => Some(Self::Invoice),
            "employee" => Some(Self::Employee),
            "payroll" => Some(Self::Payroll),
            "timeoff" | "time_off" => Some(Self::TimeOff),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FindManyArgs {
    pub organization_id: uuid::Uuid,
    pub where_conditions: Vec<crate::resolver::condition::Condition>,
    pub logical_operator: crate::resolver::condition::LogicalOperator,
    pub order_by: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub select: Option<Vec<String>>,
    pub include: Option<Vec<String>>,
}

/// Injected wall clock, so scheduler math is deterministic in tests
/// (spec.md §6).
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// 5-field standard cron (`*`, `*/n`, ranges, lists).
pub trait CronParser: Send + Sync {
    fn next(
        &self,
        expression: &str,
        from: DateTime<Utc>,
        timezone: Option<&str>,
    ) -> Result<DateTime<Utc>, AdapterError>;
}
