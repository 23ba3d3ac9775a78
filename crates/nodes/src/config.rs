//! Per-node-kind configuration.
//!
//! A `WorkflowNode` row carries one of these instead of a single struct with
//! every optional field a node could ever need — each kind owns only the
//! fields it actually uses.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Every kind a `WorkflowNode` can be.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeKind {
    Trigger,
    Email(EmailConfig),
    Sms(SmsConfig),
    Delay(DelayConfig),
    Condition(ConditionConfig),
    Loop(LoopConfig),
    Parallel(ParallelConfig),
    DataTransform(DataTransformConfig),
    Approval(ApprovalConfig),
    CreateRecord(RecordMutationConfig),
    UpdateRecord(RecordMutationConfig),
    Query(QueryConfig),
    Filter(FilterConfig),
    Schedule(ScheduleConfig),
}

impl NodeKind {
    /// Short tag used for registry lookups and log output.
    pub fn tag(&self) -> &'static str {
        match self {
            NodeKind::Trigger => "TRIGGER",
            NodeKind::Email(_) => "EMAIL",
            NodeKind::Sms(_) => "SMS",
            NodeKind::Delay(_) => "DELAY",
            NodeKind::Condition(_) => "CONDITION",
            NodeKind::Loop(_) => "LOOP",
            NodeKind::Parallel(_) => "PARALLEL",
            NodeKind::DataTransform(_) => "DATA_TRANSFORM",
            NodeKind::Approval(_) => "APPROVAL",
            NodeKind::CreateRecord(_) => "CREATE_RECORD",
            NodeKind::UpdateRecord(_) => "UPDATE_RECORD",
            NodeKind::Query(_) => "QUERY",
            NodeKind::Filter(_) => "FILTER",
            NodeKind::Schedule(_) => "SCHEDULE",
        }
    }

    /// Whether this kind is dispatched through the `ExecutableNode` registry
    /// (the "leaf" kinds) rather than interpreted inline by the executor.
    pub fn is_registry_dispatched(&self) -> bool {
        matches!(
            self,
            NodeKind::Email(_)
                | NodeKind::Sms(_)
                | NodeKind::Delay(_)
                | NodeKind::DataTransform(_)
                | NodeKind::Query(_)
                | NodeKind::Filter(_)
                | NodeKind::CreateRecord(_)
                | NodeKind::UpdateRecord(_)
        )
    }

    /// The `shared`-map key this node's output should also be stored under,
    /// if the user declared one. `Condition`/`Parallel`/`Trigger`/`Delay`
    /// carry no `result_key` — their output only ever lives in
    /// `nodeOutputs`.
    pub fn result_key(&self) -> Option<&str> {
        match self {
            NodeKind::Email(c) => c.result_key.as_deref(),
            NodeKind::Sms(c) => c.result_key.as_deref(),
            NodeKind::DataTransform(c) => c.result_key.as_deref(),
            NodeKind::Approval(c) => c.result_key.as_deref(),
            NodeKind::CreateRecord(c) => c.result_key.as_deref(),
            NodeKind::UpdateRecord(c) => c.result_key.as_deref(),
            NodeKind::Query(c) => c.result_key.as_deref(),
            NodeKind::Filter(c) => c.result_key.as_deref(),
            NodeKind::Loop(c) => c.result_key.as_deref(),
            NodeKind::Schedule(c) => c.result_key.as_deref(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmailConfig {
    pub subject: String,
    pub html_body: Option<String>,
    pub text_body: Option<String>,
    pub from_name: Option<String>,
    pub from_email: Option<String>,
    pub reply_to: Option<String>,
    pub recipient_override: Option<String>,
    #[serde(default)]
    pub result_key: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SmsConfig {
    pub message: String,
    pub from_number: Option<String>,
    pub recipient_override: Option<String>,
    #[serde(default)]
    pub result_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelayConfig {
    #[serde(default = "DelayConfig::default_delay_ms")]
    pub delay_ms: u64,
}

impl DelayConfig {
    fn default_delay_ms() -> u64 {
        1000
    }
}

impl Default for DelayConfig {
    fn default() -> Self {
        Self {
            delay_ms: Self::default_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConditionConfig {
    pub conditions: Vec<crate::resolver::condition::Condition>,
    #[serde(default)]
    pub logical_operator: crate::resolver::condition::LogicalOperator,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoopConfig {
    pub data_source: Option<String>,
    pub source_key: Option<String>,
    pub result_key: Option<String>,
    #[serde(default = "LoopConfig::default_item_variable")]
    pub item_variable: String,
    #[serde(default = "LoopConfig::default_index_variable")]
    pub index_variable: String,
    pub max_iterations: Option<usize>,
    pub break_condition: Option<crate::resolver::condition::ConditionGroup>,
}

impl LoopConfig {
    fn default_item_variable() -> String {
        "item".to_string()
    }
    fn default_index_variable() -> String {
        "index".to_string()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParallelConfig {
    pub parallel_node_ids: Vec<String>,
    #[serde(default)]
    pub failure_handling: FailureHandling,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureHandling {
    #[default]
    FailOnAny,
    FailOnAll,
    ContinueOnFailure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformOperation {
    Map,
    Filter,
    Reduce,
    Query,
    Aggregate,
    Extract,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataTransformConfig {
    pub operation: TransformOperation,
    pub source_key: Option<String>,
    /// Field path (for `map`/`extract`) or reducer expression (for `reduce`).
    pub expression: Option<String>,
    /// Condition set used by `filter`/`query` sub-operations.
    pub conditions: Option<crate::resolver::condition::ConditionGroup>,
    pub result_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalConfig {
    pub approver_ids: Vec<uuid::Uuid>,
    pub expires_in_seconds: Option<i64>,
    #[serde(default)]
    pub notify_approvers: bool,
    pub result_key: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordMutationConfig {
    pub model: String,
    /// Field name -> template string (`{{path}}` or a bare `{TOKEN}`).
    pub fields: std::collections::HashMap<String, Value>,
    pub record_id_path: Option<String>,
    pub conditions: Option<crate::resolver::condition::ConditionGroup>,
    pub result_key: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryConfig {
    pub model: String,
    #[serde(default)]
    pub filters: Vec<crate::resolver::condition::Condition>,
    #[serde(default)]
    pub logical_operator: crate::resolver::condition::LogicalOperator,
    pub order_by: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub select: Option<Vec<String>>,
    pub include: Option<Vec<String>>,
    pub result_key: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterConfig {
    pub source_key: String,
    pub conditions: crate::resolver::condition::ConditionGroup,
    pub result_key: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ScheduleFrequency {
    Hourly,
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScheduleConfig {
    pub cron: Option<String>,
    pub frequency: Option<ScheduleFrequency>,
    pub timezone: Option<String>,
    pub start_at: Option<chrono::DateTime<chrono::Utc>>,
    pub end_at: Option<chrono::DateTime<chrono::Utc>>,
    pub result_key: Option<String>,
}
