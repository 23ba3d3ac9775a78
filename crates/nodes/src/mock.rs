//! Test doubles for `ExecutableNode` and the side-effect adapter traits.
//!
//! Useful in unit and integration tests where a real provider/ORM client is
//! either unavailable or irrelevant.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

use crate::adapters::{
    AdapterError, Clock, CronParser, EmailMessage, EmailResult, EmailSink, FindManyArgs,
    RecordModel, RecordStore, SmsMessage, SmsResult, SmsSink,
};
use crate::{traits::ExecutionContext, ExecutableNode, NodeError, NodeOutcome};

/// Behaviour injected into `MockNode` at construction time.
pub enum MockBehaviour {
    /// Return a specific JSON value.
    ReturnValue(Value),
    /// Return a value but report it as skipped.
    Skip(Value),
    /// Fail with a `Retryable` error.
    FailRetryable(String),
    /// Fail with a `Fatal` error.
    FailFatal(String),
}

/// A mock node that records every call it receives and returns a
/// programmer-specified result.
pub struct MockNode {
    /// Label used in test assertions.
    pub name: String,
    /// What the node will do when `execute` is called.
    pub behaviour: MockBehaviour,
    /// All inputs seen by this node (in call order).
    pub calls: Arc<Mutex<Vec<Value>>>,
}

impl MockNode {
    /// Create a mock that always succeeds with the given value.
    pub fn returning(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            behaviour: MockBehaviour::ReturnValue(value),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a mock that reports its output as skipped.
    pub fn skipping(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            behaviour: MockBehaviour::Skip(value),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a mock that always fails with a `Fatal` error.
    pub fn failing_fatal(name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            behaviour: MockBehaviour::FailFatal(msg.into()),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a mock that always fails with a `Retryable` error.
    pub fn failing_retryable(name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            behaviour: MockBehaviour::FailRetryable(msg.into()),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Number of times this node has been executed.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ExecutableNode for MockNode {
    async fn execute(&self, input: Value, _ctx: &ExecutionContext) -> Result<NodeOutcome, NodeError> {
        self.calls.lock().unwrap().push(input.clone());

        match &self.behaviour {
            MockBehaviour::ReturnValue(v) => {
                let mut out = json!({ "node": self.name });
                if let (Some(out_obj), Some(v_obj)) = (out.as_object_mut(), v.as_object()) {
                    for (k, val) in v_obj {
                        out_obj.insert(k.clone(), val.clone());
                    }
                }
                Ok(NodeOutcome::Completed(out))
            }
            MockBehaviour::Skip(v) => Ok(NodeOutcome::Skipped(v.clone())),
            MockBehaviour::FailRetryable(msg) => Err(NodeError::Retryable(msg.clone())),
            MockBehaviour::FailFatal(msg) => Err(NodeError::Fatal(msg.clone())),
        }
    }
}

/// Records every message handed to it; never fails unless told to.
#[derive(Default)]
pub struct MockEmailSink {
    pub sent: Mutex<Vec<EmailMessage>>,
    pub fail_with: Option<String>,
}

#[async_trait]
impl EmailSink for MockEmailSink {
    async fn send(&self, message: EmailMessage) -> Result<EmailResult, AdapterError> {
        if let Some(err) = &self.fail_with {
            return Err(AdapterError::Failed(err.clone()));
        }
        self.sent.lock().unwrap().push(message);
        Ok(EmailResult {
            success: true,
            message_id: Some(uuid::Uuid::new_v4().to_string()),
            error: None,
        })
    }
}

/// Mirrors the real adapter's "no provider configured" skip behaviour when
/// `configured` is false.
pub struct MockSmsSink {
    pub configured: bool,
    pub sent: Mutex<Vec<SmsMessage>>,
}

impl Default for MockSmsSink {
    fn default() -> Self {
        Self {
            configured: true,
            sent: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl SmsSink for MockSmsSink {
    async fn send(&self, message: SmsMessage) -> Result<SmsResult, AdapterError> {
        if !self.configured {
            return Ok(SmsResult {
                success: true,
                message_sid: None,
                status: None,
                skipped: true,
                error: None,
            });
        }
        self.sent.lock().unwrap().push(message);
        Ok(SmsResult {
            success: true,
            message_sid: Some(uuid::Uuid::new_v4().to_string()),
            status: Some("queued".into()),
            skipped: false,
            error: None,
        })
    }
}

/// In-memory record store keyed by `(RecordModel, id)`; good enough to drive
/// QUERY/CREATE_RECORD/UPDATE_RECORD tests without a database.
#[derive(Default)]
pub struct MockRecordStore {
    pub records: Mutex<Vec<(RecordModel, Value)>>,
}

#[async_trait]
impl RecordStore for MockRecordStore {
    async fn find_many(&self, model: RecordModel, args: FindManyArgs) -> Result<Vec<Value>, AdapterError> {
        let records = self.records.lock().unwrap();
        let mut matches: Vec<Value> = records
            .iter()
            .filter(|(m, _)| *m == model)
            .map(|(_, v)| v.clone())
            .collect();
        if let Some(limit) = args.limit {
            matches.truncate(limit as usize);
        }
        Ok(matches)
    }

    async fn create(&self, model: RecordModel, fields: Value) -> Result<Value, AdapterError> {
        let mut record = fields;
        if let Some(obj) = record.as_object_mut() {
            obj.entry("id").or_insert_with(|| json!(uuid::Uuid::new_v4().to_string()));
        }
        self.records.lock().unwrap().push((model, record.clone()));
        Ok(record)
    }

    async fn update(&self, model: RecordModel, record_id: Value, fields: Value) -> Result<Value, AdapterError> {
        let mut records = self.records.lock().unwrap();
        for (m, v) in records.iter_mut() {
            if *m == model && v.get("id") == Some(&record_id) {
                if let (Some(obj), Some(patch)) = (v.as_object_mut(), fields.as_object()) {
                    for (k, val) in patch {
                        obj.insert(k.clone(), val.clone());
                    }
                }
                return Ok(v.clone());
            }
        }
        Err(AdapterError::Failed(format!("record {record_id} not found")))
    }
}

/// A clock pinned to a fixed instant, for deterministic scheduler tests.
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// A cron parser that always reports the same programmer-specified next
/// fire time, regardless of expression.
pub struct MockCronParser(pub DateTime<Utc>);

impl CronParser for MockCronParser {
    fn next(&self, _expression: &str, _from: DateTime<Utc>, _timezone: Option<&str>) -> Result<DateTime<Utc>, AdapterError> {
        Ok(self.0)
    }
}
