//! Integration tests for the workflow execution engine.
//!
//! Exercises the executor end-to-end against `MockNode`/`MockEmailSink`/etc.
//! doubles and an in-memory `ExecutionSink`, so no database is required. The
//! real DB-backed sinks are tested in `db`'s own test module.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;

use nodes::config::{
    ApprovalConfig, ConditionConfig, EmailConfig, FailureHandling, LoopConfig, NodeKind,
    ParallelConfig, QueryConfig, SmsConfig,
};
use nodes::mock::{FixedClock, MockEmailSink, MockNode, MockRecordStore};
use nodes::resolver::condition::{Condition, ConditionGroup, LogicalOperator, Operator};
use nodes::{ExecutableNode, NodeError, NodeOutcome};

use crate::executor::{ExecutionOutcome, ExecutionSink, ExecutorConfig, NodeRegistry, TriggerInput, WorkflowExecutor};
use crate::logger::{LogSink, Logger};
use crate::models::{Approval, Connection, ExecutionLog, NodeExecution, Trigger, Workflow, WorkflowExecution, WorkflowNode};
use crate::EngineError;

fn node(id: &str, kind: NodeKind) -> WorkflowNode {
    WorkflowNode {
        id: id.to_string(),
        kind,
        is_optional: false,
        retry_limit: None,
        timeout_seconds: None,
    }
}

fn optional_node(id: &str, kind: NodeKind) -> WorkflowNode {
    WorkflowNode { is_optional: true, ..node(id, kind) }
}

#[derive(Default)]
struct TestLogSink {
    logs: Mutex<Vec<ExecutionLog>>,
}

#[async_trait]
impl LogSink for TestLogSink {
    async fn write(&self, log: ExecutionLog) -> Result<(), db::DbError> {
        self.logs.lock().unwrap().push(log);
        Ok(())
    }
}

fn conn(from: &str, to: &str, branch: Option<&str>) -> Connection {
    Connection {
        source_node_id: from.into(),
        target_node_id: to.into(),
        branch: branch.map(String::from),
        execution_order: None,
    }
}

fn workflow(trigger: Trigger, nodes: Vec<WorkflowNode>, connections: Vec<Connection>) -> Workflow {
    Workflow::new("test", Uuid::new_v4(), trigger, nodes, connections)
}

#[derive(Default)]
struct TestSink {
    executions: Mutex<Vec<WorkflowExecution>>,
    node_executions: Mutex<Vec<NodeExecution>>,
    approvals: Mutex<Vec<Approval>>,
}

#[async_trait]
impl ExecutionSink for TestSink {
    async fn create_execution(&self, workflow_id: Uuid, input: Value) -> Result<WorkflowExecution, db::DbError> {
        let exec = WorkflowExecution {
            id: Uuid::new_v4(),
            workflow_id,
            status: crate::models::ExecutionStatus::Running,
            input,
            output: None,
            started_at: Utc::now(),
            finished_at: None,
        };
        self.executions.lock().unwrap().push(exec.clone());
        Ok(exec)
    }

    async fn update_execution_status(
        &self,
        execution_id: Uuid,
        status: crate::models::ExecutionStatus,
        output: Option<Value>,
    ) -> Result<(), db::DbError> {
        let mut execs = self.executions.lock().unwrap();
        if let Some(e) = execs.iter_mut().find(|e| e.id == execution_id) {
            e.status = status;
            e.output = output;
        }
        Ok(())
    }

    async fn insert_node_execution(&self, row: NodeExecution) -> Result<(), db::DbError> {
        self.node_executions.lock().unwrap().push(row);
        Ok(())
    }

    async fn node_executions_for(&self, execution_id: Uuid) -> Result<Vec<NodeExecution>, db::DbError> {
        Ok(self
            .node_executions
            .lock()
            .unwrap()
            .iter()
            .filter(|n| n.execution_id == execution_id)
            .cloned()
            .collect())
    }

    async fn create_approval(&self, approval: Approval) -> Result<(), db::DbError> {
        self.approvals.lock().unwrap().push(approval);
        Ok(())
    }
}

fn make_executor(registry: NodeRegistry, sink: Arc<dyn ExecutionSink>, config: ExecutorConfig) -> WorkflowExecutor {
    WorkflowExecutor::new(
        registry,
        sink,
        config,
        Arc::new(MockEmailSink::default()),
        None,
        Arc::new(MockRecordStore::default()),
        Arc::new(FixedClock(Utc::now())),
        Arc::new(Logger::new(Arc::new(TestLogSink::default()))),
    )
}

fn fast_config() -> ExecutorConfig {
    ExecutorConfig {
        max_retries: 3,
        retry_base_delay: Duration::from_millis(1),
        node_timeout: Duration::from_secs(5),
        visit_cap: 10,
    }
}

/// Fails its first `fails_left` calls with a retryable error, then succeeds.
struct FlakyThenSucceeds {
    fails_left: AtomicUsize,
}

#[async_trait]
impl ExecutableNode for FlakyThenSucceeds {
    async fn execute(&self, input: Value, _ctx: &nodes::ExecutionContext) -> Result<NodeOutcome, NodeError> {
        if self.fails_left.load(Ordering::SeqCst) > 0 {
            self.fails_left.fetch_sub(1, Ordering::SeqCst);
            return Err(NodeError::Retryable("not yet".into()));
        }
        Ok(NodeOutcome::Completed(input))
    }
}

#[tokio::test]
async fn linear_pipeline_propagates_output_through_nodes() {
    let a = Arc::new(MockNode::returning("a", json!({ "step": 1 })));
    let b = Arc::new(MockNode::returning("b", json!({ "step": 2 })));
    let c = Arc::new(MockNode::returning("c", json!({ "step": 3 })));

    let mut registry: NodeRegistry = HashMap::new();
    registry.insert("EMAIL".into(), a.clone() as Arc<dyn ExecutableNode>);
    registry.insert("SMS".into(), b.clone() as Arc<dyn ExecutableNode>);
    registry.insert("QUERY".into(), c.clone() as Arc<dyn ExecutableNode>);

    let wf = workflow(
        Trigger::Manual,
        vec![
            node("trigger", NodeKind::Trigger),
            node("a", NodeKind::Email(EmailConfig::default())),
            node("b", NodeKind::Sms(SmsConfig::default())),
            node("c", NodeKind::Query(QueryConfig::default())),
        ],
        vec![conn("trigger", "a", None), conn("a", "b", None), conn("b", "c", None)],
    );

    let sink = Arc::new(TestSink::default());
    let executor = make_executor(registry, sink, fast_config());

    let outcome = executor
        .run(&wf, TriggerInput { payload: json!({ "origin": "trigger" }), ..Default::default() })
        .await
        .expect("should complete");

    match outcome {
        ExecutionOutcome::Completed { output, .. } => {
            assert_eq!(output["node"], "c");
            assert_eq!(output["step"], 3);
        }
        other => panic!("expected completion, got {other:?}"),
    }

    assert_eq!(a.call_count(), 1);
    assert_eq!(b.call_count(), 1);
    assert_eq!(c.call_count(), 1);
}

#[tokio::test]
async fn fatal_node_error_stops_pipeline() {
    let ok = Arc::new(MockNode::returning("ok", json!({})));
    let boom = Arc::new(MockNode::failing_fatal("boom", "something broke irreparably"));
    let never = Arc::new(MockNode::returning("never", json!({})));

    let mut registry: NodeRegistry = HashMap::new();
    registry.insert("EMAIL".into(), ok.clone() as Arc<dyn ExecutableNode>);
    registry.insert("SMS".into(), boom.clone() as Arc<dyn ExecutableNode>);
    registry.insert("QUERY".into(), never.clone() as Arc<dyn ExecutableNode>);

    let wf = workflow(
        Trigger::Manual,
        vec![
            node("trigger", NodeKind::Trigger),
            node("ok", NodeKind::Email(EmailConfig::default())),
            node("boom", NodeKind::Sms(SmsConfig::default())),
            node("never", NodeKind::Query(QueryConfig::default())),
        ],
        vec![conn("trigger", "ok", None), conn("ok", "boom", None), conn("boom", "never", None)],
    );

    let sink = Arc::new(TestSink::default());
    let executor = make_executor(registry, sink, fast_config());

    let err = executor
        .run(&wf, TriggerInput { payload: json!({}), ..Default::default() })
        .await
        .expect_err("should fail fatally");

    assert!(matches!(err, EngineError::NodeFatal { node_id, .. } if node_id == "boom"));
    assert_eq!(never.call_count(), 0);
}

#[tokio::test]
async fn retryable_error_retries_until_success() {
    let flaky = Arc::new(FlakyThenSucceeds { fails_left: AtomicUsize::new(2) });

    let mut registry: NodeRegistry = HashMap::new();
    registry.insert("EMAIL".into(), flaky as Arc<dyn ExecutableNode>);

    let wf = workflow(
        Trigger::Manual,
        vec![node("trigger", NodeKind::Trigger), node("flaky", NodeKind::Email(EmailConfig::default()))],
        vec![conn("trigger", "flaky", None)],
    );

    let sink = Arc::new(TestSink::default());
    let executor = make_executor(registry, sink, fast_config());

    let outcome = executor
        .run(&wf, TriggerInput { payload: json!({ "original": true }), ..Default::default() })
        .await
        .expect("should eventually succeed");

    assert!(matches!(outcome, ExecutionOutcome::Completed { .. }));
}

fn gt_500_condition() -> ConditionConfig {
    ConditionConfig {
        conditions: vec![Condition {
            field: "payload.amount".into(),
            value: Some(json!(500)),
            ..Default::default()
        }
        .with_operator(Operator::Gt)],
        logical_operator: LogicalOperator::And,
    }
}

#[tokio::test]
async fn condition_true_branch_executes_true_node() {
    let true_node = Arc::new(MockNode::returning("true_node", json!({})));
    let false_node = Arc::new(MockNode::returning("false_node", json!({})));

    let mut registry: NodeRegistry = HashMap::new();
    registry.insert("EMAIL".into(), true_node.clone() as Arc<dyn ExecutableNode>);
    registry.insert("SMS".into(), false_node.clone() as Arc<dyn ExecutableNode>);

    let wf = workflow(
        Trigger::Manual,
        vec![
            node("trigger", NodeKind::Trigger),
            node("cond", NodeKind::Condition(gt_500_condition())),
            node("true_node", NodeKind::Email(EmailConfig::default())),
            node("false_node", NodeKind::Sms(SmsConfig::default())),
        ],
        vec![
            conn("trigger", "cond", None),
            conn("cond", "true_node", Some("true")),
            conn("cond", "false_node", Some("false")),
        ],
    );

    let sink = Arc::new(TestSink::default());
    let executor = make_executor(registry, sink, fast_config());
    executor
        .run(&wf, TriggerInput { payload: json!({ "amount": 1000 }), ..Default::default() })
        .await
        .expect("should complete");

    assert_eq!(true_node.call_count(), 1);
    assert_eq!(false_node.call_count(), 0);
}

#[tokio::test]
async fn condition_false_branch_executes_false_node() {
    let true_node = Arc::new(MockNode::returning("true_node", json!({})));
    let false_node = Arc::new(MockNode::returning("false_node", json!({})));

    let mut registry: NodeRegistry = HashMap::new();
    registry.insert("EMAIL".into(), true_node.clone() as Arc<dyn ExecutableNode>);
    registry.insert("SMS".into(), false_node.clone() as Arc<dyn ExecutableNode>);

    let wf = workflow(
        Trigger::Manual,
        vec![
            node("trigger", NodeKind::Trigger),
            node("cond", NodeKind::Condition(gt_500_condition())),
            node("true_node", NodeKind::Email(EmailConfig::default())),
            node("false_node", NodeKind::Sms(SmsConfig::default())),
        ],
        vec![
            conn("trigger", "cond", None),
            conn("cond", "true_node", Some("true")),
            conn("cond", "false_node", Some("false")),
        ],
    );

    let sink = Arc::new(TestSink::default());
    let executor = make_executor(registry, sink, fast_config());
    executor
        .run(&wf, TriggerInput { payload: json!({ "amount": 100 }), ..Default::default() })
        .await
        .expect("should complete");

    assert_eq!(true_node.call_count(), 0);
    assert_eq!(false_node.call_count(), 1);
}

#[tokio::test]
async fn loop_iterates_until_break_condition_then_exits() {
    let body = Arc::new(MockNode::returning("body", json!({})));
    let after = Arc::new(MockNode::returning("after", json!({})));

    let mut registry: NodeRegistry = HashMap::new();
    registry.insert("EMAIL".into(), body.clone() as Arc<dyn ExecutableNode>);
    registry.insert("SMS".into(), after.clone() as Arc<dyn ExecutableNode>);

    let loop_cfg = LoopConfig {
        data_source: Some("items".into()),
        item_variable: "item".into(),
        index_variable: "index".into(),
        break_condition: Some(ConditionGroup {
            conditions: vec![Condition {
                path: Some("$loop.index".into()),
                value: Some(json!(1)),
                ..Default::default()
            }
            .with_operator(Operator::Gte)],
            logical_operator: LogicalOperator::And,
        }),
        ..Default::default()
    };

    let wf = workflow(
        Trigger::Manual,
        vec![
            node("trigger", NodeKind::Trigger),
            node("loop", NodeKind::Loop(loop_cfg)),
            node("body", NodeKind::Email(EmailConfig::default())),
            node("after", NodeKind::Sms(SmsConfig::default())),
        ],
        vec![
            conn("trigger", "loop", None),
            conn("loop", "body", Some("body")),
            conn("loop", "after", Some("exit")),
        ],
    );

    let sink = Arc::new(TestSink::default());
    let executor = make_executor(registry, sink, fast_config());
    executor
        .run(&wf, TriggerInput { payload: json!({ "items": [10, 20, 30] }), ..Default::default() })
        .await
        .expect("should complete");

    // Iterations 0 and 1 run; the break condition fires at index 1, before index 2.
    assert_eq!(body.call_count(), 2);
    assert_eq!(after.call_count(), 1);
}

#[tokio::test]
async fn parallel_continue_on_failure_collects_both_branch_and_failure() {
    let p1 = Arc::new(MockNode::returning("p1", json!({})));
    let p2 = Arc::new(MockNode::failing_fatal("p2", "branch blew up"));

    let mut registry: NodeRegistry = HashMap::new();
    registry.insert("EMAIL".into(), p1.clone() as Arc<dyn ExecutableNode>);
    registry.insert("SMS".into(), p2.clone() as Arc<dyn ExecutableNode>);

    let wf = workflow(
        Trigger::Manual,
        vec![
            node("trigger", NodeKind::Trigger),
            node(
                "parallel",
                NodeKind::Parallel(ParallelConfig {
                    parallel_node_ids: vec!["p1".into(), "p2".into()],
                    failure_handling: FailureHandling::ContinueOnFailure,
                }),
            ),
            node("p1", NodeKind::Email(EmailConfig::default())),
            node("p2", NodeKind::Sms(SmsConfig::default())),
        ],
        vec![conn("trigger", "parallel", None)],
    );

    let sink = Arc::new(TestSink::default());
    let executor = make_executor(registry, sink, fast_config());
    let outcome = executor
        .run(&wf, TriggerInput { payload: json!({}), ..Default::default() })
        .await
        .expect("continue_on_failure should not abort the execution");

    match outcome {
        ExecutionOutcome::Completed { output, .. } => {
            assert_eq!(output["branches"].as_array().unwrap().len(), 1);
            assert_eq!(output["failures"].as_array().unwrap().len(), 1);
        }
        other => panic!("expected completion, got {other:?}"),
    }
}

#[tokio::test]
async fn parallel_fail_on_any_aborts_execution() {
    let p1 = Arc::new(MockNode::returning("p1", json!({})));
    let p2 = Arc::new(MockNode::failing_fatal("p2", "branch blew up"));

    let mut registry: NodeRegistry = HashMap::new();
    registry.insert("EMAIL".into(), p1 as Arc<dyn ExecutableNode>);
    registry.insert("SMS".into(), p2 as Arc<dyn ExecutableNode>);

    let wf = workflow(
        Trigger::Manual,
        vec![
            node("trigger", NodeKind::Trigger),
            node(
                "parallel",
                NodeKind::Parallel(ParallelConfig {
                    parallel_node_ids: vec!["p1".into(), "p2".into()],
                    failure_handling: FailureHandling::FailOnAny,
                }),
            ),
            node("p1", NodeKind::Email(EmailConfig::default())),
            node("p2", NodeKind::Sms(SmsConfig::default())),
        ],
        vec![conn("trigger", "parallel", None)],
    );

    let sink = Arc::new(TestSink::default());
    let executor = make_executor(registry, sink, fast_config());
    let err = executor
        .run(&wf, TriggerInput { payload: json!({}), ..Default::default() })
        .await
        .expect_err("fail_on_any should abort");

    assert!(matches!(err, EngineError::NodeFatal { node_id, .. } if node_id == "p2"));
}

#[tokio::test]
async fn approval_pauses_then_resumes_to_completion() {
    let after = Arc::new(MockNode::returning("after", json!({})));

    let mut registry: NodeRegistry = HashMap::new();
    registry.insert("EMAIL".into(), after.clone() as Arc<dyn ExecutableNode>);

    let wf = workflow(
        Trigger::Manual,
        vec![
            node("trigger", NodeKind::Trigger),
            node(
                "gate",
                NodeKind::Approval(ApprovalConfig {
                    approver_ids: vec![],
                    expires_in_seconds: None,
                    notify_approvers: false,
                    result_key: None,
                }),
            ),
            node("after", NodeKind::Email(EmailConfig::default())),
        ],
        vec![conn("trigger", "gate", None), conn("gate", "after", None)],
    );

    let sink = Arc::new(TestSink::default());
    let executor = make_executor(registry, sink.clone(), fast_config());

    let paused = executor
        .run(&wf, TriggerInput { payload: json!({}), ..Default::default() })
        .await
        .expect("should pause for approval");

    let execution_id = match paused {
        ExecutionOutcome::Paused { execution_id, node_id, .. } => {
            assert_eq!(node_id, "gate");
            execution_id
        }
        other => panic!("expected a pause, got {other:?}"),
    };
    assert_eq!(sink.approvals.lock().unwrap().len(), 1);
    assert_eq!(after.call_count(), 0);

    let resumed = executor
        .resume_after_approval(&wf, execution_id, "gate", true)
        .await
        .expect("should resume");

    assert!(matches!(resumed, ExecutionOutcome::Completed { .. }));
    assert_eq!(after.call_count(), 1);
}

#[tokio::test]
async fn visit_cap_exceeded_on_self_referencing_condition() {
    let wf = workflow(
        Trigger::Manual,
        vec![node("trigger", NodeKind::Trigger), node("loop_back", NodeKind::Condition(ConditionConfig::default()))],
        vec![conn("trigger", "loop_back", None), conn("loop_back", "loop_back", Some("true"))],
    );

    let sink = Arc::new(TestSink::default());
    let executor = make_executor(
        NodeRegistry::new(),
        sink,
        ExecutorConfig { visit_cap: 3, ..fast_config() },
    );

    let err = executor
        .run(&wf, TriggerInput { payload: json!({}), ..Default::default() })
        .await
        .expect_err("should hit the visit cap");

    assert!(matches!(err, EngineError::VisitCapExceeded { node_id, max_visits: 3 } if node_id == "loop_back"));
}

#[tokio::test]
async fn optional_node_failure_is_skipped_not_fatal() {
    let boom = Arc::new(MockNode::failing_fatal("boom", "vendor API down"));
    let after = Arc::new(MockNode::returning("after", json!({})));

    let mut registry: NodeRegistry = HashMap::new();
    registry.insert("EMAIL".into(), boom.clone() as Arc<dyn ExecutableNode>);
    registry.insert("SMS".into(), after.clone() as Arc<dyn ExecutableNode>);

    let wf = workflow(
        Trigger::Manual,
        vec![
            node("trigger", NodeKind::Trigger),
            optional_node("boom", NodeKind::Email(EmailConfig::default())),
            node("after", NodeKind::Sms(SmsConfig::default())),
        ],
        vec![conn("trigger", "boom", None), conn("boom", "after", None)],
    );

    let sink = Arc::new(TestSink::default());
    let executor = make_executor(registry, sink.clone(), fast_config());

    let outcome = executor
        .run(&wf, TriggerInput { payload: json!({}), ..Default::default() })
        .await
        .expect("an optional node's failure should not abort the run");

    assert!(matches!(outcome, ExecutionOutcome::Completed { .. }));
    assert_eq!(after.call_count(), 1);

    let node_executions = sink.node_executions.lock().unwrap();
    let boom_row = node_executions.iter().find(|n| n.node_id == "boom").expect("boom should have run");
    assert_eq!(boom_row.status, crate::models::NodeExecutionStatus::Skipped);
}

#[tokio::test]
async fn loop_with_no_items_routes_through_empty_branch() {
    let body = Arc::new(MockNode::returning("body", json!({})));
    let on_empty = Arc::new(MockNode::returning("on_empty", json!({})));

    let mut registry: NodeRegistry = HashMap::new();
    registry.insert("EMAIL".into(), body.clone() as Arc<dyn ExecutableNode>);
    registry.insert("SMS".into(), on_empty.clone() as Arc<dyn ExecutableNode>);

    let loop_cfg = LoopConfig {
        data_source: Some("items".into()),
        item_variable: "item".into(),
        index_variable: "index".into(),
        ..Default::default()
    };

    let wf = workflow(
        Trigger::Manual,
        vec![
            node("trigger", NodeKind::Trigger),
            node("loop", NodeKind::Loop(loop_cfg)),
            node("body", NodeKind::Email(EmailConfig::default())),
            node("on_empty", NodeKind::Sms(SmsConfig::default())),
        ],
        vec![
            conn("trigger", "loop", None),
            conn("loop", "body", Some("body")),
            conn("loop", "on_empty", Some("empty")),
        ],
    );

    let sink = Arc::new(TestSink::default());
    let executor = make_executor(registry, sink, fast_config());
    executor
        .run(&wf, TriggerInput { payload: json!({ "items": [] }), ..Default::default() })
        .await
        .expect("should complete");

    assert_eq!(body.call_count(), 0);
    assert_eq!(on_empty.call_count(), 1);
}

#[tokio::test]
async fn parallel_with_no_branch_ids_is_skipped() {
    let wf = workflow(
        Trigger::Manual,
        vec![
            node("trigger", NodeKind::Trigger),
            node(
                "parallel",
                NodeKind::Parallel(ParallelConfig {
                    parallel_node_ids: vec![],
                    failure_handling: FailureHandling::ContinueOnFailure,
                }),
            ),
        ],
        vec![conn("trigger", "parallel", None)],
    );

    let sink = Arc::new(TestSink::default());
    let executor = make_executor(NodeRegistry::new(), sink.clone(), fast_config());
    let outcome = executor
        .run(&wf, TriggerInput { payload: json!({}), ..Default::default() })
        .await
        .expect("an empty parallel branch list should not fail the run");

    assert!(matches!(outcome, ExecutionOutcome::Completed { .. }));

    let node_executions = sink.node_executions.lock().unwrap();
    let parallel_row = node_executions.iter().find(|n| n.node_id == "parallel").expect("parallel should have run");
    assert_eq!(parallel_row.status, crate::models::NodeExecutionStatus::Skipped);
}

#[tokio::test]
async fn condition_branch_with_no_connection_falls_back() {
    let fallback_node = Arc::new(MockNode::returning("fallback_node", json!({})));

    let mut registry: NodeRegistry = HashMap::new();
    registry.insert("EMAIL".into(), fallback_node.clone() as Arc<dyn ExecutableNode>);

    let wf = workflow(
        Trigger::Manual,
        vec![
            node("trigger", NodeKind::Trigger),
            node("cond", NodeKind::Condition(gt_500_condition())),
            node("fallback_node", NodeKind::Email(EmailConfig::default())),
        ],
        vec![
            // No "true" branch wired up at all, only "fallback".
            conn("trigger", "cond", None),
            conn("cond", "fallback_node", Some("fallback")),
        ],
    );

    let sink = Arc::new(TestSink::default());
    let executor = make_executor(registry, sink, fast_config());
    executor
        .run(&wf, TriggerInput { payload: json!({ "amount": 1000 }), ..Default::default() })
        .await
        .expect("should fall back when the matched branch has no connection");

    assert_eq!(fallback_node.call_count(), 1);
}
