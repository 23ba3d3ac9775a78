//! DATA_TRANSFORM node — map/filter/reduce/query/aggregate/extract over a
//! JSON array or value drawn from `source_key` (falling back to the
//! incoming `input` when absent).

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::{DataTransformConfig, TransformOperation};
use crate::resolver::condition::evaluate_group;
use crate::resolver::path::{dig, resolve_prefixed};
use crate::resolver::ResolverContext;
use crate::{ExecutableNode, ExecutionContext, NodeError, NodeOutcome};

pub struct DataTransformNode {
    pub config: DataTransformConfig,
}

impl DataTransformNode {
    pub fn new(config: DataTransformConfig) -> Self {
        Self { config }
    }

    fn source(&self, input: &Value, ctx: &ExecutionContext) -> Value {
        match &self.config.source_key {
            Some(key) => resolve_prefixed(&ctx.resolver_ctx(), key).unwrap_or(Value::Null),
            None => input.clone(),
        }
    }
}

#[async_trait]
impl ExecutableNode for DataTransformNode {
    async fn execute(&self, input: Value, ctx: &ExecutionContext) -> Result<NodeOutcome, NodeError> {
        let source = self.source(&input, ctx);
        let resolver = ctx.resolver_ctx();

        let result = match self.config.operation {
            TransformOperation::Map => map_op(&source, self.config.expression.as_deref()),
            TransformOperation::Filter | TransformOperation::Query => {
                filter_op(&source, self.config.conditions.as_ref(), &resolver)
            }
            TransformOperation::Reduce => reduce_op(&source, self.config.expression.as_deref()),
            TransformOperation::Aggregate => aggregate_op(&source, self.config.expression.as_deref()),
            TransformOperation::Extract => extract_op(&source, self.config.expression.as_deref()),
        };

        Ok(NodeOutcome::Completed(result))
    }
}

fn as_array(v: &Value) -> Vec<Value> {
    match v {
        Value::Array(items) => items.clone(),
        Value::Null => Vec::new(),
        other => vec![other.clone()],
    }
}

fn map_op(source: &Value, expression: Option<&str>) -> Value {
    let Some(path) = expression else {
        return source.clone();
    };
    let mapped: Vec<Value> = as_array(source)
        .iter()
        .map(|item| dig(item, path).unwrap_or(Value::Null))
        .collect();
    json!(mapped)
}

fn filter_op(
    source: &Value,
    conditions: Option<&crate::resolver::condition::ConditionGroup>,
    resolver: &ResolverContext,
) -> Value {
    let Some(group) = conditions else {
        return source.clone();
    };
    let filtered: Vec<Value> = as_array(source)
        .into_iter()
        .filter(|item| {
            let item_ctx = ResolverContext {
                payload: item,
                ..*resolver
            };
            evaluate_group(group, &item_ctx)
        })
        .collect();
    json!(filtered)
}

/// `expression` is `"op:field"` where `op` is one of `sum`, `avg`, `count`,
/// `min`, `max`; `field` is omitted for `count`.
fn reduce_op(source: &Value, expression: Option<&str>) -> Value {
    aggregate_op(source, expression)
}

fn aggregate_op(source: &Value, expression: Option<&str>) -> Value {
    let items = as_array(source);
    let Some(expr) = expression else {
        return json!(items.len());
    };
    let mut parts = expr.splitn(2, ':');
    let op = parts.next().unwrap_or("count");
    let field = parts.next();

    let numbers: Vec<f64> = items
        .iter()
        .filter_map(|item| match field {
            Some(f) => dig(item, f).and_then(|v| v.as_f64()),
            None => item.as_f64(),
        })
        .collect();

    match op {
        "count" => json!(items.len()),
        "sum" => json!(numbers.iter().sum::<f64>()),
        "avg" => {
            if numbers.is_empty() {
                json!(0.0)
            } else {
                json!(numbers.iter().sum::<f64>() / numbers.len() as f64)
            }
        }
        "min" => json!(numbers.iter().cloned().fold(f64::INFINITY, f64::min)),
        "max" => json!(numbers.iter().cloned().fold(f64::NEG_INFINITY, f64::max)),
        _ => json!(items.len()),
    }
}

fn extract_op(source: &Value, expression: Option<&str>) -> Value {
    match expression {
        Some(path) => dig(source, path).unwrap_or(Value::Null),
        None => source.clone(),
    }
}
