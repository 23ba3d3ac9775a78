//! FILTER node — narrows an array named by `source_key` down to the items
//! matching its condition group.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::FilterConfig;
use crate::resolver::condition::evaluate_group;
use crate::resolver::path::resolve_prefixed;
use crate::resolver::ResolverContext;
use crate::{ExecutableNode, ExecutionContext, NodeError, NodeOutcome};

pub struct FilterNode {
    pub config: FilterConfig,
}

impl FilterNode {
    pub fn new(config: FilterConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ExecutableNode for FilterNode {
    async fn execute(&self, _input: Value, ctx: &ExecutionContext) -> Result<NodeOutcome, NodeError> {
        let resolver = ctx.resolver_ctx();
        let source = resolve_prefixed(&resolver, &self.config.source_key).unwrap_or(Value::Null);

        let items = match source {
            Value::Array(items) => items,
            Value::Null => Vec::new(),
            other => vec![other],
        };

        let matched: Vec<Value> = items
            .into_iter()
            .filter(|item| {
                let item_ctx = ResolverContext {
                    payload: item,
                    ..resolver
                };
                evaluate_group(&self.config.conditions, &item_ctx)
            })
            .collect();

        Ok(NodeOutcome::Completed(json!(matched)))
    }
}
