//! CREATE_RECORD / UPDATE_RECORD nodes — write through the injected
//! [`RecordStore`] port.

use async_trait::async_trait;
use serde_json::Value;

use crate::adapters::RecordModel;
use crate::config::RecordMutationConfig;
use crate::resolver::condition::evaluate_group;
use crate::resolver::path::resolve_prefixed;
use crate::resolver::vars::resolve_tokens;
use crate::{ExecutableNode, ExecutionContext, NodeError, NodeOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordMutationMode {
    Create,
    Update,
}

pub struct RecordMutationNode {
    pub config: RecordMutationConfig,
    pub mode: RecordMutationMode,
}

impl RecordMutationNode {
    pub fn new(config: RecordMutationConfig, mode: RecordMutationMode) -> Self {
        Self { config, mode }
    }

    fn resolve_fields(&self, ctx: &ExecutionContext) -> Value {
        let resolver = ctx.resolver_ctx();
        let mut out = serde_json::Map::new();
        for (key, template) in &self.config.fields {
            let resolved = match template {
                Value::String(s) => Value::String(resolve_tokens(s, &resolver)),
                other => other.clone(),
            };
            out.insert(key.clone(), resolved);
        }
        Value::Object(out)
    }
}

#[async_trait]
impl ExecutableNode for RecordMutationNode {
    async fn execute(&self, input: Value, ctx: &ExecutionContext) -> Result<NodeOutcome, NodeError> {
        if let Some(conditions) = &self.config.conditions {
            if !evaluate_group(conditions, &ctx.resolver_ctx()) {
                return Ok(NodeOutcome::Skipped(input));
            }
        }

        let model = RecordModel::parse(&self.config.model)
            .ok_or_else(|| NodeError::Fatal(format!("unknown record model '{}'", self.config.model)))?;

        let fields = self.resolve_fields(ctx);

        let result = match self.mode {
            RecordMutationMode::Create => ctx
                .record_store
                .create(model, fields)
                .await
                .map_err(|e| NodeError::Retryable(e.to_string()))?,
            RecordMutationMode::Update => {
                let record_id_path = self
                    .config
                    .record_id_path
                    .as_deref()
                    .ok_or_else(|| NodeError::Fatal("UPDATE_RECORD missing record_id_path".into()))?;
                let record_id = resolve_prefixed(&ctx.resolver_ctx(), record_id_path)
                    .ok_or_else(|| NodeError::Fatal(format!("could not resolve record id at '{record_id_path}'")))?;

                ctx.record_store
                    .update(model, record_id, fields)
                    .await
                    .map_err(|e| NodeError::Retryable(e.to_string()))?
            }
        };

        Ok(NodeOutcome::Completed(result))
    }
}
