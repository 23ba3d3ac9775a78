//! QUERY node — reads records through the injected [`RecordStore`] port.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::adapters::{FindManyArgs, RecordModel};
use crate::config::QueryConfig;
use crate::{ExecutableNode, ExecutionContext, NodeError, NodeOutcome};

pub struct QueryNode {
    pub config: QueryConfig,
}

impl QueryNode {
    pub fn new(config: QueryConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ExecutableNode for QueryNode {
    async fn execute(&self, _input: Value, ctx: &ExecutionContext) -> Result<NodeOutcome, NodeError> {
        let model = RecordModel::parse(&self.config.model)
            .ok_or_else(|| NodeError::Fatal(format!("unknown record model '{}'", self.config.model)))?;

        let args = FindManyArgs {
            organization_id: ctx.organization_id,
            where_conditions: self.config.filters.clone(),
            logical_operator: self.config.logical_operator,
            order_by: self.config.order_by.clone(),
            limit: self.config.limit,
            offset: self.config.offset,
            select: self.config.select.clone(),
            include: self.config.include.clone(),
        };

        let records = ctx
            .record_store
            .find_many(model, args)
            .await
            .map_err(|e| NodeError::Retryable(e.to_string()))?;

        Ok(NodeOutcome::Completed(json!(records)))
    }
}
