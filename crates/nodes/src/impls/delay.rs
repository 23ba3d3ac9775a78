//! DELAY node — pauses the graph walk for a fixed duration.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

use crate::config::DelayConfig;
use crate::{ExecutableNode, ExecutionContext, NodeError, NodeOutcome};

pub struct DelayNode {
    pub config: DelayConfig,
}

impl DelayNode {
    pub fn new(config: DelayConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ExecutableNode for DelayNode {
    async fn execute(&self, input: Value, _ctx: &ExecutionContext) -> Result<NodeOutcome, NodeError> {
        tokio::time::sleep(Duration::from_millis(self.config.delay_ms)).await;
        Ok(NodeOutcome::Completed(input))
    }
}
