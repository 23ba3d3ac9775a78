//! Execution Logger — fire-and-forget persistence of `ExecutionLog` rows.
//!
//! Failures degrade to console-only logging but never propagate up into the
//! executor; a broken log sink must not abort a running workflow.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::models::{ExecutionLog, LogLevel};

#[async_trait]
pub trait LogSink: Send + Sync {
    async fn write(&self, log: ExecutionLog) -> Result<(), db::DbError>;
}

pub struct Logger {
    sink: Arc<dyn LogSink>,
}

impl Logger {
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self { sink }
    }

    pub async fn log(
        &self,
        execution_id: Uuid,
        node_id: Option<String>,
        level: LogLevel,
        message: impl Into<String>,
    ) {
        let message = message.into();
        match level {
            LogLevel::Info => info!(%execution_id, node_id = ?node_id, "{message}"),
            LogLevel::Warn => warn!(%execution_id, node_id = ?node_id, "{message}"),
            LogLevel::Error => error!(%execution_id, node_id = ?node_id, "{message}"),
        }

        let log = ExecutionLog {
            id: Uuid::new_v4(),
            execution_id,
            node_id,
            level,
            message,
            created_at: Utc::now(),
        };

        if let Err(e) = self.sink.write(log).await {
            error!("failed to persist execution log, console record still stands: {e}");
        }
    }

    pub async fn info(&self, execution_id: Uuid, node_id: Option<String>, message: impl Into<String>) {
        self.log(execution_id, node_id, LogLevel::Info, message).await;
    }

    pub async fn warn(&self, execution_id: Uuid, node_id: Option<String>, message: impl Into<String>) {
        self.log(execution_id, node_id, LogLevel::Warn, message).await;
    }

    pub async fn error(&self, execution_id: Uuid, node_id: Option<String>, message: impl Into<String>) {
        self.log(execution_id, node_id, LogLevel::Error, message).await;
    }
}
