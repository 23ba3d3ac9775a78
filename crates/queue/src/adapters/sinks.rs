//! Production placeholders for the third-party transport clients SPEC_FULL.md
//! explicitly scopes out ("third-party transport clients" Non-goal). These
//! satisfy `ExecutionContext`'s required `Arc<dyn EmailSink>` with a sink
//! that logs the would-be send and reports success, so a workflow's EMAIL
//! nodes behave deterministically without needing a real ESP wired in. A
//! production deployment swaps this for a real `EmailSink` impl; nothing
//! else in the engine needs to change.

use async_trait::async_trait;
use nodes::adapters::{AdapterError, EmailMessage, EmailResult, EmailSink};
use tracing::info;
use uuid::Uuid;

pub struct LoggingEmailSink;

#[async_trait]
impl EmailSink for LoggingEmailSink {
    async fn send(&self, message: EmailMessage) -> Result<EmailResult, AdapterError> {
        let message_id = Uuid::new_v4().to_string();
        info!(to = %message.to, subject = %message.subject, %message_id, "email send (no ESP configured, logging only)");
        Ok(EmailResult {
            success: true,
            message_id: Some(message_id),
            error: None,
        })
    }
}
