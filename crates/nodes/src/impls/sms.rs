//! SMS node — sends through the injected [`SmsSink`], or reports a clean
//! skip when no SMS provider is configured for the organization.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::adapters::SmsMessage;
use crate::config::SmsConfig;
use crate::resolver::vars::{resolve_tokens, strip_html};
use crate::{ExecutableNode, ExecutionContext, NodeError, NodeOutcome};

pub struct SmsNode {
    pub config: SmsConfig,
}

impl SmsNode {
    pub fn new(config: SmsConfig) -> Self {
        Self { config }
    }

    /// Same module-specific fallback chain as the EMAIL node, over phone
    /// fields instead of email fields.
    fn recipient(&self, ctx: &ExecutionContext) -> Option<String> {
        let resolver = ctx.resolver_ctx();
        if let Some(override_value) = &self.config.recipient_override {
            let resolved = resolve_tokens(override_value, &resolver);
            if !resolved.is_empty() && !resolved.starts_with('{') {
                return Some(resolved);
            }
        }

        let payload_field = |field: &str| ctx.payload.get(field).and_then(|v| v.as_str()).map(str::to_string);

        match ctx.module.to_ascii_uppercase().as_str() {
            "PROJECTS" => payload_field("assigneePhone").or_else(|| payload_field("creatorPhone")),
            "FINANCE" => ctx
                .user
                .as_ref()
                .and_then(|u| u.get("phone"))
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .or_else(|| payload_field("creatorPhone"))
                .or_else(|| payload_field("updaterPhone"))
                .or_else(|| payload_field("customerPhone")),
            _ => ["phone", "customerPhone", "employeePhone"].into_iter().find_map(payload_field),
        }
    }
}

#[async_trait]
impl ExecutableNode for SmsNode {
    async fn execute(&self, _input: Value, ctx: &ExecutionContext) -> Result<NodeOutcome, NodeError> {
        let Some(sink) = &ctx.sms_sink else {
            return Ok(NodeOutcome::Skipped(json!({ "skipped": true, "reason": "no SMS provider configured" })));
        };

        let resolver = ctx.resolver_ctx();
        let to = self
            .recipient(ctx)
            .ok_or_else(|| NodeError::Fatal("SMS node could not resolve a recipient".into()))?;

        let message = SmsMessage {
            to,
            message: strip_html(&resolve_tokens(&self.config.message, &resolver)),
            from_number: self.config.from_number.clone(),
            media_url: None,
        };

        let result = sink.send(message).await.map_err(|e| NodeError::Retryable(e.to_string()))?;

        if result.skipped {
            return Ok(NodeOutcome::Skipped(json!({ "skipped": true })));
        }
        if !result.success {
            return Err(NodeError::Retryable(
                result.error.unwrap_or_else(|| "sms send failed".into()),
            ));
        }

        Ok(NodeOutcome::Completed(json!({
            "messageSid": result.message_sid,
            "status": result.status,
        })))
    }
}
