//! EMAIL node — resolves its templated fields against the execution context
//! and sends through the injected [`EmailSink`].

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::adapters::EmailMessage;
use crate::config::EmailConfig;
use crate::resolver::vars::resolve_tokens;
use crate::{ExecutableNode, ExecutionContext, NodeError, NodeOutcome};

pub struct EmailNode {
    pub config: EmailConfig,
}

impl EmailNode {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    /// Falls back to the override, then a module-specific resolution chain:
    /// Projects prefers the assignee, falling back to the creator; Finance
    /// prefers the triggering user over the record's own creator/updater,
    /// falling back to `customerEmail`; every other module uses the generic
    /// field list.
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
            "PROJECTS" => payload_field("assigneeEmail").or_else(|| payload_field("creatorEmail")),
            "FINANCE" => ctx
                .user
                .as_ref()
                .and_then(|u| u.get("email"))
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .or_else(|| payload_field("creatorEmail"))
                .or_else(|| payload_field("updaterEmail"))
                .or_else(|| payload_field("customerEmail")),
            _ => ["customerEmail", "employeeEmail", "assigneeEmail", "email"]
                .into_iter()
                .find_map(payload_field),
        }
    }
}

#[async_trait]
impl ExecutableNode for EmailNode {
    async fn execute(&self, _input: Value, ctx: &ExecutionContext) -> Result<NodeOutcome, NodeError> {
        let resolver = ctx.resolver_ctx();

        let to = self
            .recipient(ctx)
            .ok_or_else(|| NodeError::Fatal("EMAIL node could not resolve a recipient".into()))?;

        let message = EmailMessage {
            to,
            subject: resolve_tokens(&self.config.subject, &resolver),
            html_body: self.config.html_body.as_deref().map(|b| resolve_tokens(b, &resolver)),
            text_body: self.config.text_body.as_deref().map(|b| resolve_tokens(b, &resolver)),
            from_name: self.config.from_name.clone(),
            from_email: self.config.from_email.clone(),
            reply_to: self.config.reply_to.clone(),
            cc: Vec::new(),
            bcc: Vec::new(),
            attachments: Vec::new(),
        };

        let result = ctx
            .email_sink
            .send(message)
            .await
            .map_err(|e| NodeError::Retryable(e.to_string()))?;

        if !result.success {
            return Err(NodeError::Retryable(
                result.error.unwrap_or_else(|| "email send failed".into()),
            ));
        }

        Ok(NodeOutcome::Completed(json!({
            "messageId": result.message_id,
        })))
    }
}
