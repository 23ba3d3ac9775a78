//! `{TOKEN}` resolution in free-form strings (email subjects, SMS bodies,
//! record-mutation field templates, ...).

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

use super::path::{dig_nested_one_level, resolve_unprefixed};
use super::ResolverContext;

/// Resolve every `{IDENTIFIER}` token in `template` against `ctx`.
///
/// `IDENTIFIER` is `[A-Za-z0-9_.]+`. A token with no resolvable value is left
/// in place (literal `{TOKEN}` text), which also makes resolution idempotent:
/// re-resolving an already-resolved string is a no-op because it no longer
/// contains any `{…}` runs that match a known value.
pub fn resolve_tokens(template: &str, ctx: &ResolverContext) -> String {
    let mut out = String::with_capacity(template.len());
    let chars: Vec<char> = template.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        if chars[i] != '{' {
            out.push(chars[i]);
            i += 1;
            continue;
        }

        // Scan forward for a closing brace over a valid identifier.
        let mut j = i + 1;
        while j < chars.len() && is_ident_char(chars[j]) {
            j += 1;
        }

        if j < chars.len() && chars[j] == '}' && j > i + 1 {
            let token: String = chars[i + 1..j].iter().collect();
            match resolve_token_value(&token, ctx) {
                Some(value) => out.push_str(&value),
                None => {
                    out.push('{');
                    out.push_str(&token);
                    out.push('}');
                }
            }
            i = j + 1;
        } else {
            out.push(chars[i]);
            i += 1;
        }
    }

    out
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '.'
}

/// Strip HTML tags and collapse entity-encoded whitespace from a resolved
/// message body. SMS providers don't render markup, so an EMAIL-authored
/// `html_body` template reused for SMS must come through as plain text.
pub fn strip_html(input: &str) -> String {
    static TAG: OnceLock<Regex> = OnceLock::new();
    let tag = TAG.get_or_init(|| Regex::new(r"(?s)<[^>]*>").unwrap());

    let without_tags = tag.replace_all(input, "");
    let unescaped = without_tags
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'");

    unescaped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Resolve a single token to its string representation, trying each
/// resolution step in order and returning on the first hit.
fn resolve_token_value(token: &str, ctx: &ResolverContext) -> Option<String> {
    resolve_system_variable(token, ctx)
        .or_else(|| resolve_module_alias(token, ctx))
        .or_else(|| resolve_snake_case_alias(token, ctx))
        .or_else(|| resolve_unprefixed(ctx, token))
        .or_else(|| case_insensitive_payload_lookup(token, ctx))
        .or_else(|| dig_nested_one_level(ctx.payload, token))
        .map(|v| value_to_string(&v))
}

fn value_to_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Step (a): system variables.
fn resolve_system_variable(token: &str, ctx: &ResolverContext) -> Option<Value> {
    match token {
        "CURRENT_DATE" => Some(Value::String(ctx.now.format("%Y-%m-%d").to_string())),
        "CURRENT_TIME" => Some(Value::String(ctx.now.format("%H:%M:%S").to_string())),
        "CURRENT_DATETIME" => Some(Value::String(ctx.now.to_rfc3339())),
        "CURRENT_USER" => ctx
            .user
            .and_then(|u| u.get("id").or_else(|| u.get("name")))
            .cloned(),
        "ORGANIZATION_NAME" => ctx.organization.and_then(|o| o.get("name")).cloned(),
        "USER_NAME" => ctx.user.and_then(|u| u.get("name")).cloned(),
        "USER_EMAIL" => ctx.user.and_then(|u| u.get("email")).cloned(),
        _ => None,
    }
}

/// Step (b): module-specific aliases for the event's module.
fn resolve_module_alias(token: &str, ctx: &ResolverContext) -> Option<Value> {
    let candidates: &[(&str, &str)] = match ctx.module.to_ascii_uppercase().as_str() {
        "CRM" => &[
            ("CUSTOMER_NAME", "customerName"),
            ("CUSTOMER_EMAIL", "customerEmail"),
            ("DEAL_AMOUNT", "amount"),
            ("DEAL_STAGE", "stage"),
        ],
        "HR" => &[
            ("EMPLOYEE_NAME", "employeeName"),
            ("EMPLOYEE_EMAIL", "employeeEmail"),
            ("TIME_OFF_TYPE", "type"),
        ],
        "FINANCE" => &[
            ("INVOICE_NUMBER", "invoiceNumber"),
            ("INVOICE_AMOUNT", "amount"),
            ("CUSTOMER_EMAIL", "customerEmail"),
        ],
        "PROJECTS" => &[
            ("PROJECT_NAME", "projectName"),
            ("TASK_NAME", "taskName"),
            ("ASSIGNEE_EMAIL", "assigneeEmail"),
        ],
        _ => &[],
    };

    candidates
        .iter()
        .find(|(alias, _)| *alias == token)
        .and_then(|(_, field)| ctx.payload.get(field))
        .cloned()
}

/// Step (c): snake_case alias expansion — `user_name` -> `user.name`,
/// `customer_email` -> `payload.customerEmail` falling back to `payload.email`.
fn resolve_snake_case_alias(token: &str, ctx: &ResolverContext) -> Option<Value> {
    if !token.contains('_') || token.contains('.') {
        return None;
    }

    match token {
        "customer_email" => ctx
            .payload
            .get("customerEmail")
            .or_else(|| ctx.payload.get("email"))
            .cloned(),
        "employee_email" => ctx
            .payload
            .get("employeeEmail")
            .or_else(|| ctx.payload.get("email"))
            .cloned(),
        _ => {
            let (scope, field) = token.split_once('_')?;
            let root = match scope {
                "user" => ctx.user,
                "organization" => ctx.organization,
                "trigger" => ctx.trigger,
                _ => None,
            }?;
            root.get(to_camel_case(field)).cloned()
        }
    }
}

fn to_camel_case(snake: &str) -> String {
    let mut out = String::new();
    let mut upper_next = false;
    for c in snake.chars() {
        if c == '_' {
            upper_next = true;
        } else if upper_next {
            out.extend(c.to_uppercase());
            upper_next = false;
        } else {
            out.push(c);
        }
    }
    out
}

/// Step (e): case-insensitive *direct* payload lookup (no dots).
fn case_insensitive_payload_lookup(token: &str, ctx: &ResolverContext) -> Option<Value> {
    if token.contains('.') {
        return None;
    }
    ctx.payload
        .as_object()?
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(token))
        .map(|(_, v)| v.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn ctx<'a>(
        module: &'a str,
        payload: &'a Value,
        user: Option<&'a Value>,
        shared: &'a HashMap<String, Value>,
        node_outputs: &'a HashMap<String, Value>,
    ) -> ResolverContext<'a> {
        ResolverContext {
            module,
            payload,
            user,
            organization: None,
            trigger: None,
            shared,
            node_outputs,
            loop_ctx: None,
            now: chrono::Utc::now(),
        }
    }

    #[test]
    fn resolves_payload_field_by_dot_path() {
        let payload = json!({"status": "CLOSED_WON"});
        let shared = HashMap::new();
        let node_outputs = HashMap::new();
        let c = ctx("CRM", &payload, None, &shared, &node_outputs);
        assert_eq!(
            resolve_tokens("Status is {payload.status}", &c),
            "Status is CLOSED_WON"
        );
    }

    #[test]
    fn missing_token_left_literal() {
        let payload = json!({});
        let shared = HashMap::new();
        let node_outputs = HashMap::new();
        let c = ctx("CRM", &payload, None, &shared, &node_outputs);
        assert_eq!(resolve_tokens("Hello {NOPE_HERE}", &c), "Hello {NOPE_HERE}");
    }

    #[test]
    fn resolution_is_idempotent() {
        let payload = json!({"status": "CLOSED_WON"});
        let shared = HashMap::new();
        let node_outputs = HashMap::new();
        let c = ctx("CRM", &payload, None, &shared, &node_outputs);
        let once = resolve_tokens("{payload.status}", &c);
        let twice = resolve_tokens(&once, &c);
        assert_eq!(once, twice);
    }

    #[test]
    fn module_alias_resolves_crm_customer_name() {
        let payload = json!({"customerName": "Acme Inc"});
        let shared = HashMap::new();
        let node_outputs = HashMap::new();
        let c = ctx("CRM", &payload, None, &shared, &node_outputs);
        assert_eq!(resolve_tokens("{CUSTOMER_NAME}", &c), "Acme Inc");
    }

    #[test]
    fn strip_html_removes_tags_and_collapses_whitespace() {
        let body = "<p>Hi {user_name},</p>\n<br/>  your invoice is <b>due</b>.";
        assert_eq!(strip_html(body), "Hi {user_name}, your invoice is due.");
    }

    #[test]
    fn snake_case_user_name_maps_to_dot_path() {
        let payload = json!({});
        let user = json!({"name": "Priya"});
        let shared = HashMap::new();
        let node_outputs = HashMap::new();
        let c = ctx("CRM", &payload, Some(&user), &shared, &node_outputs);
        assert_eq!(resolve_tokens("Hi {user_name}", &c), "Hi Priya");
    }
}
