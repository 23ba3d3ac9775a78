//! Dot-path resolution against the layered per-execution context.

use serde_json::Value;

use super::ResolverContext;

/// Walk a dot-separated path (`a.b.c`) into a JSON value. Array indices are
/// not supported — only object field access, matching spec.md's "dot-path"
/// wording.
pub fn dig(root: &Value, path: &str) -> Option<Value> {
    if path.is_empty() {
        return Some(root.clone());
    }
    let mut current = root;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current.clone())
}

/// Case-insensitive single-segment lookup on a JSON object.
fn dig_ci(obj: &Value, key: &str) -> Option<Value> {
    let map = obj.as_object()?;
    if let Some(v) = map.get(key) {
        return Some(v.clone());
    }
    map.iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| v.clone())
}

/// One-level nested scan: look for `key` inside any object-valued field of
/// `root` (used as the last-resort fallback in token resolution, §4.4(f)).
pub fn dig_nested_one_level(root: &Value, key: &str) -> Option<Value> {
    let map = root.as_object()?;
    for value in map.values() {
        if value.is_object() {
            if let Some(found) = dig_ci(value, key) {
                return Some(found);
            }
        }
    }
    None
}

/// Resolve a plain (unprefixed) dot-path across `{payload, user, organization,
/// trigger}` in that order — used by token resolution step (d).
pub fn resolve_unprefixed(ctx: &ResolverContext, path: &str) -> Option<Value> {
    let mut segments = path.splitn(2, '.');
    let head = segments.next().unwrap_or_default();
    let rest = segments.next();

    let scoped_root = match head {
        "payload" => Some(ctx.payload),
        "user" => ctx.user,
        "organization" => ctx.organization,
        "trigger" => ctx.trigger,
        _ => None,
    };
    if let Some(root) = scoped_root {
        return match rest {
            Some(rest) => dig(root, rest),
            None => Some(root.clone()),
        };
    }

    for root in [Some(ctx.payload), ctx.user, ctx.organization, ctx.trigger]
        .into_iter()
        .flatten()
    {
        if let Some(v) = dig(root, path) {
            return Some(v);
        }
    }
    None
}

/// Resolve a condition `path` with its optional scope prefix:
/// `$trigger.`, `$payload.`, `$context.` (the `shared` map), `$node.<id>.…`,
/// `$loop.`. An unrecognised prefix (or no prefix at all) falls back to a
/// union scan across `shared`, `node_outputs`, and `payload`.
pub fn resolve_prefixed(ctx: &ResolverContext, path: &str) -> Option<Value> {
    if let Some(rest) = path.strip_prefix("$trigger.") {
        return ctx.trigger.and_then(|t| dig(t, rest));
    }
    if let Some(rest) = path.strip_prefix("$payload.") {
        return dig(ctx.payload, rest);
    }
    if let Some(rest) = path.strip_prefix("$context.") {
        let mut parts = rest.splitn(2, '.');
        let key = parts.next()?;
        let shared_value = ctx.shared.get(key)?;
        return match parts.next() {
            Some(nested) => dig(shared_value, nested),
            None => Some(shared_value.clone()),
        };
    }
    if let Some(rest) = path.strip_prefix("$node.") {
        let mut parts = rest.splitn(2, '.');
        let node_id = parts.next()?;
        let output = ctx.node_outputs.get(node_id)?;
        return match parts.next() {
            Some(nested) => dig(output, nested),
            None => Some(output.clone()),
        };
    }
    if let Some(rest) = path.strip_prefix("$loop.") {
        return ctx.loop_ctx.and_then(|l| dig(l, rest));
    }

    // Unknown prefix, or a plain path: union scan.
    for (key, value) in ctx.shared {
        if key == path {
            return Some(value.clone());
        }
    }
    for (key, value) in ctx.node_outputs {
        if key == path {
            return Some(value.clone());
        }
    }
    dig(ctx.payload, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn dig_walks_nested_objects() {
        let root = json!({"a": {"b": {"c": 42}}});
        assert_eq!(dig(&root, "a.b.c"), Some(json!(42)));
        assert_eq!(dig(&root, "a.b.missing"), None);
    }

    #[test]
    fn resolve_prefixed_context_uses_shared_map() {
        let mut shared = std::collections::HashMap::new();
        shared.insert("my_result".to_string(), json!({"total": 3}));
        let payload = json!({});
        let node_outputs = std::collections::HashMap::new();
        let ctx = ResolverContext {
            module: "CRM",
            payload: &payload,
            user: None,
            organization: None,
            trigger: None,
            shared: &shared,
            node_outputs: &node_outputs,
            loop_ctx: None,
            now: chrono::Utc::now(),
        };
        assert_eq!(
            resolve_prefixed(&ctx, "$context.my_result.total"),
            Some(json!(3))
        );
    }
}
