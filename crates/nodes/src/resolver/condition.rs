//! The uniform filter-operator set shared by CONDITION, LOOP break
//! conditions, FILTER, and QUERY `where` construction.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use super::path::resolve_prefixed;
use super::ResolverContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Equals,
    NotEquals,
    Gt,
    Gte,
    Lt,
    Lte,
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    In,
    NotIn,
    Between,
    IsEmpty,
    IsNotEmpty,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Condition {
    /// Plain field name / dot path, resolved against the payload when `path`
    /// is absent.
    pub field: String,
    #[serde(default)]
    operator: Option<Operator>,
    pub value: Option<Value>,
    pub value_to: Option<Value>,
    pub values: Option<Vec<Value>>,
    /// Prefixed path (`$trigger.`, `$payload.`, `$context.`, `$node.<id>.`,
    /// `$loop.`); overrides `field` when present.
    pub path: Option<String>,
    #[serde(default)]
    pub negate: bool,
}

impl Condition {
    pub fn operator(&self) -> Operator {
        self.operator.unwrap_or(Operator::Equals)
    }

    pub fn with_operator(mut self, op: Operator) -> Self {
        self.operator = Some(op);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogicalOperator {
    #[default]
    And,
    Or,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConditionGroup {
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub logical_operator: LogicalOperator,
}

/// Evaluate a condition group. An empty condition list is vacuously true
/// (absent conditions never block a match, per spec.md §4.1/§4.2).
pub fn evaluate_group(group: &ConditionGroup, ctx: &ResolverContext) -> bool {
    if group.conditions.is_empty() {
        return true;
    }
    match group.logical_operator {
        LogicalOperator::And => group.conditions.iter().all(|c| evaluate(c, ctx)),
        LogicalOperator::Or => group.conditions.iter().any(|c| evaluate(c, ctx)),
    }
}

/// Evaluate a single condition. Malformed trees (a field/path that resolves
/// to nothing, a `between` without `value_to`, ...) degrade to `false` with a
/// `WARN` log rather than panicking or propagating an error — the dispatcher
/// and CONDITION node both rely on this to skip rather than abort.
pub fn evaluate(condition: &Condition, ctx: &ResolverContext) -> bool {
    let subject = resolve_subject(condition, ctx);
    let result = evaluate_operator(condition, subject.as_ref());
    if condition.negate {
        !result
    } else {
        result
    }
}

fn resolve_subject(condition: &Condition, ctx: &ResolverContext) -> Option<Value> {
    match &condition.path {
        Some(path) => resolve_prefixed(ctx, path),
        None => super::path::resolve_unprefixed(ctx, &condition.field).or_else(|| {
            // Union fallback across shared/node outputs for a bare field name.
            resolve_prefixed(ctx, &condition.field)
        }),
    }
}

fn evaluate_operator(condition: &Condition, subject: Option<&Value>) -> bool {
    use Operator::*;

    match condition.operator() {
        IsEmpty => is_empty(subject),
        IsNotEmpty => !is_empty(subject),
        Equals => values_equal(subject, condition.value.as_ref()),
        NotEquals => !values_equal(subject, condition.value.as_ref()),
        Gt => compare_numeric(subject, condition.value.as_ref(), |a, b| a > b),
        Gte => compare_numeric(subject, condition.value.as_ref(), |a, b| a >= b),
        Lt => compare_numeric(subject, condition.value.as_ref(), |a, b| a < b),
        Lte => compare_numeric(subject, condition.value.as_ref(), |a, b| a <= b),
        Contains => contains(subject, condition.value.as_ref()),
        NotContains => !contains(subject, condition.value.as_ref()),
        StartsWith => string_op(subject, condition.value.as_ref(), str::starts_with),
        EndsWith => string_op(subject, condition.value.as_ref(), str::ends_with),
        In => match &condition.values {
            Some(values) => values.iter().any(|v| values_equal(subject, Some(v))),
            None => {
                warn!("condition: `in` operator used without `values`, treating as non-match");
                false
            }
        },
        NotIn => match &condition.values {
            Some(values) => !values.iter().any(|v| values_equal(subject, Some(v))),
            None => {
                warn!("condition: `not_in` operator used without `values`, treating as non-match");
                false
            }
        },
        Between => match (subject, condition.value.as_ref(), condition.value_to.as_ref()) {
            (Some(s), Some(lo), Some(hi)) => {
                let (s, lo, hi) = match (as_f64(s), as_f64(lo), as_f64(hi)) {
                    (Some(s), Some(lo), Some(hi)) => (s, lo, hi),
                    _ => {
                        warn!("condition: `between` operands are not numeric, treating as non-match");
                        return false;
                    }
                };
                s >= lo && s <= hi
            }
            _ => {
                warn!("condition: `between` missing subject/value/value_to, treating as non-match");
                false
            }
        },
    }
}

fn is_empty(v: Option<&Value>) -> bool {
    match v {
        None => true,
        Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(Value::Array(a)) => a.is_empty(),
        Some(Value::Object(o)) => o.is_empty(),
        Some(_) => false,
    }
}

/// Equality with numeric-string coercion. String comparisons require both
/// operands to actually be strings (a number is never `==` a numeric string
/// under this operator family — only under explicit numeric coercion).
fn values_equal(a: Option<&Value>, b: Option<&Value>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => {
            if a == b {
                return true;
            }
            match (as_f64(a), as_f64(b)) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            }
        }
        _ => false,
    }
}

fn compare_numeric(a: Option<&Value>, b: Option<&Value>, op: impl Fn(f64, f64) -> bool) -> bool {
    match (a.and_then(as_f64), b.and_then(as_f64)) {
        (Some(a), Some(b)) => op(a, b),
        _ => false,
    }
}

/// `contains`: substring check for strings, element-equality check for
/// arrays.
fn contains(subject: Option<&Value>, needle: Option<&Value>) -> bool {
    match (subject, needle) {
        (Some(Value::String(s)), Some(Value::String(n))) => s.contains(n.as_str()),
        (Some(Value::Array(items)), Some(needle)) => items.iter().any(|i| values_equal(Some(i), Some(needle))),
        _ => false,
    }
}

fn string_op(subject: Option<&Value>, other: Option<&Value>, op: impl Fn(&str, &str) -> bool) -> bool {
    match (subject, other) {
        (Some(Value::String(s)), Some(Value::String(o))) => op(s.as_str(), o.as_str()),
        _ => false,
    }
}

/// Coerce a JSON value to `f64`: numbers pass through, numeric strings parse,
/// everything else fails.
fn as_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn empty_maps() -> (HashMap<String, Value>, HashMap<String, Value>) {
        (HashMap::new(), HashMap::new())
    }

    fn ctx<'a>(
        payload: &'a Value,
        shared: &'a HashMap<String, Value>,
        node_outputs: &'a HashMap<String, Value>,
    ) -> ResolverContext<'a> {
        ResolverContext {
            module: "CRM",
            payload,
            user: None,
            organization: None,
            trigger: None,
            shared,
            node_outputs,
            loop_ctx: None,
            now: chrono::Utc::now(),
        }
    }

    #[test]
    fn and_group_numeric_coercion() {
        let payload = json!({"status": "CLOSED_WON", "amount": 1000});
        let (shared, node_outputs) = empty_maps();
        let c = ctx(&payload, &shared, &node_outputs);
        let group = ConditionGroup {
            logical_operator: LogicalOperator::And,
            conditions: vec![
                Condition {
                    field: "payload.status".into(),
                    operator: Some(Operator::Equals),
                    value: Some(json!("CLOSED_WON")),
                    ..Default::default()
                },
                Condition {
                    field: "payload.amount".into(),
                    operator: Some(Operator::Gt),
                    value: Some(json!(500)),
                    ..Default::default()
                },
            ],
        };
        assert!(evaluate_group(&group, &c));
    }

    #[test]
    fn and_group_fails_when_one_condition_fails() {
        let payload = json!({"status": "CLOSED_WON", "amount": 300});
        let (shared, node_outputs) = empty_maps();
        let c = ctx(&payload, &shared, &node_outputs);
        let group = ConditionGroup {
            logical_operator: LogicalOperator::And,
            conditions: vec![
                Condition {
                    field: "payload.status".into(),
                    operator: Some(Operator::Equals),
                    value: Some(json!("CLOSED_WON")),
                    ..Default::default()
                },
                Condition {
                    field: "payload.amount".into(),
                    operator: Some(Operator::Gt),
                    value: Some(json!(500)),
                    ..Default::default()
                },
            ],
        };
        assert!(!evaluate_group(&group, &c));
    }

    #[test]
    fn negate_flips_result() {
        let payload = json!({"status": "OPEN"});
        let (shared, node_outputs) = empty_maps();
        let c = ctx(&payload, &shared, &node_outputs);
        let base = Condition {
            field: "payload.status".into(),
            operator: Some(Operator::Equals),
            value: Some(json!("OPEN")),
            ..Default::default()
        };
        let negated = Condition {
            negate: true,
            ..base.clone()
        };
        assert_eq!(evaluate(&negated, &c), !evaluate(&base, &c));
    }

    #[test]
    fn is_empty_on_missing_field() {
        let payload = json!({});
        let (shared, node_outputs) = empty_maps();
        let c = ctx(&payload, &shared, &node_outputs);
        let cond = Condition {
            field: "payload.nothing".into(),
            operator: Some(Operator::IsEmpty),
            ..Default::default()
        };
        assert!(evaluate(&cond, &c));
    }

    #[test]
    fn between_with_missing_value_to_is_non_match_not_panic() {
        let payload = json!({"amount": 10});
        let (shared, node_outputs) = empty_maps();
        let c = ctx(&payload, &shared, &node_outputs);
        let cond = Condition {
            field: "payload.amount".into(),
            operator: Some(Operator::Between),
            value: Some(json!(5)),
            ..Default::default()
        };
        assert!(!evaluate(&cond, &c));
    }
}
