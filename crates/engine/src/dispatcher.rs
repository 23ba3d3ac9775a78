//! Event Dispatcher — matches an inbound domain event against every active
//! workflow in the event's organization that owns an `Event` trigger, scored
//! by specificity so the most precisely-targeted workflow runs first.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use nodes::resolver::condition::evaluate_group;
use nodes::resolver::ResolverContext;
use serde_json::Value;
use uuid::Uuid;

use crate::models::{Trigger, Workflow, WorkflowTrigger};

/// Decouples the dispatcher from the persistence library, per the
/// ORM-decoupling design note; `db::repository::workflows` implements this.
#[async_trait]
pub trait WorkflowSource: Send + Sync {
    /// Active, `Trigger::Event`-triggered workflows belonging to
    /// `organization_id` whose `module` matches (event_type/entity_type
    /// filtering beyond the wildcard case happens here, not in the store, so
    /// a `"*"` event_type trigger is always a candidate).
    async fn active_event_workflows(
        &self,
        organization_id: Uuid,
        module: &str,
    ) -> Result<Vec<Workflow>, db::DbError>;
}

/// A domain event dispatched against the workflow engine.
#[derive(Debug, Clone)]
pub struct DomainEvent {
    pub organization_id: Uuid,
    pub module: String,
    pub entity_type: Option<String>,
    pub event_type: String,
    pub payload: Value,
    pub user: Option<Value>,
    pub organization: Option<Value>,
}

/// Entity-type aliases within a module, so e.g. a trigger declared against
/// `contact` still fires for an event carrying `customer`.
fn entity_aliases(module: &str) -> &'static [&'static [&'static str]] {
    match module.to_ascii_uppercase().as_str() {
        "CRM" => &[&["customer", "contact"], &["deal", "opportunity"]],
        "HR" => &[&["timeoff", "time_off"]],
        _ => &[],
    }
}

fn entity_type_matches(module: &str, a: &str, b: &str) -> bool {
    if a.eq_ignore_ascii_case(b) {
        return true;
    }
    let a = a.to_ascii_lowercase();
    let b = b.to_ascii_lowercase();
    entity_aliases(module)
        .iter()
        .any(|group| group.contains(&a.as_str()) && group.contains(&b.as_str()))
}

/// Score how specifically `trigger` matches `event`, or `None` if it doesn't
/// match at all.
///
/// `score = (exact entity_type match ? 2 : 0) + (exact event_type match ? 2 : 0)`.
/// Module and event_type comparisons are case-insensitive; a `"*"`
/// event_type is a match but never an "exact" one. A trigger with no
/// `entity_type` set matches any entity and contributes 0 toward that half
/// of the score.
fn specificity(trigger: &Trigger, event: &DomainEvent) -> Option<u32> {
    let Trigger::Event {
        module,
        event_type,
        entity_type,
        conditions,
    } = trigger
    else {
        return None;
    };

    if !module.eq_ignore_ascii_case(&event.module) {
        return None;
    }

    let event_type_exact = event_type.eq_ignore_ascii_case(&event.event_type);
    if event_type != "*" && !event_type_exact {
        return None;
    }

    let entity_type_exact = match (entity_type, &event.entity_type) {
        (Some(trigger_entity), Some(event_entity)) => {
            if !entity_type_matches(module, trigger_entity, event_entity) {
                return None;
            }
            true
        }
        (Some(_), None) => return None,
        (None, _) => false,
    };

    let empty_shared = HashMap::new();
    let empty_outputs = HashMap::new();
    let resolver = ResolverContext {
        module: &event.module,
        payload: &event.payload,
        user: event.user.as_ref(),
        organization: event.organization.as_ref(),
        trigger: None,
        shared: &empty_shared,
        node_outputs: &empty_outputs,
        loop_ctx: None,
        now: Utc::now(),
    };

    if !evaluate_group(conditions, &resolver) {
        return None;
    }

    let mut score = 0;
    if entity_type_exact {
        score += 2;
    }
    if event_type_exact {
        score += 2;
    }
    Some(score)
}

/// The best-matching trigger (and its score) among a workflow's active
/// event triggers, or `None` if none match.
fn best_matching_trigger<'a>(
    triggers: &'a [WorkflowTrigger],
    event: &DomainEvent,
) -> Option<(u32, &'a WorkflowTrigger)> {
    triggers
        .iter()
        .filter(|t| t.is_active)
        .filter_map(|t| specificity(&t.trigger, event).map(|score| (score, t)))
        .max_by_key(|(score, _)| *score)
}

/// Find every active workflow in the event's organization that owns a
/// matching `Event` trigger, most specific first.
pub async fn dispatch(
    source: &dyn WorkflowSource,
    event: &DomainEvent,
) -> Result<Vec<Workflow>, db::DbError> {
    let candidates = source
        .active_event_workflows(event.organization_id, &event.module)
        .await?;

    let mut scored: Vec<(u32, Workflow)> = candidates
        .into_iter()
        .filter_map(|wf| {
            best_matching_trigger(&wf.triggers, event).map(|(score, _)| (score, wf))
        })
        .collect();

    scored.sort_by(|a, b| b.0.cmp(&a.0));
    Ok(scored.into_iter().map(|(_, wf)| wf).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodes::resolver::condition::{Condition, ConditionGroup, Operator};
    use serde_json::json;

    fn event_trigger(module: &str, event_type: &str, entity_type: Option<&str>, conditions: Vec<Condition>) -> Trigger {
        Trigger::Event {
            module: module.into(),
            event_type: event_type.into(),
            entity_type: entity_type.map(str::to_string),
            conditions: ConditionGroup {
                conditions,
                ..Default::default()
            },
        }
    }

    fn event(module: &str, event_type: &str, entity_type: Option<&str>, payload: Value) -> DomainEvent {
        DomainEvent {
            organization_id: Uuid::new_v4(),
            module: module.into(),
            entity_type: entity_type.map(str::to_string),
            event_type: event_type.into(),
            payload,
            user: None,
            organization: None,
        }
    }

    #[test]
    fn exact_event_type_outranks_wildcard() {
        let e = event("CRM", "deal.won", None, json!({}));
        let exact = specificity(&event_trigger("CRM", "deal.won", None, vec![]), &e).unwrap();
        let wildcard = specificity(&event_trigger("CRM", "*", None, vec![]), &e).unwrap();
        assert!(exact > wildcard);
    }

    #[test]
    fn non_matching_module_is_excluded() {
        let e = event("HR", "deal.won", None, json!({}));
        assert!(specificity(&event_trigger("CRM", "deal.won", None, vec![]), &e).is_none());
    }

    #[test]
    fn module_comparison_is_case_insensitive() {
        let e = event("crm", "deal.won", None, json!({}));
        assert!(specificity(&event_trigger("CRM", "deal.won", None, vec![]), &e).is_some());
    }

    #[test]
    fn exact_entity_type_raises_specificity_over_no_entity_type() {
        let e = event("CRM", "deal.won", Some("opportunity"), json!({}));
        let no_entity = specificity(&event_trigger("CRM", "deal.won", None, vec![]), &e).unwrap();
        let with_entity = specificity(&event_trigger("CRM", "deal.won", Some("opportunity"), vec![]), &e).unwrap();
        assert!(with_entity > no_entity);
    }

    #[test]
    fn aliased_entity_type_still_matches() {
        let e = event("CRM", "updated", Some("customer"), json!({}));
        assert!(specificity(&event_trigger("CRM", "updated", Some("contact"), vec![]), &e).is_some());

        let e2 = event("HR", "requested", Some("time_off"), json!({}));
        assert!(specificity(&event_trigger("HR", "requested", Some("timeoff"), vec![]), &e2).is_some());
    }

    #[test]
    fn mismatched_entity_type_excludes_trigger() {
        let e = event("CRM", "deal.won", Some("customer"), json!({}));
        assert!(specificity(&event_trigger("CRM", "deal.won", Some("opportunity"), vec![]), &e).is_none());
    }

    #[test]
    fn failing_condition_excludes_trigger_without_affecting_score() {
        let e = event("CRM", "deal.won", None, json!({"amount": 500}));
        let condition = Condition {
            field: "payload.amount".into(),
            value: Some(json!(1000)),
            ..Default::default()
        }
        .with_operator(Operator::Gt);
        assert!(specificity(&event_trigger("CRM", "deal.won", None, vec![condition]), &e).is_none());
    }

    /// Scenario 1: a workflow owns two triggers on the same module/event —
    /// one generic, one narrowed to a specific entity_type — and dispatch
    /// must pick the more specific one when both match.
    #[test]
    fn best_matching_trigger_picks_the_more_specific_of_two_on_one_workflow() {
        let t1 = WorkflowTrigger::new("n1", event_trigger("CRM", "deal.won", None, vec![]));
        let t2 = WorkflowTrigger::new("n2", event_trigger("CRM", "deal.won", Some("opportunity"), vec![]));
        let e = event("CRM", "deal.won", Some("opportunity"), json!({}));

        let (score, winner) = best_matching_trigger(&[t1, t2.clone()], &e).unwrap();
        assert_eq!(score, 4);
        assert_eq!(winner.node_id, t2.node_id);
    }

    #[test]
    fn inactive_trigger_is_never_a_candidate() {
        let mut t = WorkflowTrigger::new("n1", event_trigger("CRM", "deal.won", None, vec![]));
        t.is_active = false;
        let e = event("CRM", "deal.won", None, json!({}));
        assert!(best_matching_trigger(&[t], &e).is_none());
    }
}
