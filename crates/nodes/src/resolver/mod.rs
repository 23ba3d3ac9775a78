//! Variable Resolver & Condition Engine.
//!
//! Shared by the `engine` executor's node interpreters and, directly, by the
//! CONDITION/LOOP/FILTER/QUERY node implementations in this crate. Lives here
//! rather than in `engine` so both sides can use it without a circular
//! dependency (`engine` already depends on `nodes`).

pub mod condition;
pub mod path;
pub mod vars;

use serde_json::Value;
use std::collections::HashMap;

/// Everything variable resolution and condition evaluation can see during a
/// single node's execution.
///
/// All fields are borrowed snapshots taken by the executor for the duration
/// of one node interpretation; nothing here is mutated through this type.
#[derive(Debug, Clone, Copy)]
pub struct ResolverContext<'a> {
    /// The dispatching event's module (`CRM`, `HR`, `FINANCE`, `PROJECTS`, ...).
    pub module: &'a str,
    pub payload: &'a Value,
    pub user: Option<&'a Value>,
    pub organization: Option<&'a Value>,
    pub trigger: Option<&'a Value>,
    /// Per-execution `shared` map, keyed by user-declared `resultKey`.
    pub shared: &'a HashMap<String, Value>,
    /// Per-execution `nodeOutputs` map, keyed by graph `nodeId`.
    pub node_outputs: &'a HashMap<String, Value>,
    /// Current LOOP iteration context (`$loop.item` / `$loop.index` / `$loop.total`), if any.
    pub loop_ctx: Option<&'a Value>,
    pub now: chrono::DateTime<chrono::Utc>,
}
