//! Structural graph validation — run this before persisting or executing a
//! workflow.
//!
//! Rules enforced:
//! 1. Node IDs must be unique within the workflow.
//! 2. Every connection must reference valid node IDs (both source and target).
//!
//! Unlike a conventional DAG validator this does *not* reject cycles: a LOOP
//! node's body legitimately routes back to the loop node, and the executor
//! (not this module) bounds repeated visits with a per-node visit cap.

use std::collections::HashSet;

use crate::{models::Workflow, EngineError};

/// Validate the workflow graph's structure.
///
/// # Errors
/// - [`EngineError::DuplicateNodeId`] if two nodes share an ID.
/// - [`EngineError::UnknownNodeReference`] if a connection references a
///   missing node.
pub fn validate_graph(workflow: &Workflow) -> Result<(), EngineError> {
    let mut seen_ids: HashSet<&str> = HashSet::new();
    for node in &workflow.nodes {
        if !seen_ids.insert(node.id.as_str()) {
            return Err(EngineError::DuplicateNodeId(node.id.clone()));
        }
    }

    let node_set: HashSet<&str> = workflow.nodes.iter().map(|n| n.id.as_str()).collect();

    for connection in &workflow.connections {
        if !node_set.contains(connection.source_node_id.as_str()) {
            return Err(EngineError::UnknownNodeReference {
                node_id: connection.source_node_id.clone(),
                side: "source",
            });
        }
        if !node_set.contains(connection.target_node_id.as_str()) {
            return Err(EngineError::UnknownNodeReference {
                node_id: connection.target_node_id.clone(),
                side: "target",
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Connection, Trigger, WorkflowNode};
    use nodes::NodeKind;
    use uuid::Uuid;

    fn make_node(id: &str) -> WorkflowNode {
        WorkflowNode {
            id: id.to_string(),
            kind: NodeKind::Trigger,
            is_optional: false,
            retry_limit: None,
            timeout_seconds: None,
        }
    }

    fn conn(from: &str, to: &str) -> Connection {
        Connection {
            source_node_id: from.into(),
            target_node_id: to.into(),
            branch: None,
            execution_order: None,
        }
    }

    fn make_workflow(nodes: Vec<WorkflowNode>, connections: Vec<Connection>) -> Workflow {
        Workflow::new("test", Uuid::new_v4(), Trigger::Manual, nodes, connections)
    }

    #[test]
    fn valid_linear_graph_passes() {
        let wf = make_workflow(
            vec![make_node("a"), make_node("b"), make_node("c")],
            vec![conn("a", "b"), conn("b", "c")],
        );
        assert!(validate_graph(&wf).is_ok());
    }

    #[test]
    fn duplicate_node_id_is_rejected() {
        let wf = make_workflow(vec![make_node("a"), make_node("a")], vec![]);
        assert!(matches!(
            validate_graph(&wf),
            Err(EngineError::DuplicateNodeId(id)) if id == "a"
        ));
    }

    #[test]
    fn connection_referencing_missing_node_is_rejected() {
        let wf = make_workflow(vec![make_node("a")], vec![conn("a", "ghost")]);
        assert!(matches!(
            validate_graph(&wf),
            Err(EngineError::UnknownNodeReference { node_id, .. }) if node_id == "ghost"
        ));
    }

    #[test]
    fn a_loop_back_edge_is_accepted() {
        // LOOP body legitimately routes back to the loop node itself.
        let wf = make_workflow(
            vec![make_node("loop"), make_node("body")],
            vec![conn("loop", "body"), conn("body", "loop")],
        );
        assert!(validate_graph(&wf).is_ok());
    }

    #[test]
    fn single_node_no_connections_is_valid() {
        let wf = make_workflow(vec![make_node("solo")], vec![]);
        assert!(validate_graph(&wf).is_ok());
    }
}
