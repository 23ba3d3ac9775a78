//! Engine-level error types.

use thiserror::Error;

/// Errors produced by the workflow engine (validation + execution).
#[derive(Debug, Error)]
pub enum EngineError {
    // ------ Validation errors ------
    /// Two or more nodes share the same ID.
    #[error("duplicate node ID: '{0}'")]
    DuplicateNodeId(String),

    /// A connection references a node ID that doesn't exist in the workflow.
    #[error("connection references unknown node '{node_id}' ({side} side)")]
    UnknownNodeReference { node_id: String, side: &'static str },

    /// A workflow definition is structurally invalid in a way that can be
    /// caught before execution starts (bad cron expression, missing required
    /// node config, unsupported record model, ...).
    #[error("invalid workflow definition: {0}")]
    DefinitionError(String),

    /// The workflow referenced by an execution request does not exist (or is
    /// inactive).
    #[error("workflow '{0}' not found")]
    WorkflowNotFound(uuid::Uuid),

    /// The graph is structurally broken in a way execution cannot recover
    /// from (e.g. a LOOP/PARALLEL node referencing a branch with no
    /// connections at all).
    #[error("workflow graph is corrupt: {0}")]
    CorruptGraph(String),

    // ------ Execution errors ------
    /// A node failed with a fatal error; the whole execution is aborted.
    #[error("node '{node_id}' failed fatally: {message}")]
    NodeFatal { node_id: String, message: String },

    /// A node's retryable error was exhausted.
    #[error("node '{node_id}' exceeded retry limit: {message}")]
    NodeRetryExhausted { node_id: String, message: String },

    /// A node ran longer than its configured timeout.
    #[error("node '{node_id}' timed out after {timeout_ms}ms")]
    NodeTimeout { node_id: String, timeout_ms: u64 },

    /// A node's per-visit cap (guarding against runaway LOOP cycles) was hit.
    #[error("node '{node_id}' exceeded the maximum visit count ({max_visits})")]
    VisitCapExceeded { node_id: String, max_visits: u32 },

    /// Persistence error from the db crate.
    #[error("database error: {0}")]
    Database(#[from] db::DbError),
}
