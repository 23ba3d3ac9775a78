//! Typed error type for the `queue` crate's background workers.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error(transparent)]
    Database(#[from] db::DbError),

    #[error(transparent)]
    Engine(#[from] engine::EngineError),

    #[error("workflow {0} has a definition that does not deserialize: {1}")]
    CorruptDefinition(uuid::Uuid, serde_json::Error),

    #[error("job references workflow {0}, which does not exist")]
    MissingWorkflow(uuid::Uuid),
}
