//! `engine` crate — core domain models, DAG validation, and the execution engine.

pub mod dag;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod logger;
pub mod models;
pub mod scheduler;

pub use dag::validate_graph;
pub use error::EngineError;
pub use executor::WorkflowExecutor;
pub use models::{Connection, Trigger, Workflow, WorkflowNode, WorkflowTrigger};

#[cfg(test)]
mod executor_tests;
