//! `nodes` crate — the `ExecutableNode` trait, per-kind configuration, the
//! variable resolver / condition engine, side-effect adapters, and built-in
//! node implementations.
//!
//! The engine crate dispatches registry-backed node kinds through
//! [`ExecutableNode`]; control-flow kinds are interpreted directly by the
//! executor using the types exported here.

pub mod adapters;
pub mod config;
pub mod error;
pub mod impls;
pub mod mock;
pub mod resolver;
pub mod traits;

pub use config::NodeKind;
pub use error::NodeError;
pub use traits::{ExecutableNode, ExecutionContext, NodeOutcome};
