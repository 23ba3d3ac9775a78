//! Built-in `ExecutableNode` implementations for the registry-dispatched
//! ("leaf") node kinds.

pub mod data_transform;
pub mod delay;
pub mod email;
pub mod filter;
pub mod query;
pub mod record;
pub mod sms;

pub use data_transform::DataTransformNode;
pub use delay::DelayNode;
pub use email::EmailNode;
pub use filter::FilterNode;
pub use query::QueryNode;
pub use record::{RecordMutationMode, RecordMutationNode};
pub use sms::SmsNode;

use std::sync::Arc;

use crate::{config::NodeKind, ExecutableNode};

/// Construct the built-in implementation for a registry-dispatched node
/// kind. Returns `None` for control-flow kinds, which the executor
/// interprets directly instead.
pub fn build_executable(kind: &NodeKind) -> Option<Arc<dyn ExecutableNode>> {
    match kind {
        NodeKind::Email(cfg) => Some(Arc::new(EmailNode::new(cfg.clone()))),
        NodeKind::Sms(cfg) => Some(Arc::new(SmsNode::new(cfg.clone()))),
        NodeKind::Delay(cfg) => Some(Arc::new(DelayNode::new(cfg.clone()))),
        NodeKind::DataTransform(cfg) => Some(Arc::new(DataTransformNode::new(cfg.clone()))),
        NodeKind::Query(cfg) => Some(Arc::new(QueryNode::new(cfg.clone()))),
        NodeKind::Filter(cfg) => Some(Arc::new(FilterNode::new(cfg.clone()))),
        NodeKind::CreateRecord(cfg) => Some(Arc::new(RecordMutationNode::new(cfg.clone(), RecordMutationMode::Create))),
        NodeKind::UpdateRecord(cfg) => Some(Arc::new(RecordMutationNode::new(cfg.clone(), RecordMutationMode::Update))),
        _ => None,
    }
}
