pub use crate::AppState;

pub mod approvals;
pub mod executions;
pub mod schedules;
pub mod webhooks;
pub mod workflows;
