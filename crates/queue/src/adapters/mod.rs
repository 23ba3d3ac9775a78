//! Postgres-backed implementations of the ports `engine` defines
//! (`ExecutionSink`, `WorkflowSource`, `ScheduleStore`, `LogSink`) plus the
//! `nodes`-defined `RecordStore`/`EmailSink`.
//!
//! These live in `queue` rather than `db` because `engine` already depends
//! on `db` (for `DbError`); `db` depending back on `engine` would be
//! circular. `queue` sits above both, so the conversion between row structs
//! and domain types happens here.

mod pg;
mod record_store;
mod sinks;

pub use pg::{PgApprovals, PgExecutionSink, PgLogSink, PgPorts, PgScheduleStore, PgWorkflowSource};
pub use record_store::PgRecordStore;
pub use sinks::LoggingEmailSink;
