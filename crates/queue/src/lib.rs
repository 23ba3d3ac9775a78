//! Background workers that drive workflows to completion.
//!
//! `engine` defines the ports (`ExecutionSink`, `WorkflowSource`,
//! `ScheduleStore`, `LogSink`) and `nodes` the adapter traits
//! (`RecordStore`, `EmailSink`, `SmsSink`); this crate supplies the
//! Postgres-backed implementations (`adapters`) and the two poll loops that
//! use them (`job_worker`, `scheduler_worker`).

pub mod adapters;
pub mod config;
pub mod error;
pub mod job_worker;
pub mod scheduler_worker;

pub use config::WorkerConfig;
pub use error::QueueError;

/// Spawn both workers on a shared shutdown signal. Callers `send(true)` on
/// the paired `watch::Sender` to request a graceful stop.
pub fn spawn_workers(
    pool: db::DbPool,
    config: WorkerConfig,
) -> (
    tokio::sync::watch::Sender<bool>,
    tokio::task::JoinHandle<()>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, rx) = tokio::sync::watch::channel(false);
    let job_handle = job_worker::spawn(pool.clone(), config.clone(), rx.clone());
    let scheduler_handle = scheduler_worker::spawn(pool, config, rx);
    (tx, job_handle, scheduler_handle)
}
