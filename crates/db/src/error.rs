//! Typed error type for the db crate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("sqlx error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("row not found")]
    NotFound,

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A JSONB column's contents don't deserialize into the shape the caller
    /// expected (e.g. a `workflows.definition` blob that predates a schema
    /// change to the domain types it round-trips).
    #[error("stored JSON is corrupt: {0}")]
    CorruptJson(#[from] serde_json::Error),
}
