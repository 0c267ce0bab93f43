//! Database error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from database operations.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// SQLite error from rusqlite.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error when creating directories or files.
    #[error("IO error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A migration failed to apply.
    #[error("Migration failed at version {version}: {reason}")]
    Migration { version: u32, reason: String },

    /// The database lock was poisoned.
    #[error("Database lock poisoned")]
    LockPoisoned,

    /// An enrichment row for this entry already exists.
    #[error("Enrichment job for entry {parent_id} already exists")]
    Conflict { parent_id: i64 },

    /// The enrichment row expected by an update is gone.
    #[error("Enrichment job for entry {parent_id} not found")]
    NotFound { parent_id: i64 },

    /// A stored row could not be mapped back into a job.
    #[error("Corrupt enrichment row for entry {parent_id}: {reason}")]
    Corrupt { parent_id: i64, reason: String },

    /// A result payload could not be encoded for storage.
    #[error("Failed to encode result payload: {0}")]
    Encode(#[from] serde_json::Error),
}
