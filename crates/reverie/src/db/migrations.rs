//! Schema migrations.
//!
//! Applied versions are recorded in `schema_migrations`. Every migration
//! runs in its own transaction together with its bookkeeping row, so a
//! failed step leaves neither a half-applied schema nor a stale record.

use rusqlite::Connection;

use super::error::DatabaseError;

struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create_enrichment_jobs",
        sql: include_str!("sql/001_create_enrichment_jobs.sql"),
    },
    Migration {
        version: 2,
        name: "enrichment_jobs_status_index",
        sql: include_str!("sql/002_index_status.sql"),
    },
];

/// Brings the schema up to date. Returns how many migrations were applied.
pub fn migrate(conn: &Connection) -> Result<usize, DatabaseError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        );",
    )?;

    let current: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |r| r.get(0),
    )?;

    let mut applied = 0;
    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(migration.sql).map_err(|e| DatabaseError::Migration {
            version: migration.version,
            reason: e.to_string(),
        })?;
        tx.execute(
            "INSERT INTO schema_migrations (version, name) VALUES (?1, ?2)",
            rusqlite::params![migration.version, migration.name],
        )?;
        tx.commit()?;

        log::info!("Applied migration {} ({})", migration.version, migration.name);
        applied += 1;
    }

    Ok(applied)
}
