//! Database schema and migrations.

use anyhow::Result;
use rusqlite::Connection;

/// Run all pending migrations.
pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS execution_results (
            execution_id TEXT PRIMARY KEY,
            status TEXT NOT NULL,
            record_json TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS generation_history (
            id TEXT PRIMARY KEY,
            test_type TEXT NOT NULL,
            source_code TEXT NOT NULL,
            generated_test TEXT NOT NULL,
            description TEXT,
            execution_json TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_execution_results_status ON execution_results(status);
        CREATE INDEX IF NOT EXISTS idx_execution_results_created ON execution_results(created_at);
        CREATE INDEX IF NOT EXISTS idx_generation_history_created ON generation_history(created_at);",
    )?;

    Ok(())
}
