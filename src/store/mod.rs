//! SQLite result store -- the local, queryable archive of past executions.
//!
//! Records are keyed by execution id and stored as one JSON document per
//! row; writing an id that already exists merges field-wise instead of
//! replacing, so partial payloads accumulate (see `ExecutionRecord::merge_from`).

pub mod schema;

use crate::model::{ExecutionRecord, ExecutionStatus};
use anyhow::{Context, Result};
use r2d2::Pool as R2D2Pool;
use r2d2_sqlite::SqliteConnectionManager;
use serde::Serialize;

/// Connection Pool type
pub type Pool = R2D2Pool<SqliteConnectionManager>;

/// Open (or create) the SQLite database and return a connection pool.
pub fn open_pool(path: &str) -> Result<Pool> {
    if let Some(parent) = std::path::Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create data dir '{}'", parent.display()))?;
        }
    }

    let manager = SqliteConnectionManager::file(path).with_init(|c| {
        c.execute_batch(
            "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA temp_store = MEMORY;
                 PRAGMA foreign_keys = ON;
                 PRAGMA busy_timeout = 5000;",
        )
    });

    let pool = R2D2Pool::new(manager)?;

    // Run migrations on a single connection
    let conn = pool.get()?;
    schema::migrate(&conn)?;

    Ok(pool)
}

/// Aggregate view over the whole archive.
#[derive(Debug, Clone, Serialize)]
pub struct GlobalStats {
    pub total_executions: usize,
    pub completed_executions: usize,
    pub failed_executions: usize,
    /// completed / total * 100
    pub success_rate: f64,
    /// Mean test success rate over completed records carrying the metric.
    pub avg_test_success_rate: f64,
    /// Mean line coverage over completed records carrying the metric.
    pub avg_coverage: f64,
}

/// Archive of execution records.
#[derive(Clone)]
pub struct ResultStore {
    pool: Pool,
}

impl ResultStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// Insert or merge a record, returning the stored state.
    ///
    /// An existing row for the same id absorbs the new payload field-wise;
    /// the union of both payloads survives, never the newcomer alone.
    pub fn upsert(&self, record: &ExecutionRecord) -> Result<ExecutionRecord> {
        let merged = match self.get(&record.execution_id)? {
            Some(mut existing) => {
                existing.merge_from(record);
                existing
            }
            None => record.clone(),
        };

        let json = serde_json::to_string(&merged).context("Failed to serialize record")?;
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO execution_results (execution_id, status, record_json)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(execution_id) DO UPDATE SET
                 status = excluded.status,
                 record_json = excluded.record_json,
                 updated_at = datetime('now')",
            rusqlite::params![merged.execution_id, merged.status.to_string(), json],
        )
        .context("Failed to upsert execution record")?;

        Ok(merged)
    }

    pub fn get(&self, execution_id: &str) -> Result<Option<ExecutionRecord>> {
        let conn = self.pool.get()?;
        let mut stmt =
            conn.prepare("SELECT record_json FROM execution_results WHERE execution_id = ?1")?;
        let mut rows = stmt.query(rusqlite::params![execution_id])?;

        match rows.next()? {
            Some(row) => {
                let json: String = row.get(0)?;
                let record = serde_json::from_str(&json)
                    .with_context(|| format!("Corrupt record for '{}'", execution_id))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// Remove one record. Returns false when the id was unknown.
    pub fn delete(&self, execution_id: &str) -> Result<bool> {
        let conn = self.pool.get()?;
        let changed = conn.execute(
            "DELETE FROM execution_results WHERE execution_id = ?1",
            rusqlite::params![execution_id],
        )?;
        Ok(changed > 0)
    }

    /// Drop the whole archive. Returns how many records were removed.
    pub fn clear(&self) -> Result<usize> {
        let conn = self.pool.get()?;
        let changed = conn.execute("DELETE FROM execution_results", [])?;
        Ok(changed)
    }

    /// All records, newest first.
    pub fn list(&self) -> Result<Vec<ExecutionRecord>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT record_json FROM execution_results ORDER BY created_at DESC, execution_id",
        )?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut records = Vec::new();
        for r in rows {
            let json = r?;
            match serde_json::from_str(&json) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!("Skipping corrupt record: {}", e),
            }
        }
        Ok(records)
    }

    /// Aggregate counters and averages over the archive.
    ///
    /// Averages are computed only over completed records that carry the
    /// metric; a completed run without coverage data does not drag the
    /// coverage average toward zero.
    pub fn global_stats(&self) -> Result<GlobalStats> {
        let records = self.list()?;

        let total = records.len();
        let completed = records
            .iter()
            .filter(|r| r.status == ExecutionStatus::Completed)
            .count();
        let failed = records
            .iter()
            .filter(|r| r.status == ExecutionStatus::Failed)
            .count();

        let avg_over = |metric: fn(&ExecutionRecord) -> Option<f64>| -> f64 {
            let values: Vec<f64> = records
                .iter()
                .filter(|r| r.status == ExecutionStatus::Completed)
                .filter_map(metric)
                .collect();
            if values.is_empty() {
                0.0
            } else {
                values.iter().sum::<f64>() / values.len() as f64
            }
        };

        Ok(GlobalStats {
            total_executions: total,
            completed_executions: completed,
            failed_executions: failed,
            success_rate: if total > 0 {
                completed as f64 / total as f64 * 100.0
            } else {
                0.0
            },
            avg_test_success_rate: avg_over(|r| r.metrics.as_ref().and_then(|m| m.success_rate)),
            avg_coverage: avg_over(|r| r.metrics.as_ref().and_then(|m| m.line_coverage)),
        })
    }

    /// Filter the archive by exact status and/or a case-insensitive
    /// substring over id, logs, source code, and generated test.
    pub fn search(
        &self,
        term: &str,
        status_filter: Option<ExecutionStatus>,
    ) -> Result<Vec<ExecutionRecord>> {
        let mut records = self.list()?;

        if let Some(status) = status_filter {
            records.retain(|r| r.status == status);
        }

        if !term.is_empty() {
            let needle = term.to_lowercase();
            let matches = |field: &Option<String>| {
                field
                    .as_ref()
                    .is_some_and(|v| v.to_lowercase().contains(&needle))
            };
            records.retain(|r| {
                r.execution_id.to_lowercase().contains(&needle)
                    || matches(&r.logs)
                    || r.test_info
                        .as_ref()
                        .is_some_and(|t| matches(&t.source_code) || matches(&t.generated_test))
            });
        }

        Ok(records)
    }
}
