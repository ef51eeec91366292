//! Generation history -- every test the backend generated for us, with an
//! optional summary of how its execution went.

use crate::model::ExecutionStatus;
use crate::store::Pool;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Condensed execution outcome attached to a history entry once the run
/// finishes, so the history view can show pass/fail without a join.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub execution_id: String,
    pub status: ExecutionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tests_run: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failures: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<u32>,
}

/// One generated test case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub test_type: String,
    pub source_code: String,
    pub generated_test: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution: Option<ExecutionSummary>,
}

/// Persisted collection of generated tests.
#[derive(Clone)]
pub struct HistoryStore {
    pool: Pool,
}

impl HistoryStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Record a new generation, returning its id.
    pub fn add(
        &self,
        source_code: &str,
        generated_test: &str,
        test_type: &str,
        description: Option<&str>,
    ) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO generation_history (id, test_type, source_code, generated_test, description, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                id,
                test_type,
                source_code,
                generated_test,
                description,
                Utc::now().to_rfc3339()
            ],
        )
        .context("Failed to insert history entry")?;
        Ok(id)
    }

    pub fn get(&self, id: &str) -> Result<Option<HistoryEntry>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT id, test_type, source_code, generated_test, description, execution_json, created_at
             FROM generation_history WHERE id = ?1",
        )?;
        let mut rows = stmt.query(rusqlite::params![id])?;
        match rows.next()? {
            Some(row) => Ok(Some(Self::entry_from_row(row)?)),
            None => Ok(None),
        }
    }

    /// All entries, newest first.
    pub fn list(&self) -> Result<Vec<HistoryEntry>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT id, test_type, source_code, generated_test, description, execution_json, created_at
             FROM generation_history ORDER BY created_at DESC, id",
        )?;
        let mut rows = stmt.query([])?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next()? {
            entries.push(Self::entry_from_row(row)?);
        }
        Ok(entries)
    }

    /// Attach (or replace) the execution outcome of an entry.
    /// Returns false when the id is unknown.
    pub fn update_execution(&self, id: &str, summary: &ExecutionSummary) -> Result<bool> {
        let json = serde_json::to_string(summary)?;
        let conn = self.pool.get()?;
        let changed = conn.execute(
            "UPDATE generation_history SET execution_json = ?2 WHERE id = ?1",
            rusqlite::params![id, json],
        )?;
        Ok(changed > 0)
    }

    pub fn delete(&self, id: &str) -> Result<bool> {
        let conn = self.pool.get()?;
        let changed = conn.execute(
            "DELETE FROM generation_history WHERE id = ?1",
            rusqlite::params![id],
        )?;
        Ok(changed > 0)
    }

    pub fn clear(&self) -> Result<usize> {
        let conn = self.pool.get()?;
        let changed = conn.execute("DELETE FROM generation_history", [])?;
        Ok(changed)
    }

    fn entry_from_row(row: &rusqlite::Row<'_>) -> Result<HistoryEntry> {
        let execution = match row.get::<_, Option<String>>(5)? {
            Some(json) => Some(serde_json::from_str(&json).context("Corrupt execution summary")?),
            None => None,
        };
        let created_at: String = row.get(6)?;
        Ok(HistoryEntry {
            id: row.get(0)?,
            test_type: row.get(1)?,
            source_code: row.get(2)?,
            generated_test: row.get(3)?,
            description: row.get(4)?,
            execution,
            timestamp: DateTime::parse_from_rfc3339(&created_at)
                .map(|t| t.with_timezone(&Utc))
                .unwrap_or_default(),
        })
    }
}
