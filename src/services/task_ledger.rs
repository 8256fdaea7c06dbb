//! Task ledger: progress rows for pipeline runs, committed immediately.
//!
//! The ledger has its own database file, so every update here is visible to
//! pollers while a run's catalog transaction is still open, and it survives
//! that transaction rolling back.

use crate::{errors::PipelineError, models::task::Task, services::catalog_store::open_database};
use chrono::Utc;
use sqlx::SqlitePool;
use std::path::Path;
use tracing::debug;

const LEDGER_DDL: &str = include_str!("../../migrations/0001_ledger.sql");
pub const LEDGER_FILE: &str = "tasks.sqlite";

const TASK_COLUMNS: &str =
    "SELECT id, initiator, schema_name, status, operations, created_at, completed_at FROM tasks";

#[derive(Clone)]
pub struct TaskLedger {
    pool: SqlitePool,
}

impl TaskLedger {
    /// Open `<data_dir>/tasks.sqlite`.
    pub async fn open(data_dir: &Path) -> Result<Self, PipelineError> {
        let pool = open_database(&data_dir.join(LEDGER_FILE), LEDGER_DDL).await?;
        Ok(Self { pool })
    }

    /// Append a new task row with status `starting`.
    pub async fn start(&self, initiator: &str, schema: &str) -> Result<i64, PipelineError> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO tasks (initiator, schema_name, status, operations, created_at)
            VALUES (?, ?, 'starting', 0, ?)
            RETURNING id
            "#,
        )
        .bind(initiator)
        .bind(schema)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;
        debug!(task = id, initiator, schema, "task started");
        Ok(id)
    }

    /// Replace the free-text status without counting an operation.
    pub async fn update(&self, id: i64, status: &str) -> Result<(), PipelineError> {
        sqlx::query("UPDATE tasks SET status = ? WHERE id = ?")
            .bind(status)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Record one state-changing operation.
    pub async fn increment(&self, id: i64, status: &str) -> Result<(), PipelineError> {
        sqlx::query("UPDATE tasks SET status = ?, operations = operations + 1 WHERE id = ?")
            .bind(status)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Mark the task finished. Only called after the run has committed.
    pub async fn complete(&self, id: i64, status: &str) -> Result<(), PipelineError> {
        sqlx::query("UPDATE tasks SET status = ?, completed_at = ? WHERE id = ?")
            .bind(status)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        debug!(task = id, status, "task completed");
        Ok(())
    }

    pub async fn get(&self, id: i64) -> Result<Option<Task>, PipelineError> {
        let task = sqlx::query_as::<_, Task>(&format!("{} WHERE id = ?", TASK_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(task)
    }

    /// Most recent tasks first.
    pub async fn recent(&self, limit: u32) -> Result<Vec<Task>, PipelineError> {
        let tasks = sqlx::query_as::<_, Task>(&format!("{} ORDER BY id DESC LIMIT ?", TASK_COLUMNS))
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;
        Ok(tasks)
    }

    /// Cheap round trip for readiness checks.
    pub async fn ping(&self) -> Result<(), PipelineError> {
        sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn tracks_progress_and_completion() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = TaskLedger::open(dir.path()).await.unwrap();

        let id = ledger.start("importer", "catalog").await.unwrap();
        ledger.update(id, "transaction created").await.unwrap();
        ledger.increment(id, "object created").await.unwrap();
        ledger.increment(id, "blob created").await.unwrap();

        let task = ledger.get(id).await.unwrap().unwrap();
        assert_eq!(task.status, "blob created");
        assert_eq!(task.operations, 2);
        assert!(!task.is_complete());

        ledger.complete(id, "completed").await.unwrap();
        let task = ledger.get(id).await.unwrap().unwrap();
        assert!(task.is_complete());
        assert_eq!(task.operations, 2);
    }

    #[tokio::test]
    async fn recent_lists_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = TaskLedger::open(dir.path()).await.unwrap();
        let first = ledger.start("importer", "a").await.unwrap();
        let second = ledger.start("metadata", "a").await.unwrap();

        let ids: Vec<i64> = ledger.recent(10).await.unwrap().iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![second, first]);
        assert_eq!(ledger.recent(1).await.unwrap().len(), 1);
        assert!(ledger.get(999).await.unwrap().is_none());
    }
}
