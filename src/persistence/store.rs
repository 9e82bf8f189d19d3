//! SQLite-based persistence store

use crate::core::{ExecutionResult, ExecutionStatus, StageKind};
use crate::persistence::{ExecutionSummary, PersistenceBackend};
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use uuid::Uuid;

/// SQLite execution store
pub struct SqliteExecutionStore {
    pool: SqlitePool,
}

impl SqliteExecutionStore {
    /// Open (creating if needed) a database file
    pub async fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(db_path.as_ref())
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options)
            .await
            .context("Failed to connect to database")?;

        let store = Self { pool };
        store.init().await?;

        Ok(store)
    }

    /// Private in-memory database, useful for tests
    pub async fn in_memory() -> Result<Self> {
        // Every pooled connection would otherwise see its own empty database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .context("Failed to open in-memory database")?;

        let store = Self { pool };
        store.init().await?;

        Ok(store)
    }

    /// Create store with default path
    pub async fn with_default_path() -> Result<Self> {
        let data_dir = dirs::data_local_dir().unwrap_or_else(|| std::path::PathBuf::from("."));
        let db_dir = data_dir.join("netflow");
        std::fs::create_dir_all(&db_dir)
            .with_context(|| format!("Failed to create {}", db_dir.display()))?;

        Self::new(db_dir.join("executions.db")).await
    }

    /// Initialize database schema
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS executions (
                id TEXT PRIMARY KEY,
                workflow_id TEXT NOT NULL,
                workflow_name TEXT NOT NULL,
                target TEXT,
                status TEXT NOT NULL,
                started_at TEXT NOT NULL,
                completed_at TEXT NOT NULL,
                failed_stage TEXT,
                error_message TEXT,
                steps_executed INTEGER NOT NULL DEFAULT 0,
                result TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX IF NOT EXISTS idx_workflow_name ON executions(workflow_name);
            CREATE INDEX IF NOT EXISTS idx_status ON executions(status);
            CREATE INDEX IF NOT EXISTS idx_started_at ON executions(started_at);
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Convert DateTime<Utc> to NaiveDateTime for SQLite
    fn to_naive(dt: DateTime<Utc>) -> NaiveDateTime {
        dt.naive_utc()
    }

    /// Convert NaiveDateTime to DateTime<Utc>
    fn from_naive(dt: NaiveDateTime) -> DateTime<Utc> {
        DateTime::from_naive_utc_and_offset(dt, Utc)
    }

    fn summary_from_row(row: &SqliteRow) -> Result<ExecutionSummary> {
        let failed_stage = row
            .get::<Option<String>, _>("failed_stage")
            .map(|s| serde_json::from_value::<StageKind>(serde_json::Value::String(s)))
            .transpose()?;

        Ok(ExecutionSummary {
            execution_id: Uuid::parse_str(&row.get::<String, _>("id"))?,
            workflow_id: Uuid::parse_str(&row.get::<String, _>("workflow_id"))?,
            workflow_name: row.get("workflow_name"),
            target: row.get("target"),
            status: row.get::<String, _>("status").parse::<ExecutionStatus>()?,
            started_at: Self::from_naive(row.get("started_at")),
            completed_at: Self::from_naive(row.get("completed_at")),
            failed_stage,
            error_message: row.get("error_message"),
            steps_executed: row.get::<i64, _>("steps_executed") as usize,
        })
    }
}

#[async_trait::async_trait]
impl PersistenceBackend for SqliteExecutionStore {
    async fn save_execution(&self, result: &ExecutionResult) -> Result<()> {
        let summary = ExecutionSummary::from_result(result);
        let json = serde_json::to_string(result).context("Failed to serialize execution")?;

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO executions
            (id, workflow_id, workflow_name, target, status, started_at, completed_at,
             failed_stage, error_message, steps_executed, result)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(summary.execution_id.to_string())
        .bind(summary.workflow_id.to_string())
        .bind(&summary.workflow_name)
        .bind(&summary.target)
        .bind(summary.status.as_str())
        .bind(Self::to_naive(summary.started_at))
        .bind(Self::to_naive(summary.completed_at))
        .bind(summary.failed_stage.map(|s| s.as_str()))
        .bind(&summary.error_message)
        .bind(summary.steps_executed as i64)
        .bind(json)
        .execute(&self.pool)
        .await
        .context("Failed to save execution")?;

        Ok(())
    }

    async fn load_execution(&self, execution_id: Uuid) -> Result<Option<ExecutionResult>> {
        let row = sqlx::query("SELECT result FROM executions WHERE id = ?1")
            .bind(execution_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to load execution")?;

        match row {
            Some(row) => {
                let json: String = row.get("result");
                let result = serde_json::from_str(&json)
                    .with_context(|| format!("Corrupt execution record {}", execution_id))?;
                Ok(Some(result))
            }
            None => Ok(None),
        }
    }

    async fn list_executions(&self, workflow_name: &str) -> Result<Vec<ExecutionSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT id, workflow_id, workflow_name, target, status, started_at, completed_at,
                   failed_stage, error_message, steps_executed
            FROM executions
            WHERE workflow_name = ?1
            ORDER BY started_at DESC
            "#,
        )
        .bind(workflow_name)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list executions")?;

        rows.iter().map(Self::summary_from_row).collect()
    }

    async fn list_workflows(&self) -> Result<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT workflow_name
            FROM executions
            ORDER BY workflow_name ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list workflows")?;

        Ok(rows.iter().map(|row| row.get("workflow_name")).collect())
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let done = sqlx::query("DELETE FROM executions WHERE started_at < ?1")
            .bind(Self::to_naive(cutoff))
            .execute(&self.pool)
            .await
            .context("Failed to delete old executions")?;

        Ok(done.rows_affected() as usize)
    }
}
