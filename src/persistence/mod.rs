//! Persistence layer for workflow execution history

#[cfg(feature = "sqlite")]
pub mod store;

#[cfg(feature = "sqlite")]
pub use store::SqliteExecutionStore;

pub use crate::core::ExecutionStatus;
use crate::core::{ExecutionResult, StageKind};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Days of history kept by `cleanup` unless told otherwise
pub const DEFAULT_RETENTION_DAYS: i64 = 30;

/// Summary of a workflow execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionSummary {
    /// Unique execution ID
    pub execution_id: Uuid,

    pub workflow_id: Uuid,

    pub workflow_name: String,

    /// Device the workflow ran against
    pub target: Option<String>,

    pub status: ExecutionStatus,

    pub started_at: DateTime<Utc>,

    pub completed_at: DateTime<Utc>,

    /// Stage that decided a non-successful outcome
    pub failed_stage: Option<StageKind>,

    pub error_message: Option<String>,

    /// Top-level steps started across all stages
    pub steps_executed: usize,
}

impl ExecutionSummary {
    pub fn from_result(result: &ExecutionResult) -> Self {
        Self {
            execution_id: result.execution_id(),
            workflow_id: result.workflow_id(),
            workflow_name: result.workflow_name().to_string(),
            target: result.target().map(str::to_string),
            status: result.status(),
            started_at: result.started_at(),
            completed_at: result.completed_at(),
            failed_stage: result.failed_stage(),
            error_message: result.error_message().map(str::to_string),
            steps_executed: result.stages().iter().map(|s| s.steps_executed).sum(),
        }
    }
}

/// Trait for persistence backends
#[async_trait::async_trait]
pub trait PersistenceBackend: Send + Sync {
    /// Save a finished execution
    async fn save_execution(&self, result: &ExecutionResult) -> Result<()>;

    /// Load an execution by ID
    async fn load_execution(&self, execution_id: Uuid) -> Result<Option<ExecutionResult>>;

    /// List executions of a workflow, newest first
    async fn list_executions(&self, workflow_name: &str) -> Result<Vec<ExecutionSummary>>;

    /// List all workflow names with recorded executions
    async fn list_workflows(&self) -> Result<Vec<String>>;

    /// Delete executions started before `cutoff`, returning how many were removed
    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize>;
}

/// In-memory persistence (for testing or ephemeral use)
pub struct InMemoryPersistence {
    executions: RwLock<HashMap<Uuid, ExecutionResult>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self {
            executions: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryPersistence {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl PersistenceBackend for InMemoryPersistence {
    async fn save_execution(&self, result: &ExecutionResult) -> Result<()> {
        let mut execs = self.executions.write().await;
        execs.insert(result.execution_id(), result.clone());
        Ok(())
    }

    async fn load_execution(&self, execution_id: Uuid) -> Result<Option<ExecutionResult>> {
        let execs = self.executions.read().await;
        Ok(execs.get(&execution_id).cloned())
    }

    async fn list_executions(&self, workflow_name: &str) -> Result<Vec<ExecutionSummary>> {
        let execs = self.executions.read().await;
        let mut summaries: Vec<ExecutionSummary> = execs
            .values()
            .filter(|r| r.workflow_name() == workflow_name)
            .map(ExecutionSummary::from_result)
            .collect();
        summaries.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(summaries)
    }

    async fn list_workflows(&self) -> Result<Vec<String>> {
        let execs = self.executions.read().await;
        let mut names: Vec<String> = execs.values().map(|r| r.workflow_name().to_string()).collect();
        names.sort();
        names.dedup();
        Ok(names)
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let mut execs = self.executions.write().await;
        let before = execs.len();
        execs.retain(|_, r| r.started_at() >= cutoff);
        Ok(before - execs.len())
    }
}
