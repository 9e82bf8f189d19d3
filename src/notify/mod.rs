//! Notifications sent when an execution starts and when it finishes

pub mod webhook;

pub use webhook::{WebhookConfig, WebhookNotifier};

use crate::core::{ExecutionResult, ExecutionStatus};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Lifecycle event a notification reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    ExecutionStarted,
    ExecutionCompleted,
    ExecutionFailed,
    ExecutionCancelled,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::ExecutionStarted => "execution_started",
            NotificationKind::ExecutionCompleted => "execution_completed",
            NotificationKind::ExecutionFailed => "execution_failed",
            NotificationKind::ExecutionCancelled => "execution_cancelled",
        }
    }

    /// Event reported for a finished execution
    pub fn for_status(status: ExecutionStatus) -> Self {
        match status {
            ExecutionStatus::Completed => NotificationKind::ExecutionCompleted,
            ExecutionStatus::Cancelled => NotificationKind::ExecutionCancelled,
            ExecutionStatus::Aborted | ExecutionStatus::RolledBack | ExecutionStatus::Failed => {
                NotificationKind::ExecutionFailed
            }
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What is known about an execution when it starts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionStart {
    pub execution_id: Uuid,
    pub workflow_id: Uuid,
    pub workflow_name: String,
    pub target: Option<String>,
    pub started_at: DateTime<Utc>,
}

/// Receiver of execution lifecycle notifications.
///
/// Errors are reported to the caller, which logs them; a failed delivery
/// never changes the outcome of the execution.
#[async_trait::async_trait]
pub trait ExecutionNotifier: Send + Sync {
    async fn execution_started(&self, start: &ExecutionStart) -> Result<()>;

    async fn execution_finished(&self, result: &ExecutionResult) -> Result<()>;
}
