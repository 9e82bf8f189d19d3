//! Execution state models

use crate::core::{
    context::{ExecutionEvent, LogEntry},
    diff::OutputDiff,
    error::{EngineError, Result},
    step::StepId,
    workflow::StageKind,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Overall workflow execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// All stages succeeded
    Completed,
    /// Pre-check failed, so nothing was changed and nothing is undone
    Aborted,
    /// A failure was undone by the rollback stage
    RolledBack,
    /// Rollback itself failed
    Failed,
    /// Stopped by an external cancel signal
    Cancelled,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Aborted => "aborted",
            ExecutionStatus::RolledBack => "rolled_back",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Cancelled => "cancelled",
        }
    }

    /// Human-readable description
    pub fn describe(&self) -> &'static str {
        match self {
            ExecutionStatus::Completed => "Workflow completed successfully",
            ExecutionStatus::Aborted => "Workflow aborted before changes were committed",
            ExecutionStatus::RolledBack => "Changes were rolled back after a failure",
            ExecutionStatus::Failed => "Rollback failed, device may need manual attention",
            ExecutionStatus::Cancelled => "Workflow was cancelled",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionStatus::Completed)
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionStatus {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "completed" => Ok(ExecutionStatus::Completed),
            "aborted" => Ok(ExecutionStatus::Aborted),
            "rolled_back" => Ok(ExecutionStatus::RolledBack),
            "failed" => Ok(ExecutionStatus::Failed),
            "cancelled" => Ok(ExecutionStatus::Cancelled),
            other => Err(EngineError::Configuration(format!(
                "unknown execution status '{}'",
                other
            ))),
        }
    }
}

/// Outcome of one stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Success,
    Failure,
    Cancelled,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StageStatus::Success => "success",
            StageStatus::Failure => "failure",
            StageStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// The step that made a stage fail
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedStep {
    pub id: StepId,
    pub position: usize,
    pub command: String,
}

/// Report of one stage run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageOutcome {
    pub stage: StageKind,

    pub status: StageStatus,

    pub failed_step: Option<FailedStep>,

    /// Human-readable reason for a failure
    pub error: Option<String>,

    /// Top-level steps that were started
    pub steps_executed: usize,

    /// A loop asked to finish the workflow early
    pub complete_workflow: bool,
}

impl StageOutcome {
    pub fn success(stage: StageKind, steps_executed: usize) -> Self {
        Self {
            stage,
            status: StageStatus::Success,
            failed_step: None,
            error: None,
            steps_executed,
            complete_workflow: false,
        }
    }

    pub fn failure(
        stage: StageKind,
        steps_executed: usize,
        failed_step: FailedStep,
        error: impl Into<String>,
    ) -> Self {
        Self {
            stage,
            status: StageStatus::Failure,
            failed_step: Some(failed_step),
            error: Some(error.into()),
            steps_executed,
            complete_workflow: false,
        }
    }

    pub fn cancelled(stage: StageKind, steps_executed: usize) -> Self {
        Self {
            stage,
            status: StageStatus::Cancelled,
            failed_step: None,
            error: Some("execution cancelled".to_string()),
            steps_executed,
            complete_workflow: false,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == StageStatus::Success
    }
}

/// Orchestrator state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    PreCheck,
    Implementation,
    PostCheck,
    RollingBack,
    Completed,
    Aborted,
    RolledBack,
    Failed,
    Cancelled,
}

impl WorkflowState {
    pub const ALL: [WorkflowState; 9] = [
        WorkflowState::PreCheck,
        WorkflowState::Implementation,
        WorkflowState::PostCheck,
        WorkflowState::RollingBack,
        WorkflowState::Completed,
        WorkflowState::Aborted,
        WorkflowState::RolledBack,
        WorkflowState::Failed,
        WorkflowState::Cancelled,
    ];

    pub fn initial() -> Self {
        WorkflowState::PreCheck
    }

    /// Stage executed while in this state
    pub fn stage(&self) -> Option<StageKind> {
        match self {
            WorkflowState::PreCheck => Some(StageKind::PreCheck),
            WorkflowState::Implementation => Some(StageKind::Implementation),
            WorkflowState::PostCheck => Some(StageKind::PostCheck),
            WorkflowState::RollingBack => Some(StageKind::Rollback),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal_status().is_some()
    }

    pub fn terminal_status(&self) -> Option<ExecutionStatus> {
        match self {
            WorkflowState::Completed => Some(ExecutionStatus::Completed),
            WorkflowState::Aborted => Some(ExecutionStatus::Aborted),
            WorkflowState::RolledBack => Some(ExecutionStatus::RolledBack),
            WorkflowState::Failed => Some(ExecutionStatus::Failed),
            WorkflowState::Cancelled => Some(ExecutionStatus::Cancelled),
            _ => None,
        }
    }

    /// Next state for a plain stage outcome
    pub fn transition(self, outcome: StageStatus) -> Result<Self> {
        use StageStatus::*;
        use WorkflowState::*;

        let next = match (self, outcome) {
            (PreCheck, Success) => Implementation,
            (PreCheck, Failure) => Aborted,
            (Implementation, Success) => PostCheck,
            (Implementation, Failure) => RollingBack,
            (PostCheck, Success) => Completed,
            (PostCheck, Failure) => RollingBack,
            (RollingBack, Success) => RolledBack,
            (RollingBack, Failure) => Failed,
            (PreCheck | Implementation | PostCheck | RollingBack, StageStatus::Cancelled) => {
                WorkflowState::Cancelled
            }
            (from, outcome) => {
                return Err(EngineError::InvalidStateTransition {
                    from: from.to_string(),
                    outcome: outcome.to_string(),
                })
            }
        };
        Ok(next)
    }

    /// Next state for a full stage report, honoring early completion
    pub fn next(self, outcome: &StageOutcome) -> Result<Self> {
        let forward_stage = matches!(
            self,
            WorkflowState::PreCheck | WorkflowState::Implementation | WorkflowState::PostCheck
        );
        if forward_stage && outcome.is_success() && outcome.complete_workflow {
            return Ok(WorkflowState::Completed);
        }
        self.transition(outcome.status)
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkflowState::PreCheck => "pre_check",
            WorkflowState::Implementation => "implementation",
            WorkflowState::PostCheck => "post_check",
            WorkflowState::RollingBack => "rolling_back",
            WorkflowState::Completed => "completed",
            WorkflowState::Aborted => "aborted",
            WorkflowState::RolledBack => "rolled_back",
            WorkflowState::Failed => "failed",
            WorkflowState::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Terminal artifact of one workflow execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub(crate) execution_id: Uuid,
    pub(crate) workflow_id: Uuid,
    pub(crate) workflow_name: String,
    pub(crate) target: Option<String>,
    pub(crate) status: ExecutionStatus,
    pub(crate) stages: Vec<StageOutcome>,
    pub(crate) failed_stage: Option<StageKind>,
    pub(crate) failed_step: Option<FailedStep>,
    pub(crate) error_message: Option<String>,
    pub(crate) variables: BTreeMap<String, String>,
    pub(crate) log: Vec<LogEntry>,
    pub(crate) started_at: DateTime<Utc>,
    pub(crate) completed_at: DateTime<Utc>,

    /// Pre-check versus post-check output, when both stages ran
    #[serde(default)]
    pub(crate) output_diff: Option<OutputDiff>,
}

impl ExecutionResult {
    pub fn execution_id(&self) -> Uuid {
        self.execution_id
    }

    pub fn workflow_id(&self) -> Uuid {
        self.workflow_id
    }

    pub fn workflow_name(&self) -> &str {
        &self.workflow_name
    }

    /// Device or host the workflow ran against
    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    pub fn status(&self) -> ExecutionStatus {
        self.status
    }

    /// Stage reports in execution order
    pub fn stages(&self) -> &[StageOutcome] {
        &self.stages
    }

    pub fn stage(&self, kind: StageKind) -> Option<&StageOutcome> {
        self.stages.iter().find(|s| s.stage == kind)
    }

    /// Whether a stage ran at all
    pub fn ran(&self, kind: StageKind) -> bool {
        self.stage(kind).is_some()
    }

    pub fn failed_stage(&self) -> Option<StageKind> {
        self.failed_stage
    }

    pub fn failed_step(&self) -> Option<&FailedStep> {
        self.failed_step.as_ref()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// Final variable values
    pub fn variables(&self) -> &BTreeMap<String, String> {
        &self.variables
    }

    pub fn log(&self) -> &[LogEntry] {
        &self.log
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn completed_at(&self) -> DateTime<Utc> {
        self.completed_at
    }

    pub fn duration(&self) -> chrono::Duration {
        self.completed_at - self.started_at
    }

    pub fn output_diff(&self) -> Option<&OutputDiff> {
        self.output_diff.as_ref()
    }

    /// Every command a stage sent and the output it got back
    pub fn transcript(&self, stage: StageKind) -> String {
        let mut transcript = String::new();
        for entry in self.log.iter().filter(|e| e.stage == Some(stage)) {
            if let (ExecutionEvent::StepExecuted { output, .. }, Some(command)) =
                (&entry.event, entry.command.as_deref())
            {
                transcript.push_str(&format!("! Command: {}\n", command));
                transcript.push_str(output);
                if !output.is_empty() && !output.ends_with('\n') {
                    transcript.push('\n');
                }
            }
        }
        transcript
    }

    /// Diff the pre-check transcript against the post-check one
    pub(crate) fn compare_checks(&self) -> Option<OutputDiff> {
        if !(self.ran(StageKind::PreCheck) && self.ran(StageKind::PostCheck)) {
            return None;
        }
        Some(OutputDiff::between(
            &self.transcript(StageKind::PreCheck),
            &self.transcript(StageKind::PostCheck),
        ))
    }

    /// One-line description suitable for logs and the CLI
    pub fn summary(&self) -> String {
        let mut summary = format!("{}: {}", self.status, self.status.describe());
        if let (Some(stage), Some(step)) = (self.failed_stage, self.failed_step.as_ref()) {
            summary.push_str(&format!(
                " (failed at {} step {} '{}')",
                stage,
                step.position + 1,
                step.command
            ));
        }
        if let Some(error) = &self.error_message {
            summary.push_str(&format!(": {}", error));
        }
        summary
    }
}
