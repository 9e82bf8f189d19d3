//! Execution context - per-run variables, cursor, cancellation and event log

use crate::core::{
    condition::{Branch, LoopExit},
    state::{ExecutionStatus, StageStatus},
    step::{Step, StepId},
    variables::VariableStore,
    workflow::StageKind,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Callback receiving log entries as they are appended
pub type EventSink = Arc<dyn Fn(&LogEntry) + Send + Sync>;

/// A variable written by a step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedVariable {
    pub name: String,
    pub value: String,
}

/// What happened at one point of an execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ExecutionEvent {
    ExecutionStarted {
        workflow: String,
    },
    StageStarted {
        stage: StageKind,
    },
    StepExecuted {
        exit_code: i32,
        output: String,
    },
    StepFailed {
        error: String,
    },
    RetryScheduled {
        attempt: u32,
        max_attempts: u32,
        error: String,
    },
    ConditionEvaluated {
        condition: String,
        branch: Branch,
    },
    LoopIteration {
        iteration: u32,
        satisfied: bool,
    },
    LoopFinished {
        exit: LoopExit,
        iterations: u32,
    },
    StageFinished {
        stage: StageKind,
        status: StageStatus,
    },
    ExecutionCancelled,
    ExecutionFinished {
        status: ExecutionStatus,
    },
}

/// One append-only entry of the execution log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub sequence: u64,

    pub timestamp: DateTime<Utc>,

    pub stage: Option<StageKind>,

    /// Position of the owning top-level step within its stage
    pub step_index: Option<usize>,

    pub step_id: Option<StepId>,

    /// Command as sent to the device
    pub command: Option<String>,

    pub matched: Option<bool>,

    pub captured: Option<CapturedVariable>,

    pub event: ExecutionEvent,
}

/// State owned by exactly one workflow execution
pub struct ExecutionContext {
    pub execution_id: Uuid,

    /// Variables captured so far, visible to every later step
    pub variables: VariableStore,

    dynamic_params: HashMap<String, String>,

    stage: Option<StageKind>,

    step_index: Option<usize>,

    cancel: CancellationToken,

    sink: Option<EventSink>,

    log: Vec<LogEntry>,
}

impl ExecutionContext {
    /// Create a fresh context for one execution
    pub fn new(dynamic_params: HashMap<String, String>) -> Self {
        Self {
            execution_id: Uuid::new_v4(),
            variables: VariableStore::new(),
            dynamic_params,
            stage: None,
            step_index: None,
            cancel: CancellationToken::new(),
            sink: None,
            log: Vec::new(),
        }
    }

    /// Seed the variable store
    pub fn with_variables(mut self, values: HashMap<String, String>) -> Self {
        for (name, value) in values {
            self.variables.set(name, value);
        }
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Forward every appended entry to `sink`
    pub fn with_sink(mut self, sink: EventSink) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Caller-supplied values for `{{param}}` tokens
    pub fn dynamic_params(&self) -> &HashMap<String, String> {
        &self.dynamic_params
    }

    /// Move the cursor to a stage, clearing the step position
    pub fn enter_stage(&mut self, stage: StageKind) {
        self.stage = Some(stage);
        self.step_index = None;
    }

    /// Move the cursor to a step within the current stage
    pub fn enter_step(&mut self, index: usize) {
        self.step_index = Some(index);
    }

    pub fn stage(&self) -> Option<StageKind> {
        self.stage
    }

    pub fn step_index(&self) -> Option<usize> {
        self.step_index
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Append an event not tied to a particular step
    pub fn record(&mut self, event: ExecutionEvent) {
        let entry = LogEntry {
            sequence: self.log.len() as u64,
            timestamp: Utc::now(),
            stage: self.stage,
            step_index: self.step_index,
            step_id: None,
            command: None,
            matched: None,
            captured: None,
            event,
        };
        self.push(entry);
    }

    /// Append an event about a step
    pub fn record_for_step(
        &mut self,
        step: &Step,
        command: Option<String>,
        matched: Option<bool>,
        captured: Option<CapturedVariable>,
        event: ExecutionEvent,
    ) {
        let entry = LogEntry {
            sequence: self.log.len() as u64,
            timestamp: Utc::now(),
            stage: Some(step.stage),
            step_index: Some(step.position),
            step_id: Some(step.id),
            command,
            matched,
            captured,
            event,
        };
        self.push(entry);
    }

    fn push(&mut self, entry: LogEntry) {
        if let Some(sink) = &self.sink {
            sink(&entry);
        }
        self.log.push(entry);
    }

    pub fn log(&self) -> &[LogEntry] {
        &self.log
    }

    pub fn into_log(self) -> Vec<LogEntry> {
        self.log
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("execution_id", &self.execution_id)
            .field("variables", &self.variables)
            .field("dynamic_params", &self.dynamic_params)
            .field("stage", &self.stage)
            .field("step_index", &self.step_index)
            .field("cancelled", &self.cancel.is_cancelled())
            .field("log_entries", &self.log.len())
            .finish()
    }
}
