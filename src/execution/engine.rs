//! Main execution engine - orchestrates a workflow run through its stages

use crate::{
    core::{
        context::{EventSink, ExecutionContext, ExecutionEvent, LogEntry},
        state::{ExecutionResult, ExecutionStatus, FailedStep, StageStatus, WorkflowState},
        workflow::{StageKind, WorkflowDefinition},
    },
    device::DeviceAdapter,
    execution::stage::StageRunner,
    notify::{ExecutionNotifier, ExecutionStart},
};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(&LogEntry) + Send + Sync>;

/// Per-run inputs
#[derive(Debug, Clone, Default)]
pub struct ExecutionRequest {
    /// Values for `{{param}}` tokens in dynamic steps
    pub dynamic_params: HashMap<String, String>,

    /// Initial variables, overriding the workflow's defaults
    pub variables: HashMap<String, String>,

    /// Device or host label recorded in the result
    pub target: Option<String>,

    pub cancel: Option<CancellationToken>,
}

impl ExecutionRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.dynamic_params.insert(name.into(), value.into());
        self
    }

    pub fn with_params(mut self, params: HashMap<String, String>) -> Self {
        self.dynamic_params.extend(params);
        self
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    pub fn with_variables(mut self, variables: HashMap<String, String>) -> Self {
        self.variables.extend(variables);
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// Main workflow execution engine.
///
/// One engine may drive many executions concurrently; all per-run state
/// lives in the `ExecutionContext` created by [`ExecutionEngine::execute`].
pub struct ExecutionEngine<D: ?Sized> {
    device: Arc<D>,
    event_handlers: Arc<Mutex<Vec<EventHandler>>>,
    notifiers: Vec<Arc<dyn ExecutionNotifier>>,
}

impl<D: DeviceAdapter + 'static> ExecutionEngine<D> {
    pub fn new(device: D) -> Self {
        Self::from_shared(Arc::new(device))
    }
}

impl<D: DeviceAdapter + ?Sized + 'static> ExecutionEngine<D> {
    /// Create an engine around an already shared device
    pub fn from_shared(device: Arc<D>) -> Self {
        Self {
            device,
            event_handlers: Arc::new(Mutex::new(Vec::new())),
            notifiers: Vec::new(),
        }
    }

    /// Notify `notifier` when executions start and finish
    pub fn with_notifier(mut self, notifier: Arc<dyn ExecutionNotifier>) -> Self {
        self.notifiers.push(notifier);
        self
    }

    pub fn device(&self) -> &Arc<D> {
        &self.device
    }

    /// Add an event handler receiving every log entry as it is appended
    pub async fn add_event_handler<F>(&self, handler: F)
    where
        F: Fn(&LogEntry) + Send + Sync + 'static,
    {
        self.event_handlers.lock().await.push(Arc::new(handler));
    }

    /// Execute a workflow to a terminal state
    pub async fn execute(
        &self,
        workflow: &WorkflowDefinition,
        request: ExecutionRequest,
    ) -> ExecutionResult {
        let handlers = self.event_handlers.lock().await.clone();
        let sink: EventSink = Arc::new(move |entry: &LogEntry| {
            for handler in &handlers {
                handler(entry);
            }
        });

        let mut variables = workflow.variables.clone();
        variables.extend(request.variables);

        let mut context = ExecutionContext::new(request.dynamic_params)
            .with_variables(variables)
            .with_sink(sink);
        if let Some(token) = request.cancel {
            context = context.with_cancellation(token);
        }

        let execution_id = context.execution_id;
        let started_at = Utc::now();

        info!(
            "Starting workflow execution: {} ({})",
            workflow.name, execution_id
        );
        context.record(ExecutionEvent::ExecutionStarted {
            workflow: workflow.name.clone(),
        });

        if !self.notifiers.is_empty() {
            let start = ExecutionStart {
                execution_id,
                workflow_id: workflow.id,
                workflow_name: workflow.name.clone(),
                target: request.target.clone(),
                started_at,
            };
            for notifier in &self.notifiers {
                if let Err(e) = notifier.execution_started(&start).await {
                    warn!("Start notification for {} failed: {:#}", execution_id, e);
                }
            }
        }

        let runner = StageRunner::new(self.device.clone(), &workflow.validation);
        let mut state = WorkflowState::initial();
        let mut stages = Vec::new();
        let mut failure: Option<(StageKind, Option<FailedStep>, String)> = None;
        let mut rollback_error: Option<String> = None;

        while let Some(kind) = state.stage() {
            let outcome = runner
                .run_stage(kind, workflow.stage(kind), &mut context)
                .await;

            match outcome.status {
                StageStatus::Failure if failure.is_none() => {
                    failure = Some((
                        kind,
                        outcome.failed_step.clone(),
                        outcome.error.clone().unwrap_or_default(),
                    ));
                }
                StageStatus::Failure => {
                    rollback_error = outcome.error.clone();
                }
                StageStatus::Cancelled => {
                    warn!("Execution {} cancelled during {}", execution_id, kind);
                    context.record(ExecutionEvent::ExecutionCancelled);
                    if failure.is_none() {
                        failure = Some((kind, None, "execution cancelled".to_string()));
                    }
                }
                StageStatus::Success => {}
            }

            let next = match state.next(&outcome) {
                Ok(next) => next,
                Err(e) => {
                    error!("Invalid transition in execution {}: {}", execution_id, e);
                    WorkflowState::Failed
                }
            };
            info!("Workflow {}: {} -> {}", workflow.name, state, next);

            stages.push(outcome);
            state = next;
        }

        let status = state.terminal_status().unwrap_or(ExecutionStatus::Failed);
        context.record(ExecutionEvent::ExecutionFinished { status });

        info!(
            "Workflow execution finished: {} - {}",
            workflow.name, status
        );

        let (failed_stage, failed_step, mut error_message) = match failure {
            Some((stage, step, message)) => (Some(stage), step, Some(message)),
            None => (None, None, None),
        };
        if let Some(rollback) = rollback_error {
            let first = error_message.unwrap_or_default();
            error_message = Some(format!("{}; rollback failed: {}", first, rollback));
        }

        let mut result = ExecutionResult {
            execution_id,
            workflow_id: workflow.id,
            workflow_name: workflow.name.clone(),
            target: request.target,
            status,
            stages,
            failed_stage,
            failed_step,
            error_message,
            variables: context.variables.snapshot(),
            log: context.into_log(),
            started_at,
            completed_at: Utc::now(),
            output_diff: None,
        };
        result.output_diff = result.compare_checks();
        if let Some(diff) = &result.output_diff {
            info!(
                "Pre/post check diff: +{} -{}",
                diff.stats.additions, diff.stats.deletions
            );
        }

        for notifier in &self.notifiers {
            if let Err(e) = notifier.execution_finished(&result).await {
                warn!("Finish notification for {} failed: {:#}", execution_id, e);
            }
        }

        result
    }
}
