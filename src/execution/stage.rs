//! Stage runner - executes the steps of one stage in order

use crate::{
    core::{
        context::{ExecutionContext, ExecutionEvent},
        error::{EngineError, Result},
        state::{FailedStep, StageOutcome},
        step::Step,
        workflow::{StageKind, ValidationSettings},
    },
    device::DeviceAdapter,
    execution::{
        condition::ConditionEvaluator,
        executor::StepExecutor,
        retry::RetryPolicy,
    },
};
use std::sync::Arc;
use tracing::{info, warn};

/// How one top-level step (and its condition) ended
enum StepVerdict {
    Passed { complete_workflow: bool },
    Failed { step: FailedStep, reason: String },
}

/// Runs stages against one device with a fixed retry policy
pub struct StageRunner<D: ?Sized> {
    executor: StepExecutor<D>,
    retry: RetryPolicy,
}

impl<D: DeviceAdapter + ?Sized> StageRunner<D> {
    pub fn new(device: Arc<D>, settings: &ValidationSettings) -> Self {
        Self {
            executor: StepExecutor::new(device, settings.timeout),
            retry: RetryPolicy::from_settings(settings),
        }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Run every step of a stage, stopping at the first unhandled failure
    pub async fn run_stage(
        &self,
        kind: StageKind,
        steps: &[Step],
        context: &mut ExecutionContext,
    ) -> StageOutcome {
        context.enter_stage(kind);
        context.record(ExecutionEvent::StageStarted { stage: kind });
        info!("Starting stage {} ({} steps)", kind.title(), steps.len());

        let mut outcome = StageOutcome::success(kind, 0);

        for (index, step) in steps.iter().enumerate() {
            if context.is_cancelled() {
                outcome = StageOutcome::cancelled(kind, index);
                break;
            }

            context.enter_step(index);
            match self.run_step(step, context).await {
                Ok(StepVerdict::Passed { complete_workflow }) => {
                    outcome.steps_executed = index + 1;
                    if complete_workflow {
                        outcome.complete_workflow = true;
                        break;
                    }
                }
                Ok(StepVerdict::Failed { step: failed, reason }) => {
                    warn!("Stage {} failed at step {}: {}", kind, index + 1, reason);
                    outcome = StageOutcome::failure(kind, index + 1, failed, reason);
                    break;
                }
                Err(EngineError::Cancelled) => {
                    outcome = StageOutcome::cancelled(kind, index + 1);
                    break;
                }
                Err(e) => {
                    warn!("Stage {} failed at step {}: {}", kind, index + 1, e);
                    let failed = FailedStep {
                        id: step.id,
                        position: step.position,
                        command: step
                            .render_command(context)
                            .unwrap_or_else(|_| step.command.clone()),
                    };
                    outcome = StageOutcome::failure(kind, index + 1, failed, e.to_string());
                    break;
                }
            }
        }

        info!("Stage {} finished: {}", kind.title(), outcome.status);
        context.record(ExecutionEvent::StageFinished {
            stage: kind,
            status: outcome.status,
        });
        outcome
    }

    async fn run_step(&self, step: &Step, context: &mut ExecutionContext) -> Result<StepVerdict> {
        let outcome = self.retry.execute(&self.executor, step, context).await?;

        let condition = match &step.condition {
            Some(condition) => condition,
            None if outcome.matched => {
                return Ok(StepVerdict::Passed {
                    complete_workflow: false,
                })
            }
            None => {
                let reason = format!(
                    "output did not satisfy {} '{}'",
                    step.operator,
                    step.regex_pattern.as_deref().unwrap_or_default()
                );
                return Ok(StepVerdict::Failed {
                    step: FailedStep {
                        id: step.id,
                        position: step.position,
                        command: outcome.command,
                    },
                    reason,
                });
            }
        };

        // The condition decides the step's fate, including a mismatch of its own output
        let result = ConditionEvaluator::new(&self.executor, &self.retry)
            .evaluate(condition, step, &outcome, context)
            .await?;

        match result.failed_command {
            Some(failed) if !result.all_passed => {
                let reason = match result.error {
                    Some(error) => format!(
                        "command '{}' run by {} ({:?}) failed: {}",
                        failed.command,
                        condition.kind(),
                        result.branch,
                        error
                    ),
                    None => format!(
                        "command '{}' run by {} ({:?}) failed validation",
                        failed.command,
                        condition.kind(),
                        result.branch
                    ),
                };
                Ok(StepVerdict::Failed {
                    step: failed,
                    reason,
                })
            }
            _ => Ok(StepVerdict::Passed {
                complete_workflow: result.complete_workflow,
            }),
        }
    }
}
