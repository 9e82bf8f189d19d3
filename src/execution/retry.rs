//! Transport retry policy

use crate::{
    core::{
        context::{ExecutionContext, ExecutionEvent},
        error::{EngineError, Result},
        step::Step,
        workflow::ValidationSettings,
    },
    device::DeviceAdapter,
    execution::executor::{StepExecutor, StepOutcome},
};
use tracing::{error, warn};

/// Decides whether a failed attempt gets another try
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    retry_count: u32,
}

impl RetryPolicy {
    pub fn new(retry_count: u32) -> Self {
        Self { retry_count }
    }

    pub fn from_settings(settings: &ValidationSettings) -> Self {
        Self::new(settings.retry_count)
    }

    /// First attempt plus retries
    pub fn max_attempts(&self) -> u32 {
        self.retry_count.saturating_add(1)
    }

    /// Only transport errors are retried, and only while attempts remain
    pub fn should_retry(&self, error: &EngineError, attempt: u32) -> bool {
        error.is_retryable() && attempt < self.max_attempts()
    }

    /// Run a step, retrying transport failures
    pub async fn execute<D: DeviceAdapter + ?Sized>(
        &self,
        executor: &StepExecutor<D>,
        step: &Step,
        context: &mut ExecutionContext,
    ) -> Result<StepOutcome> {
        let mut attempt = 1;
        loop {
            match executor.execute(step, context).await {
                Ok(outcome) => return Ok(outcome),
                Err(e) if self.should_retry(&e, attempt) && context.is_cancelled() => {
                    warn!("{} not retried after cancellation: {}", step.label(), e);
                    return Err(EngineError::Cancelled);
                }
                Err(e) if self.should_retry(&e, attempt) => {
                    warn!(
                        "{} attempt {}/{} failed: {}",
                        step.label(),
                        attempt,
                        self.max_attempts(),
                        e
                    );
                    context.record_for_step(
                        step,
                        None,
                        None,
                        None,
                        ExecutionEvent::RetryScheduled {
                            attempt,
                            max_attempts: self.max_attempts(),
                            error: e.to_string(),
                        },
                    );
                    attempt += 1;
                }
                Err(e) => {
                    error!("{} failed: {}", step.label(), e);
                    context.record_for_step(
                        step,
                        None,
                        None,
                        None,
                        ExecutionEvent::StepFailed {
                            error: e.to_string(),
                        },
                    );
                    return Err(e);
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(0)
    }
}
