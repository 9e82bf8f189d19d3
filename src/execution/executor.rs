//! Step executor - runs individual steps against the device

use crate::{
    core::{
        context::{CapturedVariable, ExecutionContext, ExecutionEvent},
        error::{DeviceError, Result},
        pattern::{match_compiled, CompiledPattern, MatchOutcome},
        step::{Step, StepId},
    },
    device::DeviceAdapter,
};
use std::sync::Arc;
use tokio::time::{timeout, Duration};
use tracing::{debug, info, warn};

/// Result of executing one step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    pub step_id: StepId,

    /// Command as sent to the device
    pub command: String,

    pub output: String,

    pub exit_code: i32,

    /// Whether the output satisfied the step's validation rule
    pub matched: bool,

    pub captured: Option<CapturedVariable>,
}

/// Executes a single step
pub struct StepExecutor<D: ?Sized> {
    device: Arc<D>,
    timeout: Duration,
}

impl<D: DeviceAdapter + ?Sized> StepExecutor<D> {
    pub fn new(device: Arc<D>, timeout: Duration) -> Self {
        Self { device, timeout }
    }

    /// Per-command time limit
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Execute one attempt of a step and return its outcome.
    ///
    /// Transport failures are returned as errors and never retried here.
    pub async fn execute(&self, step: &Step, context: &mut ExecutionContext) -> Result<StepOutcome> {
        let command = step.render_command(context)?;
        info!("Executing {}: {}", step.label(), command);

        let reply = match timeout(self.timeout, self.device.run(&command, self.timeout)).await {
            Ok(reply) => reply?,
            Err(_) => {
                warn!("Timeout for {} after {:?}", step.label(), self.timeout);
                return Err(DeviceError::Timeout(self.timeout).into());
            }
        };
        debug!("Device output for {}: {}", step.label(), reply.output);

        let verdict = match step.render_pattern(context)? {
            Some(pattern) => {
                let compiled = CompiledPattern::compile(&pattern)?;
                match_compiled(&reply.output, step.operator, &compiled)
            }
            // No validation rule means the step passes
            None => MatchOutcome {
                matched: true,
                capture: None,
            },
        };

        let captured = step.store_in_variable.as_ref().map(|name| {
            let value = match (verdict.matched, verdict.capture.as_ref()) {
                (true, Some(capture)) => capture.clone(),
                _ => reply.output.clone(),
            };
            context.variables.set(name.as_str(), value.as_str());
            debug!("Stored variable {} = {}", name, value);
            CapturedVariable {
                name: name.clone(),
                value,
            }
        });

        if verdict.matched {
            info!("{} passed validation", step.label());
        } else {
            warn!(
                "{} failed validation ({} {:?})",
                step.label(),
                step.operator,
                step.regex_pattern
            );
        }

        context.record_for_step(
            step,
            Some(command.clone()),
            Some(verdict.matched),
            captured.clone(),
            ExecutionEvent::StepExecuted {
                exit_code: reply.exit_code,
                output: reply.output.clone(),
            },
        );

        Ok(StepOutcome {
            step_id: step.id,
            command,
            output: reply.output,
            exit_code: reply.exit_code,
            matched: verdict.matched,
            captured,
        })
    }
}
