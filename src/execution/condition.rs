//! Condition evaluator - branches and bounded loops attached to a step

use crate::{
    core::{
        condition::{Branch, BranchCondition, Condition, LoopCondition, LoopExit, LoopSuccessAction},
        context::{ExecutionContext, ExecutionEvent},
        error::{EngineError, Result},
        state::FailedStep,
        step::Step,
    },
    device::DeviceAdapter,
    execution::{
        executor::{StepExecutor, StepOutcome},
        retry::RetryPolicy,
    },
};
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

/// What a condition did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionOutcome {
    pub branch: Branch,

    /// Every command the condition ran, in order
    pub executed: Vec<StepOutcome>,

    /// No branch, success or failure command failed validation
    pub all_passed: bool,

    /// A loop asked to finish the workflow
    pub complete_workflow: bool,

    /// Loop iterations across the loop and any nested loops
    pub iterations: u32,

    /// Why the last loop stopped, for loop conditions
    pub loop_exit: Option<LoopExit>,

    /// First command that failed validation or could not run
    pub failed_command: Option<FailedStep>,

    /// Error raised by `failed_command`, when it never produced output
    pub error: Option<String>,
}

impl ConditionOutcome {
    fn new(branch: Branch) -> Self {
        Self {
            branch,
            executed: Vec::new(),
            all_passed: true,
            complete_workflow: false,
            iterations: 0,
            loop_exit: None,
            failed_command: None,
            error: None,
        }
    }
}

/// Evaluates the condition attached to a step and runs the selected commands
pub struct ConditionEvaluator<'a, D: ?Sized> {
    executor: &'a StepExecutor<D>,
    retry: &'a RetryPolicy,
}

impl<'a, D: DeviceAdapter + ?Sized> ConditionEvaluator<'a, D> {
    pub fn new(executor: &'a StepExecutor<D>, retry: &'a RetryPolicy) -> Self {
        Self { executor, retry }
    }

    /// Evaluate `condition` for the outcome of its originating step
    pub async fn evaluate(
        &self,
        condition: &Condition,
        origin: &Step,
        outcome: &StepOutcome,
        context: &mut ExecutionContext,
    ) -> Result<ConditionOutcome> {
        match condition {
            Condition::Branch(branch) => self.branch(branch, origin, outcome, context).await,
            Condition::LoopUntil(loop_def) => self.run_loop(loop_def, origin, context).await,
        }
    }

    async fn branch(
        &self,
        branch: &BranchCondition,
        origin: &Step,
        outcome: &StepOutcome,
        context: &mut ExecutionContext,
    ) -> Result<ConditionOutcome> {
        let taken = branch
            .predicate
            .evaluate(&outcome.output, outcome.exit_code, context)?;
        let (which, steps) = if taken {
            (Branch::Then, &branch.then_steps)
        } else {
            (Branch::Else, &branch.else_steps)
        };

        info!(
            "{} {} -> {:?} ({} commands)",
            origin.label(),
            branch.predicate.kind(),
            which,
            steps.len()
        );
        context.record_for_step(
            origin,
            Some(outcome.command.clone()),
            None,
            None,
            ExecutionEvent::ConditionEvaluated {
                condition: branch.predicate.kind().to_string(),
                branch: which,
            },
        );

        let mut result = ConditionOutcome::new(which);
        self.run_commands(steps, context, &mut result).await?;
        Ok(result)
    }

    /// Run one command for the condition.
    ///
    /// A command that errors becomes the condition's failed command and
    /// yields `None`; only cancellation propagates.
    async fn attempt(
        &self,
        step: &Step,
        context: &mut ExecutionContext,
        result: &mut ConditionOutcome,
    ) -> Result<Option<StepOutcome>> {
        match self.retry.execute(self.executor, step, context).await {
            Ok(outcome) => Ok(Some(outcome)),
            Err(EngineError::Cancelled) => Err(EngineError::Cancelled),
            Err(e) => {
                warn!("{} could not run inside condition: {}", step.label(), e);
                let command = step
                    .render_command(context)
                    .unwrap_or_else(|_| step.command.clone());
                result.all_passed = false;
                result.failed_command = Some(FailedStep {
                    id: step.id,
                    position: step.position,
                    command,
                });
                result.error = Some(e.to_string());
                Ok(None)
            }
        }
    }

    /// Run commands in order, stopping at the first failure
    async fn run_commands(
        &self,
        steps: &[Step],
        context: &mut ExecutionContext,
        result: &mut ConditionOutcome,
    ) -> Result<()> {
        for step in steps {
            if context.is_cancelled() {
                return Err(EngineError::Cancelled);
            }

            let Some(outcome) = self.attempt(step, context, result).await? else {
                break;
            };
            let matched = outcome.matched;
            let command = outcome.command.clone();
            result.executed.push(outcome);

            if !matched {
                warn!("{} failed validation inside condition", step.label());
                result.all_passed = false;
                result.failed_command = Some(FailedStep {
                    id: step.id,
                    position: step.position,
                    command,
                });
                break;
            }
        }
        Ok(())
    }

    /// Run a loop and whatever continuation it selects.
    ///
    /// Nested loops are walked iteratively: each satisfied loop either hands
    /// over to its nested loop or finishes.
    async fn run_loop(
        &self,
        loop_def: &LoopCondition,
        origin: &Step,
        context: &mut ExecutionContext,
    ) -> Result<ConditionOutcome> {
        let mut result = ConditionOutcome::new(Branch::LoopSucceeded);
        let mut current = loop_def;

        loop {
            let Some(exit) = self.iterate(current, origin, context, &mut result).await? else {
                // A loop command could not run; the loop neither succeeds nor falls back
                result.branch = Branch::LoopExhausted;
                return Ok(result);
            };
            result.loop_exit = Some(exit);

            if exit != LoopExit::Satisfied {
                info!("{} loop exhausted ({:?})", origin.label(), exit);
                result.branch = Branch::LoopExhausted;
                self.record_branch(origin, context, Branch::LoopExhausted);
                self.run_commands(&current.failure_steps, context, &mut result)
                    .await?;
                return Ok(result);
            }

            match &current.success_action {
                LoopSuccessAction::NestedLoop(inner) => {
                    debug!("{} entering nested loop", origin.label());
                    current = inner.as_ref();
                }
                action => {
                    self.record_branch(origin, context, Branch::LoopSucceeded);
                    match action {
                        LoopSuccessAction::RunCommands(steps) => {
                            self.run_commands(steps, context, &mut result).await?;
                        }
                        LoopSuccessAction::CompleteWorkflow => {
                            info!("{} loop requested workflow completion", origin.label());
                            result.complete_workflow = true;
                        }
                        LoopSuccessAction::Proceed | LoopSuccessAction::NestedLoop(_) => {}
                    }
                    return Ok(result);
                }
            }
        }
    }

    fn record_branch(&self, origin: &Step, context: &mut ExecutionContext, branch: Branch) {
        context.record_for_step(
            origin,
            None,
            None,
            None,
            ExecutionEvent::ConditionEvaluated {
                condition: "loop_until_condition".to_string(),
                branch,
            },
        );
    }

    /// Iterate one loop until its check holds or a bound is hit.
    ///
    /// `None` means a loop command could not run.
    async fn iterate(
        &self,
        loop_def: &LoopCondition,
        origin: &Step,
        context: &mut ExecutionContext,
        result: &mut ConditionOutcome,
    ) -> Result<Option<LoopExit>> {
        let started = Instant::now();
        let token = context.cancel_token().clone();
        let mut iteration: u32 = 0;

        loop {
            if context.is_cancelled() {
                return Err(EngineError::Cancelled);
            }

            iteration += 1;
            result.iterations += 1;

            let last = if loop_def.loop_steps.is_empty() {
                self.attempt(origin, context, result).await?
            } else {
                let mut last = None;
                for step in &loop_def.loop_steps {
                    last = self.attempt(step, context, result).await?;
                    if last.is_none() {
                        break;
                    }
                }
                last
            };
            let Some(last) = last else {
                return Ok(None);
            };

            let satisfied = loop_def.check.evaluate(&last.output, last.exit_code, context)?;
            debug!(
                "{} loop iteration {}/{}: satisfied={}",
                origin.label(),
                iteration,
                loop_def.max_iterations,
                satisfied
            );
            context.record_for_step(
                origin,
                Some(last.command.clone()),
                Some(satisfied),
                None,
                ExecutionEvent::LoopIteration {
                    iteration,
                    satisfied,
                },
            );
            result.executed.push(last);

            let exit = if satisfied {
                Some(LoopExit::Satisfied)
            } else if iteration >= loop_def.max_iterations {
                Some(LoopExit::MaxIterations)
            } else if started.elapsed() >= loop_def.timeout {
                Some(LoopExit::Timeout)
            } else {
                None
            };

            if let Some(exit) = exit {
                self.finish(origin, context, exit, iteration);
                return Ok(Some(exit));
            }

            let remaining = loop_def.timeout.saturating_sub(started.elapsed());
            let pause = loop_def.interval.min(remaining);
            if !pause.is_zero() {
                tokio::select! {
                    _ = sleep(pause) => {}
                    _ = token.cancelled() => return Err(EngineError::Cancelled),
                }
                if started.elapsed() >= loop_def.timeout {
                    self.finish(origin, context, LoopExit::Timeout, iteration);
                    return Ok(Some(LoopExit::Timeout));
                }
            }
        }
    }

    fn finish(&self, origin: &Step, context: &mut ExecutionContext, exit: LoopExit, iterations: u32) {
        context.record_for_step(
            origin,
            None,
            None,
            None,
            ExecutionEvent::LoopFinished { exit, iterations },
        );
    }
}
