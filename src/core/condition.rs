//! Branch and loop conditions attached to steps

use crate::core::{
    context::ExecutionContext,
    error::Result,
    pattern::CompiledPattern,
    step::Step,
    variables::render_template,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Predicate evaluated against a command's outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    RegexMatches { pattern: String },
    ExitCodeEquals { code: i32 },
    OutputContains { text: String },
    VariableEquals { name: String, value: String },
}

impl Predicate {
    /// Evaluate against an output/exit code pair within the current execution
    pub fn evaluate(&self, output: &str, exit_code: i32, context: &ExecutionContext) -> Result<bool> {
        match self {
            Predicate::RegexMatches { pattern } => {
                let pattern = resolve(pattern, context)?;
                Ok(CompiledPattern::compile(&pattern)?.is_match(output))
            }
            Predicate::ExitCodeEquals { code } => Ok(exit_code == *code),
            Predicate::OutputContains { text } => {
                let text = resolve(text, context)?;
                Ok(output.contains(text.as_str()))
            }
            Predicate::VariableEquals { name, value } => {
                let expected = resolve(value, context)?;
                match context.variables.get(name) {
                    Ok(actual) => Ok(actual == expected),
                    Err(_) => {
                        debug!("Variable '{}' not set, condition evaluates to false", name);
                        Ok(false)
                    }
                }
            }
        }
    }

    /// Name used in workflow documents
    pub fn kind(&self) -> &'static str {
        match self {
            Predicate::RegexMatches { .. } => "if_regex_matches",
            Predicate::ExitCodeEquals { .. } => "if_exit_code_equals",
            Predicate::OutputContains { .. } => "if_output_contains",
            Predicate::VariableEquals { .. } => "if_variable_equals",
        }
    }
}

fn resolve(template: &str, context: &ExecutionContext) -> Result<String> {
    render_template(template, Some(context.dynamic_params()), &context.variables)
}

/// `if_*` condition: one predicate selecting between two command lists
#[derive(Debug, Clone)]
pub struct BranchCondition {
    pub predicate: Predicate,
    pub then_steps: Vec<Step>,
    pub else_steps: Vec<Step>,
}

/// `loop_until_condition`: bounded repetition until a predicate holds
#[derive(Debug, Clone)]
pub struct LoopCondition {
    pub check: Predicate,
    pub max_iterations: u32,
    pub timeout: Duration,

    /// Pause between iterations
    pub interval: Duration,

    /// Commands run every iteration; empty means re-run the originating step
    pub loop_steps: Vec<Step>,

    pub success_action: LoopSuccessAction,

    /// Commands run when the loop exhausts its budget
    pub failure_steps: Vec<Step>,
}

/// What happens once a loop's check condition holds
#[derive(Debug, Clone, Default)]
pub enum LoopSuccessAction {
    #[default]
    Proceed,
    NestedLoop(Box<LoopCondition>),
    RunCommands(Vec<Step>),
    /// Finish the whole workflow immediately, skipping remaining stages
    CompleteWorkflow,
}

/// Condition attached to a step
#[derive(Debug, Clone)]
pub enum Condition {
    Branch(BranchCondition),
    LoopUntil(LoopCondition),
}

impl Condition {
    pub fn kind(&self) -> &'static str {
        match self {
            Condition::Branch(branch) => branch.predicate.kind(),
            Condition::LoopUntil(_) => "loop_until_condition",
        }
    }
}

/// Path taken by a condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Branch {
    Then,
    Else,
    LoopSucceeded,
    LoopExhausted,
}

/// Why a loop stopped iterating
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopExit {
    Satisfied,
    MaxIterations,
    Timeout,
}
