//! Step domain model

use crate::core::{
    condition::Condition,
    context::ExecutionContext,
    error::Result,
    variables::render_template,
    workflow::StageKind,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Comparison applied between command output and a step's pattern
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    #[default]
    Contains,
    Equal,
    NotEqual,
    NotContains,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Contains => "contains",
            Operator::Equal => "equal",
            Operator::NotEqual => "not_equal",
            Operator::NotContains => "not_contains",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable step identifier assigned by the workflow loader
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepId(pub u32);

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "step-{}", self.0)
    }
}

/// Sequence counter handing out step identifiers in load order
#[derive(Debug, Default)]
pub struct StepIdGenerator {
    next: u32,
}

impl StepIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self) -> StepId {
        let id = StepId(self.next);
        self.next += 1;
        id
    }
}

/// A single device command with its validation and branching metadata
#[derive(Debug, Clone)]
pub struct Step {
    pub id: StepId,

    /// Stage the step belongs to
    pub stage: StageKind,

    /// Index of the owning top-level step within its stage.
    /// Auxiliary commands share the position of the step that triggered them.
    pub position: usize,

    /// Top-level step that owns this auxiliary command, if any
    pub parent: Option<StepId>,

    /// Command template, may reference `{variable}` and (when dynamic) `{{param}}`
    pub command: String,

    pub regex_pattern: Option<String>,

    pub operator: Operator,

    /// Whether `{{param}}` tokens are resolved from the execution's dynamic parameters
    pub is_dynamic: bool,

    pub store_in_variable: Option<String>,

    pub variable_description: Option<String>,

    pub condition: Option<Condition>,
}

impl Step {
    /// Resolve a template against the execution's parameters and variables
    fn render(&self, template: &str, context: &ExecutionContext) -> Result<String> {
        let params = self.is_dynamic.then(|| context.dynamic_params());
        render_template(template, params, &context.variables)
    }

    /// Render the command that will be sent to the device
    pub fn render_command(&self, context: &ExecutionContext) -> Result<String> {
        self.render(&self.command, context)
    }

    /// Render the validation pattern, if the step has one
    pub fn render_pattern(&self, context: &ExecutionContext) -> Result<Option<String>> {
        match self.regex_pattern.as_deref() {
            Some(pattern) if !pattern.is_empty() => self.render(pattern, context).map(Some),
            _ => Ok(None),
        }
    }

    /// Whether this is a branch/loop command rather than a stage step
    pub fn is_auxiliary(&self) -> bool {
        self.parent.is_some()
    }

    /// Short label used in logs
    pub fn label(&self) -> String {
        format!("{}#{} ({})", self.stage, self.position, self.id)
    }
}
