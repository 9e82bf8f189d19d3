//! Workflow domain model

use crate::core::{
    condition::{Condition, LoopCondition, LoopSuccessAction},
    step::{Step, StepId},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// The four fixed execution phases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    PreCheck,
    Implementation,
    PostCheck,
    Rollback,
}

impl StageKind {
    pub const ALL: [StageKind; 4] = [
        StageKind::PreCheck,
        StageKind::Implementation,
        StageKind::PostCheck,
        StageKind::Rollback,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::PreCheck => "pre_check",
            StageKind::Implementation => "implementation",
            StageKind::PostCheck => "post_check",
            StageKind::Rollback => "rollback",
        }
    }

    /// Human-readable name
    pub fn title(&self) -> &'static str {
        match self {
            StageKind::PreCheck => "Pre-Check",
            StageKind::Implementation => "Implementation",
            StageKind::PostCheck => "Post-Check",
            StageKind::Rollback => "Rollback",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Global validation settings applied to every command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationSettings {
    /// Per-attempt bound on a device command
    pub timeout: Duration,

    /// Additional attempts after a transport failure
    pub retry_count: u32,
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            retry_count: 0,
        }
    }
}

/// An immutable, fully parsed workflow
#[derive(Debug, Clone)]
pub struct WorkflowDefinition {
    pub id: Uuid,

    pub name: String,

    pub description: Option<String>,

    pub pre_check: Vec<Step>,

    pub implementation: Vec<Step>,

    pub post_check: Vec<Step>,

    pub rollback: Vec<Step>,

    pub validation: ValidationSettings,

    /// Default variable values seeded into every execution
    pub variables: HashMap<String, String>,
}

impl WorkflowDefinition {
    /// Steps of one stage, in declaration order
    pub fn stage(&self, kind: StageKind) -> &[Step] {
        match kind {
            StageKind::PreCheck => &self.pre_check,
            StageKind::Implementation => &self.implementation,
            StageKind::PostCheck => &self.post_check,
            StageKind::Rollback => &self.rollback,
        }
    }

    /// Number of top-level steps across all stages
    pub fn step_count(&self) -> usize {
        StageKind::ALL.iter().map(|k| self.stage(*k).len()).sum()
    }

    /// Find any step, including branch and loop commands, by its identifier
    pub fn step(&self, id: StepId) -> Option<&Step> {
        StageKind::ALL
            .iter()
            .flat_map(|k| self.stage(*k).iter())
            .find_map(|step| find_in_step(step, id))
    }
}

fn find_in_step(step: &Step, id: StepId) -> Option<&Step> {
    if step.id == id {
        return Some(step);
    }

    match step.condition.as_ref()? {
        Condition::Branch(branch) => find_in(&branch.then_steps, id)
            .or_else(|| find_in(&branch.else_steps, id)),
        Condition::LoopUntil(loop_def) => find_in_loop(loop_def, id),
    }
}

fn find_in_loop(loop_def: &LoopCondition, id: StepId) -> Option<&Step> {
    find_in(&loop_def.loop_steps, id)
        .or_else(|| find_in(&loop_def.failure_steps, id))
        .or_else(|| match &loop_def.success_action {
            LoopSuccessAction::NestedLoop(inner) => find_in_loop(inner, id),
            LoopSuccessAction::RunCommands(steps) => find_in(steps, id),
            LoopSuccessAction::Proceed | LoopSuccessAction::CompleteWorkflow => None,
        })
}

fn find_in(steps: &[Step], id: StepId) -> Option<&Step> {
    steps.iter().find_map(|s| find_in_step(s, id))
}
