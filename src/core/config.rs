//! Workflow documents as produced by the builder (JSON or YAML)

use crate::core::{
    condition::{BranchCondition, Condition, LoopCondition, LoopSuccessAction, Predicate},
    error::{EngineError, Result},
    pattern::CompiledPattern,
    step::{Operator, Step, StepId, StepIdGenerator},
    variables::{has_dynamic_tokens, has_variable_references},
    workflow::{StageKind, ValidationSettings, WorkflowDefinition},
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;
use uuid::Uuid;

/// Top-level workflow document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Workflow identity (generated when absent)
    #[serde(default)]
    pub id: Option<Uuid>,

    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default, alias = "pre_check_commands")]
    pub pre_check: Vec<StepEntry>,

    #[serde(default, alias = "implementation_commands")]
    pub implementation: Vec<StepEntry>,

    #[serde(default, alias = "post_check_commands")]
    pub post_check: Vec<StepEntry>,

    #[serde(default, alias = "rollback_commands")]
    pub rollback: Vec<StepEntry>,

    #[serde(default)]
    pub validation_rules: ValidationRules,

    /// Default variable values available to `{name}` references
    #[serde(default)]
    pub variables: HashMap<String, String>,
}

/// Global validation settings
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ValidationRules {
    /// Per-command timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Retries after a transport failure
    #[serde(default)]
    pub retry_count: u32,
}

fn default_timeout() -> u64 {
    30
}

impl Default for ValidationRules {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            retry_count: 0,
        }
    }
}

/// A stage entry: either a bare command string or a full step object
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StepEntry {
    Command(String),
    Detailed(StepConfig),
}

impl StepEntry {
    fn to_config(&self) -> StepConfig {
        match self {
            StepEntry::Command(command) => StepConfig {
                command: command.clone(),
                ..StepConfig::default()
            },
            StepEntry::Detailed(config) => config.clone(),
        }
    }
}

/// Step configuration as emitted by the builder
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepConfig {
    pub command: String,

    #[serde(default)]
    pub regex_pattern: Option<String>,

    #[serde(default)]
    pub operator: Operator,

    #[serde(default)]
    pub is_dynamic: bool,

    #[serde(default)]
    pub store_in_variable: Option<String>,

    #[serde(default)]
    pub variable_description: Option<String>,

    #[serde(default)]
    pub condition: Option<ConditionConfig>,
}

/// Condition attached to a step
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", deny_unknown_fields)]
pub enum ConditionConfig {
    IfRegexMatches {
        pattern: String,
        #[serde(default)]
        then: Vec<StepEntry>,
        #[serde(default, rename = "else")]
        otherwise: Vec<StepEntry>,
    },
    IfExitCodeEquals {
        code: i32,
        #[serde(default)]
        then: Vec<StepEntry>,
        #[serde(default, rename = "else")]
        otherwise: Vec<StepEntry>,
    },
    IfOutputContains {
        text: String,
        #[serde(default)]
        then: Vec<StepEntry>,
        #[serde(default, rename = "else")]
        otherwise: Vec<StepEntry>,
    },
    IfVariableEquals {
        name: String,
        value: String,
        #[serde(default)]
        then: Vec<StepEntry>,
        #[serde(default, rename = "else")]
        otherwise: Vec<StepEntry>,
    },
    LoopUntilCondition(LoopConfig),
}

/// Predicate used as a loop's check condition
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", deny_unknown_fields)]
pub enum CheckConditionConfig {
    #[serde(alias = "regex_matches")]
    IfRegexMatches { pattern: String },
    #[serde(alias = "exit_code_equals")]
    IfExitCodeEquals { code: i32 },
    #[serde(alias = "output_contains")]
    IfOutputContains { text: String },
    #[serde(alias = "variable_equals")]
    IfVariableEquals { name: String, value: String },
}

/// Bounded loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoopConfig {
    #[serde(alias = "checkCondition")]
    pub check_condition: CheckConditionConfig,

    #[serde(alias = "maxIterations")]
    pub max_iterations: u32,

    #[serde(alias = "timeoutSeconds")]
    pub timeout_seconds: u64,

    /// Pause between iterations in seconds
    #[serde(default, alias = "intervalSeconds")]
    pub interval_seconds: u64,

    #[serde(default, alias = "loopCommands")]
    pub loop_commands: Vec<StepEntry>,

    #[serde(default, alias = "successAction", alias = "loopSuccessAction")]
    pub loop_success_action: LoopSuccessActionConfig,

    #[serde(default, alias = "onFailure")]
    pub on_failure: Vec<StepEntry>,
}

/// Continuation after a loop succeeds
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case", deny_unknown_fields)]
pub enum LoopSuccessActionConfig {
    #[default]
    Proceed,
    NestedLoop {
        #[serde(rename = "loop")]
        nested: Box<LoopConfig>,
    },
    RunCommands {
        commands: Vec<StepEntry>,
    },
    CompleteWorkflow,
}

fn identifier() -> &'static Regex {
    static IDENT: OnceLock<Regex> = OnceLock::new();
    IDENT.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_.\-]*$").expect("identifier regex is valid")
    })
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn invalid(path: &str, message: impl std::fmt::Display) -> EngineError {
    EngineError::Configuration(format!("{}: {}", path, message))
}

impl WorkflowConfig {
    /// Load a workflow document; `.json` files are parsed as JSON, anything else as YAML
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        let config = if is_json {
            Self::from_json(&content)?
        } else {
            Self::from_yaml(&content)?
        };
        Ok(config)
    }

    /// Parse a workflow document from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        let config: WorkflowConfig = serde_json::from_str(json)
            .map_err(|e| EngineError::Configuration(format!("invalid workflow document: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a workflow document from YAML
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: WorkflowConfig = serde_yaml::from_str(yaml)
            .map_err(|e| EngineError::Configuration(format!("invalid workflow document: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Entries of one stage
    pub fn stage(&self, kind: StageKind) -> &[StepEntry] {
        match kind {
            StageKind::PreCheck => &self.pre_check,
            StageKind::Implementation => &self.implementation,
            StageKind::PostCheck => &self.post_check,
            StageKind::Rollback => &self.rollback,
        }
    }

    /// Validate the workflow document
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(EngineError::Configuration(
                "workflow name must not be empty".to_string(),
            ));
        }

        if self.validation_rules.timeout == 0 {
            return Err(EngineError::Configuration(
                "validation_rules.timeout must be at least 1 second".to_string(),
            ));
        }

        for name in self.variables.keys() {
            if !identifier().is_match(name) {
                return Err(invalid("variables", format!("'{}' is not a valid variable name", name)));
            }
        }

        for kind in StageKind::ALL {
            for (index, entry) in self.stage(kind).iter().enumerate() {
                let path = format!("{}[{}]", kind, index);
                validate_step(&path, &entry.to_config(), true)?;
            }
        }

        Ok(())
    }

    /// Convert the document into an immutable workflow definition
    pub fn to_workflow(&self) -> Result<WorkflowDefinition> {
        self.validate()?;
        Ok(WorkflowDefinition::from_config(self))
    }
}

fn validate_step(path: &str, step: &StepConfig, top_level: bool) -> Result<()> {
    if step.command.trim().is_empty() {
        return Err(invalid(path, "command must not be empty"));
    }

    if let Some(name) = non_empty(&step.store_in_variable) {
        if !identifier().is_match(&name) {
            return Err(invalid(
                path,
                format!("store_in_variable '{}' is not a valid variable name", name),
            ));
        }
    }

    let pattern = non_empty(&step.regex_pattern);
    if !step.is_dynamic {
        let uses_params = has_dynamic_tokens(&step.command)
            || pattern.as_deref().is_some_and(has_dynamic_tokens);
        if uses_params {
            return Err(invalid(
                path,
                "uses {{param}} tokens but is not marked is_dynamic",
            ));
        }
    }

    if let Some(pattern) = pattern {
        validate_static_pattern(path, &pattern)?;
    }

    match &step.condition {
        None => Ok(()),
        Some(_) if !top_level => Err(invalid(
            path,
            "conditions inside then/else/loop commands are not supported",
        )),
        Some(condition) => validate_condition(&format!("{}.condition", path), condition),
    }
}

/// Compile patterns that carry no placeholders so authoring errors surface at load time
fn validate_static_pattern(path: &str, pattern: &str) -> Result<()> {
    if has_dynamic_tokens(pattern) || has_variable_references(pattern) {
        return Ok(());
    }
    CompiledPattern::compile(pattern)
        .map(|_| ())
        .map_err(|e| invalid(path, e))
}

fn validate_commands(path: &str, entries: &[StepEntry]) -> Result<()> {
    for (index, entry) in entries.iter().enumerate() {
        validate_step(&format!("{}[{}]", path, index), &entry.to_config(), false)?;
    }
    Ok(())
}

fn validate_condition(path: &str, condition: &ConditionConfig) -> Result<()> {
    let (then, otherwise) = match condition {
        ConditionConfig::IfRegexMatches {
            pattern,
            then,
            otherwise,
        } => {
            validate_static_pattern(path, pattern)?;
            (then, otherwise)
        }
        ConditionConfig::IfExitCodeEquals { then, otherwise, .. }
        | ConditionConfig::IfOutputContains { then, otherwise, .. }
        | ConditionConfig::IfVariableEquals { then, otherwise, .. } => (then, otherwise),
        ConditionConfig::LoopUntilCondition(loop_def) => return validate_loop(path, loop_def),
    };

    validate_commands(&format!("{}.then", path), then)?;
    validate_commands(&format!("{}.else", path), otherwise)
}

fn validate_loop(path: &str, loop_def: &LoopConfig) -> Result<()> {
    if loop_def.max_iterations == 0 {
        return Err(invalid(path, "max_iterations must be at least 1"));
    }
    if loop_def.timeout_seconds == 0 {
        return Err(invalid(path, "timeout_seconds must be at least 1"));
    }
    if let CheckConditionConfig::IfRegexMatches { pattern } = &loop_def.check_condition {
        validate_static_pattern(&format!("{}.check_condition", path), pattern)?;
    }

    validate_commands(&format!("{}.loop_commands", path), &loop_def.loop_commands)?;
    validate_commands(&format!("{}.on_failure", path), &loop_def.on_failure)?;

    match &loop_def.loop_success_action {
        LoopSuccessActionConfig::NestedLoop { nested } => {
            validate_loop(&format!("{}.loop_success_action.loop", path), nested)
        }
        LoopSuccessActionConfig::RunCommands { commands } => {
            validate_commands(&format!("{}.loop_success_action.commands", path), commands)
        }
        LoopSuccessActionConfig::Proceed | LoopSuccessActionConfig::CompleteWorkflow => Ok(()),
    }
}

impl From<&CheckConditionConfig> for Predicate {
    fn from(config: &CheckConditionConfig) -> Self {
        match config {
            CheckConditionConfig::IfRegexMatches { pattern } => Predicate::RegexMatches {
                pattern: pattern.clone(),
            },
            CheckConditionConfig::IfExitCodeEquals { code } => {
                Predicate::ExitCodeEquals { code: *code }
            }
            CheckConditionConfig::IfOutputContains { text } => {
                Predicate::OutputContains { text: text.clone() }
            }
            CheckConditionConfig::IfVariableEquals { name, value } => Predicate::VariableEquals {
                name: name.clone(),
                value: value.clone(),
            },
        }
    }
}

/// Builds domain steps from validated configuration, owning step id generation
struct StepBuilder {
    ids: StepIdGenerator,
}

impl StepBuilder {
    fn stage(&mut self, kind: StageKind, entries: &[StepEntry]) -> Vec<Step> {
        entries
            .iter()
            .enumerate()
            .map(|(position, entry)| self.step(kind, position, None, &entry.to_config()))
            .collect()
    }

    fn step(
        &mut self,
        stage: StageKind,
        position: usize,
        parent: Option<StepId>,
        config: &StepConfig,
    ) -> Step {
        let id = self.ids.next_id();
        let condition = config
            .condition
            .as_ref()
            .map(|c| self.condition(stage, position, id, c));

        Step {
            id,
            stage,
            position,
            parent,
            command: config.command.trim().to_string(),
            regex_pattern: non_empty(&config.regex_pattern),
            operator: config.operator,
            is_dynamic: config.is_dynamic,
            store_in_variable: non_empty(&config.store_in_variable),
            variable_description: non_empty(&config.variable_description),
            condition,
        }
    }

    fn commands(
        &mut self,
        stage: StageKind,
        position: usize,
        parent: StepId,
        entries: &[StepEntry],
    ) -> Vec<Step> {
        entries
            .iter()
            .map(|entry| {
                let mut config = entry.to_config();
                config.condition = None;
                self.step(stage, position, Some(parent), &config)
            })
            .collect()
    }

    fn condition(
        &mut self,
        stage: StageKind,
        position: usize,
        parent: StepId,
        config: &ConditionConfig,
    ) -> Condition {
        let (predicate, then, otherwise) = match config {
            ConditionConfig::IfRegexMatches {
                pattern,
                then,
                otherwise,
            } => (
                Predicate::RegexMatches {
                    pattern: pattern.clone(),
                },
                then,
                otherwise,
            ),
            ConditionConfig::IfExitCodeEquals {
                code,
                then,
                otherwise,
            } => (Predicate::ExitCodeEquals { code: *code }, then, otherwise),
            ConditionConfig::IfOutputContains {
                text,
                then,
                otherwise,
            } => (Predicate::OutputContains { text: text.clone() }, then, otherwise),
            ConditionConfig::IfVariableEquals {
                name,
                value,
                then,
                otherwise,
            } => (
                Predicate::VariableEquals {
                    name: name.clone(),
                    value: value.clone(),
                },
                then,
                otherwise,
            ),
            ConditionConfig::LoopUntilCondition(loop_def) => {
                return Condition::LoopUntil(self.loop_condition(stage, position, parent, loop_def));
            }
        };

        Condition::Branch(BranchCondition {
            predicate,
            then_steps: self.commands(stage, position, parent, then),
            else_steps: self.commands(stage, position, parent, otherwise),
        })
    }

    fn loop_condition(
        &mut self,
        stage: StageKind,
        position: usize,
        parent: StepId,
        loop_def: &LoopConfig,
    ) -> LoopCondition {
        let loop_steps = self.commands(stage, position, parent, &loop_def.loop_commands);
        let success_action = match &loop_def.loop_success_action {
            LoopSuccessActionConfig::Proceed => LoopSuccessAction::Proceed,
            LoopSuccessActionConfig::NestedLoop { nested } => LoopSuccessAction::NestedLoop(
                Box::new(self.loop_condition(stage, position, parent, nested)),
            ),
            LoopSuccessActionConfig::RunCommands { commands } => {
                LoopSuccessAction::RunCommands(self.commands(stage, position, parent, commands))
            }
            LoopSuccessActionConfig::CompleteWorkflow => LoopSuccessAction::CompleteWorkflow,
        };
        let failure_steps = self.commands(stage, position, parent, &loop_def.on_failure);

        LoopCondition {
            check: Predicate::from(&loop_def.check_condition),
            max_iterations: loop_def.max_iterations,
            timeout: Duration::from_secs(loop_def.timeout_seconds),
            interval: Duration::from_secs(loop_def.interval_seconds),
            loop_steps,
            success_action,
            failure_steps,
        }
    }
}

impl WorkflowDefinition {
    /// Build a workflow from an already validated document
    pub fn from_config(config: &WorkflowConfig) -> Self {
        let mut builder = StepBuilder {
            ids: StepIdGenerator::new(),
        };

        WorkflowDefinition {
            id: config.id.unwrap_or_else(Uuid::new_v4),
            name: config.name.clone(),
            description: config.description.clone(),
            pre_check: builder.stage(StageKind::PreCheck, &config.pre_check),
            implementation: builder.stage(StageKind::Implementation, &config.implementation),
            post_check: builder.stage(StageKind::PostCheck, &config.post_check),
            rollback: builder.stage(StageKind::Rollback, &config.rollback),
            validation: ValidationSettings {
                timeout: Duration::from_secs(config.validation_rules.timeout),
                retry_count: config.validation_rules.retry_count,
            },
            variables: config.variables.clone(),
        }
    }
}
