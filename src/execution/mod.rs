//! Workflow execution engine

pub mod condition;
pub mod engine;
pub mod executor;
pub mod retry;
pub mod stage;

pub use condition::{ConditionEvaluator, ConditionOutcome};
pub use engine::{EventHandler, ExecutionEngine, ExecutionRequest};
pub use executor::{StepExecutor, StepOutcome};
pub use retry::RetryPolicy;
pub use stage::StageRunner;
