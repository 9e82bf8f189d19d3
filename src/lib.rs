//! netflow - execution engine for multi-stage network automation workflows

pub mod cli;
pub mod core;
pub mod device;
pub mod execution;
pub mod notify;
pub mod persistence;

// Re-export commonly used types
pub use crate::core::config::WorkflowConfig;
pub use crate::core::{
    DeviceError, EngineError, ExecutionContext, ExecutionEvent, ExecutionResult, ExecutionStatus,
    LogEntry, OutputDiff, StageKind, StageOutcome, StageStatus, Step, WorkflowDefinition,
    WorkflowState,
};
pub use device::{DeviceAdapter, DeviceClientConfig, DeviceOutput, ScriptedDevice, SubprocessDevice};
pub use execution::{ExecutionEngine, ExecutionRequest, RetryPolicy, StageRunner, StepExecutor};
pub use notify::{ExecutionNotifier, NotificationKind, WebhookConfig, WebhookNotifier};
pub use persistence::{ExecutionSummary, InMemoryPersistence, PersistenceBackend};
