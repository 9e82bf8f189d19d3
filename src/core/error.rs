//! Error types for workflow execution

use std::time::Duration;
use thiserror::Error;

/// Transport-level failures reported by a device adapter
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeviceError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("command timed out after {0:?}")]
    Timeout(Duration),

    #[error("command failed: {0}")]
    CommandFailed(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Errors raised while executing a workflow
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    /// Authoring problem detected at load time or while resolving dynamic tokens
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A validation pattern failed to compile
    #[error("invalid pattern '{pattern}': {message}")]
    Pattern { pattern: String, message: String },

    /// A `{name}` reference had no value in the variable store
    #[error("unresolved variable '{name}' in '{template}'")]
    UnresolvedVariable { name: String, template: String },

    #[error("variable not found: {0}")]
    VariableNotFound(String),

    #[error("device error: {0}")]
    Device(#[from] DeviceError),

    #[error("invalid state transition from {from} on {outcome}")]
    InvalidStateTransition { from: String, outcome: String },

    #[error("execution cancelled")]
    Cancelled,
}

impl EngineError {
    /// Only transport failures are worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Device(_))
    }
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;
