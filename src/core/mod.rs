//! Core domain models for netflow
//!
//! This module defines the workflow definition, its steps and conditions,
//! the per-execution context, and the state machine driving a run.

pub mod condition;
pub mod config;
pub mod context;
pub mod diff;
pub mod error;
pub mod pattern;
pub mod state;
pub mod step;
pub mod variables;
pub mod workflow;

pub use condition::*;
pub use context::*;
pub use diff::{DiffStats, OutputDiff};
pub use error::*;
pub use state::*;
pub use step::*;
pub use variables::VariableStore;
pub use workflow::*;
