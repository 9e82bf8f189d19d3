//! Device adapters the engine sends commands through

pub mod client;
pub mod scripted;
pub mod subprocess;

use crate::core::error::DeviceError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use client::DeviceClientConfig;
pub use scripted::{ScriptedDevice, ScriptedReply};
pub use subprocess::SubprocessDevice;

/// What a device returned for one command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceOutput {
    pub output: String,
    pub exit_code: i32,
}

impl DeviceOutput {
    pub fn new(output: impl Into<String>, exit_code: i32) -> Self {
        Self {
            output: output.into(),
            exit_code,
        }
    }

    /// Output with a zero exit code
    pub fn ok(output: impl Into<String>) -> Self {
        Self::new(output, 0)
    }
}

/// Trait for command execution against one target device
///
/// Implementations decide how access to the physical device is serialized;
/// the engine only guarantees one in-flight command per execution.
#[async_trait]
pub trait DeviceAdapter: Send + Sync {
    /// Run a command, giving up after `timeout`
    async fn run(&self, command: &str, timeout: Duration) -> Result<DeviceOutput, DeviceError>;
}
