//! Subprocess device adapter - runs each command through a local program

use crate::core::error::DeviceError;
use crate::device::{DeviceAdapter, DeviceClientConfig, DeviceOutput};
use async_trait::async_trait;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Adapter spawning `program args... <command>` for every device command
#[derive(Debug, Clone)]
pub struct SubprocessDevice {
    config: DeviceClientConfig,
}

impl SubprocessDevice {
    pub fn new(config: DeviceClientConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DeviceClientConfig {
        &self.config
    }
}

#[async_trait]
impl DeviceAdapter for SubprocessDevice {
    /// Runs the command and captures stdout.
    ///
    /// # Errors
    /// Returns `DeviceError` if:
    /// - The program cannot be spawned
    /// - It exits with one of the configured connection failure codes
    /// - The command does not finish within `limit`
    async fn run(&self, command: &str, limit: Duration) -> Result<DeviceOutput, DeviceError> {
        debug!("Spawning {} for command: {}", self.config.program, command);

        let result = timeout(
            limit,
            Command::new(&self.config.program)
                .args(&self.config.args)
                .arg(command)
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| DeviceError::Timeout(limit))?;

        let output = result.map_err(|e| {
            DeviceError::Connection(format!("failed to spawn {}: {}", self.config.program, e))
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        let exit_code = output.status.code().unwrap_or(-1);

        if self.config.is_connection_failure(exit_code) {
            warn!("{} exited with code {}: {}", self.config.program, exit_code, stderr.trim());
            return Err(DeviceError::Connection(format!(
                "{} exited with code {}: {}",
                self.config.program,
                exit_code,
                stderr.trim()
            )));
        }

        // Devices often report command errors on stderr only
        let output = if stdout.trim().is_empty() && !stderr.trim().is_empty() {
            stderr
        } else {
            stdout
        };

        debug!("{} returned {} bytes (exit {})", self.config.program, output.len(), exit_code);

        Ok(DeviceOutput { output, exit_code })
    }
}
