//! Scripted device - canned responses for dry runs and tests

use crate::core::error::DeviceError;
use crate::device::{DeviceAdapter, DeviceOutput};
use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

/// One canned reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedReply {
    Output(DeviceOutput),
    Error(DeviceError),
}

impl ScriptedReply {
    pub fn ok(output: impl Into<String>) -> Self {
        ScriptedReply::Output(DeviceOutput::ok(output))
    }

    pub fn exit(output: impl Into<String>, exit_code: i32) -> Self {
        ScriptedReply::Output(DeviceOutput::new(output, exit_code))
    }

    pub fn error(error: DeviceError) -> Self {
        ScriptedReply::Error(error)
    }
}

/// Device replaying scripted replies keyed by exact command text.
///
/// Each command owns a queue: replies are consumed in order and the last
/// one repeats forever.
#[derive(Debug, Default)]
pub struct ScriptedDevice {
    replies: Mutex<HashMap<String, VecDeque<ScriptedReply>>>,
    fallback: Option<ScriptedReply>,
    delay: Option<Duration>,
    sent: Mutex<Vec<String>>,
}

impl ScriptedDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue replies for a command
    pub fn script(self, command: impl Into<String>, replies: Vec<ScriptedReply>) -> Self {
        if let Ok(mut map) = self.replies.lock() {
            map.entry(command.into()).or_default().extend(replies);
        }
        self
    }

    pub fn respond(self, command: impl Into<String>, output: impl Into<String>) -> Self {
        self.script(command, vec![ScriptedReply::ok(output)])
    }

    pub fn respond_with_exit_code(
        self,
        command: impl Into<String>,
        output: impl Into<String>,
        exit_code: i32,
    ) -> Self {
        self.script(command, vec![ScriptedReply::exit(output, exit_code)])
    }

    /// Successive outputs for successive invocations of the same command
    pub fn respond_sequence<S: Into<String>>(self, command: impl Into<String>, outputs: Vec<S>) -> Self {
        let replies = outputs.into_iter().map(ScriptedReply::ok).collect();
        self.script(command, replies)
    }

    pub fn fail(self, command: impl Into<String>, error: DeviceError) -> Self {
        self.script(command, vec![ScriptedReply::error(error)])
    }

    /// Reply used for commands without a script
    pub fn with_fallback(mut self, reply: ScriptedReply) -> Self {
        self.fallback = Some(reply);
        self
    }

    /// Add artificial latency to every command
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Commands received so far, in order
    pub fn sent_commands(&self) -> Vec<String> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// How many times a command was received
    pub fn count(&self, command: &str) -> usize {
        self.sent
            .lock()
            .map(|s| s.iter().filter(|c| c.as_str() == command).count())
            .unwrap_or(0)
    }

    fn next_reply(&self, command: &str) -> Option<ScriptedReply> {
        let mut map = self.replies.lock().ok()?;
        match map.get_mut(command) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => self.fallback.clone(),
        }
    }

    /// Load a replay script from a YAML or JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read replay script {}", path.display()))?;
        let script: ReplayScript = serde_yaml::from_str(&content)
            .with_context(|| format!("invalid replay script {}", path.display()))?;
        Ok(script.into_device())
    }
}

#[async_trait]
impl DeviceAdapter for ScriptedDevice {
    async fn run(&self, command: &str, _timeout: Duration) -> Result<DeviceOutput, DeviceError> {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(command.to_string());
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        debug!("Scripted device received: {}", command);

        match self.next_reply(command) {
            Some(ScriptedReply::Output(output)) => Ok(output),
            Some(ScriptedReply::Error(error)) => Err(error),
            None => Err(DeviceError::CommandFailed(format!(
                "no scripted response for '{}'",
                command
            ))),
        }
    }
}

/// On-disk replay script
#[derive(Debug, Deserialize)]
struct ReplayScript {
    #[serde(default)]
    responses: Vec<ReplayEntry>,

    /// Output for commands not listed
    #[serde(default)]
    fallback: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReplayEntry {
    command: String,

    #[serde(default)]
    output: Option<String>,

    /// Successive outputs, consumed in order
    #[serde(default)]
    outputs: Vec<String>,

    #[serde(default)]
    exit_code: i32,

    /// Simulate a connection failure with this message
    #[serde(default)]
    error: Option<String>,
}

impl ReplayScript {
    fn into_device(self) -> ScriptedDevice {
        let mut device = ScriptedDevice::new();
        for entry in self.responses {
            let mut replies: Vec<ScriptedReply> = Vec::new();
            if let Some(message) = entry.error {
                replies.push(ScriptedReply::error(DeviceError::Connection(message)));
            }
            replies.extend(
                entry
                    .output
                    .into_iter()
                    .chain(entry.outputs)
                    .map(|o| ScriptedReply::exit(o, entry.exit_code)),
            );
            device = device.script(entry.command, replies);
        }
        if let Some(output) = self.fallback {
            device = device.with_fallback(ScriptedReply::ok(output));
        }
        device
    }
}
