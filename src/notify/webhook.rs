//! HTTP webhook delivery of execution notifications

use crate::core::{ExecutionEvent, ExecutionResult};
use crate::notify::{ExecutionNotifier, ExecutionStart, NotificationKind};
use anyhow::{Context, Result};
use chrono::Utc;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

const USER_AGENT: &str = "netflow-webhook";

/// Response bodies quoted in errors are cut to this many characters
const MAX_ERROR_BODY: usize = 500;

/// Where and how to deliver webhooks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookConfig {
    pub url: String,
    pub timeout: Duration,
}

impl WebhookConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Posts a JSON document to a fixed URL for every lifecycle event
#[derive(Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    config: WebhookConfig,
}

impl WebhookNotifier {
    pub fn new(config: WebhookConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(USER_AGENT)
            .build()
            .context("failed to build webhook HTTP client")?;
        Ok(Self { client, config })
    }

    pub fn url(&self) -> &str {
        &self.config.url
    }

    /// Deliver one payload, failing on transport errors and non-2xx answers
    pub async fn send(&self, kind: NotificationKind, payload: &Value) -> Result<()> {
        debug!("Sending {} webhook to {}", kind, self.config.url);

        let response = self
            .client
            .post(&self.config.url)
            .header("X-Event-Type", kind.as_str())
            .header("X-Timestamp", Utc::now().to_rfc3339())
            .json(payload)
            .send()
            .await
            .with_context(|| format!("webhook delivery to {} failed", self.config.url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body: String = body.chars().take(MAX_ERROR_BODY).collect();
            anyhow::bail!("webhook {} answered {}: {}", self.config.url, status, body);
        }

        info!("Webhook {} delivered to {} ({})", kind, self.config.url, status);
        Ok(())
    }
}

#[async_trait::async_trait]
impl ExecutionNotifier for WebhookNotifier {
    async fn execution_started(&self, start: &ExecutionStart) -> Result<()> {
        self.send(NotificationKind::ExecutionStarted, &started_payload(start))
            .await
    }

    async fn execution_finished(&self, result: &ExecutionResult) -> Result<()> {
        let kind = NotificationKind::for_status(result.status());
        self.send(kind, &finished_payload(kind, result)).await
    }
}

pub fn started_payload(start: &ExecutionStart) -> Value {
    json!({
        "event_id": Uuid::new_v4(),
        "event_type": NotificationKind::ExecutionStarted,
        "timestamp": Utc::now(),
        "workflow": {
            "id": start.workflow_id,
            "name": start.workflow_name,
        },
        "target": start.target,
        "execution": {
            "id": start.execution_id,
            "status": "running",
            "started_at": start.started_at,
        },
    })
}

/// Full report of a finished execution: outcome, every command sent, and
/// the pre/post check diff statistics when available.
pub fn finished_payload(kind: NotificationKind, result: &ExecutionResult) -> Value {
    let commands: Vec<Value> = result
        .log()
        .iter()
        .filter_map(|entry| match &entry.event {
            ExecutionEvent::StepExecuted { exit_code, output } => Some(json!({
                "command": entry.command,
                "stage": entry.stage,
                "step_id": entry.step_id,
                "matched": entry.matched,
                "exit_code": exit_code,
                "output": output,
                "timestamp": entry.timestamp,
            })),
            _ => None,
        })
        .collect();

    let duration_seconds = result.duration().num_milliseconds() as f64 / 1000.0;

    json!({
        "event_id": Uuid::new_v4(),
        "event_type": kind,
        "timestamp": Utc::now(),
        "workflow": {
            "id": result.workflow_id(),
            "name": result.workflow_name(),
        },
        "target": result.target(),
        "execution": {
            "id": result.execution_id(),
            "status": result.status(),
            "failed_stage": result.failed_stage(),
            "failed_step": result.failed_step(),
            "error_message": result.error_message(),
            "started_at": result.started_at(),
            "completed_at": result.completed_at(),
            "duration_seconds": duration_seconds,
        },
        "commands": commands,
        "stages": result.stages(),
        "variables": result.variables(),
        "diff": result.output_diff().map(|diff| diff.stats),
    })
}
