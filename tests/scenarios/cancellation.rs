//! Test: Cancellation - stopping an execution from outside

use crate::helpers::*;
use netflow::{
    DeviceError, ExecutionEvent, ExecutionRequest, ExecutionStatus, ScriptedDevice, StageKind,
};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Cancelled before start: nothing is sent and nothing is rolled back
#[tokio::test]
async fn test_cancel_before_start() {
    let yaml = r#"
name: "Cancelled"
pre_check: ["show version"]
rollback: ["no vlan 100"]
"#;
    let token = CancellationToken::new();
    token.cancel();

    let request = ExecutionRequest::new().with_cancellation(token);
    let (result, device) = run_with(yaml, ScriptedDevice::new(), request).await;

    assert_status(&result, ExecutionStatus::Cancelled);
    assert!(device.sent_commands().is_empty());
    assert!(!result.ran(StageKind::Rollback));
    assert_eq!(result.failed_stage(), Some(StageKind::PreCheck));
    assert_eq!(result.error_message(), Some("execution cancelled"));
    assert!(events(&result)
        .iter()
        .any(|e| matches!(e, ExecutionEvent::ExecutionCancelled)));
}

/// Cancelling interrupts a loop waiting between iterations
#[tokio::test(start_paused = true)]
async fn test_cancel_during_loop_interval() {
    let yaml = r#"
name: "Long wait"
implementation:
  - command: "reload in 5"
    condition:
      type: loop_until_condition
      check_condition: {type: if_output_contains, text: "Reload scheduled"}
      max_iterations: 50
      timeout_seconds: 600
      interval_seconds: 10
      loop_commands: ["show reload"]
rollback: ["reload cancel"]
"#;
    let device = ScriptedDevice::new()
        .respond("reload in 5", "")
        .respond("show reload", "No reload is scheduled.")
        .respond("reload cancel", "");

    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(15)).await;
        canceller.cancel();
    });

    let request = ExecutionRequest::new().with_cancellation(token);
    let (result, device) = run_with(yaml, device, request).await;

    assert_status(&result, ExecutionStatus::Cancelled);
    assert_eq!(result.failed_stage(), Some(StageKind::Implementation));
    // Iterations at 0s and 10s, cancelled while waiting for 20s
    assert_eq!(device.count("show reload"), 2);
    assert_eq!(device.count("reload cancel"), 0);
}

/// A cancel arriving between retries ends the run as cancelled, not failed
#[tokio::test(start_paused = true)]
async fn test_cancel_while_retrying_transport_failure() {
    let yaml = r#"
name: "Unreachable"
pre_check: ["show version"]
implementation: ["vlan 100"]
validation_rules:
  timeout: 10
  retry_count: 5
"#;
    let device = ScriptedDevice::new()
        .fail("show version", DeviceError::Connection("refused".into()))
        .with_delay(Duration::from_secs(1));

    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(1500)).await;
        canceller.cancel();
    });

    let request = ExecutionRequest::new().with_cancellation(token);
    let (result, device) = run_with(yaml, device, request).await;

    assert_status(&result, ExecutionStatus::Cancelled);
    assert_eq!(result.failed_stage(), Some(StageKind::PreCheck));
    assert_eq!(result.error_message(), Some("execution cancelled"));
    // Attempts at 0s and 1s, the second fails after the cancel
    assert_eq!(device.count("show version"), 2);
    assert_eq!(count_retries(&result), 1);
}
