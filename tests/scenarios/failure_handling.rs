//! Test: Failure Handling - abort, rollback and failed outcomes

use crate::helpers::*;
use netflow::{ExecutionStatus, ScriptedDevice, StageKind, StageStatus};

const VLAN_CHANGE: &str = r#"
name: "VLAN 100"
pre_check:
  - command: "show interface Gi0/1"
    regex_pattern: "is up"
implementation:
  - command: "vlan 100"
    regex_pattern: "% Invalid"
    operator: not_contains
post_check:
  - command: "show vlan brief"
    regex_pattern: "100\\s+VLAN0100\\s+active"
rollback:
  - command: "no vlan 100"
    regex_pattern: "% Invalid"
    operator: not_contains
"#;

/// Switch answering every command of the change, with selected replies replaced
fn switch(overrides: &[(&str, &str)]) -> ScriptedDevice {
    let defaults = [
        ("show interface Gi0/1", "Gi0/1 is up, line protocol is up"),
        ("vlan 100", ""),
        ("show vlan brief", "100  VLAN0100  active  Gi0/2"),
        ("no vlan 100", ""),
    ];

    defaults.iter().fold(ScriptedDevice::new(), |device, (command, output)| {
        let output = overrides
            .iter()
            .find(|(c, _)| c == command)
            .map(|(_, o)| *o)
            .unwrap_or(*output);
        device.respond(*command, output)
    })
}

/// A pre-check mismatch aborts before anything changes
#[tokio::test]
async fn test_precheck_failure_aborts() {
    let device = switch(&[("show interface Gi0/1", "Gi0/1 is down")]);

    let (result, device) = run(VLAN_CHANGE, device).await;

    assert_status(&result, ExecutionStatus::Aborted);
    assert_stages_ran(&result, &[StageKind::PreCheck]);
    assert_eq!(device.count("vlan 100"), 0);
    assert_eq!(device.count("no vlan 100"), 0);

    assert_eq!(result.failed_stage(), Some(StageKind::PreCheck));
    let failed = result.failed_step().unwrap();
    assert_eq!(failed.command, "show interface Gi0/1");
    assert_eq!(failed.position, 0);
    assert!(result.error_message().unwrap().contains("is up"));
}

/// An implementation failure rolls the change back
#[tokio::test]
async fn test_implementation_failure_rolls_back() {
    let device = switch(&[("vlan 100", "% Invalid input detected at '^' marker.")]);

    let (result, device) = run(VLAN_CHANGE, device).await;

    assert_status(&result, ExecutionStatus::RolledBack);
    assert_stages_ran(
        &result,
        &[StageKind::PreCheck, StageKind::Implementation, StageKind::Rollback],
    );
    assert_eq!(device.count("show vlan brief"), 0);
    assert_eq!(device.count("no vlan 100"), 1);
    assert_eq!(result.failed_stage(), Some(StageKind::Implementation));
    assert_eq!(
        result.stage(StageKind::Rollback).unwrap().status,
        StageStatus::Success
    );
}

/// A post-check failure also rolls back
#[tokio::test]
async fn test_postcheck_failure_rolls_back() {
    let device = switch(&[("show vlan brief", "1  default  active  Gi0/2")]);

    let (result, device) = run(VLAN_CHANGE, device).await;

    assert_status(&result, ExecutionStatus::RolledBack);
    assert_eq!(result.failed_stage(), Some(StageKind::PostCheck));
    assert_eq!(device.count("no vlan 100"), 1);
    assert_eq!(result.failed_step().unwrap().command, "show vlan brief");
}

/// A failing rollback leaves the device in an unknown state
#[tokio::test]
async fn test_rollback_failure_is_failed() {
    let device = switch(&[("vlan 100", "% Invalid input"), ("no vlan 100", "% Invalid input")]);

    let (result, _) = run(VLAN_CHANGE, device).await;

    assert_status(&result, ExecutionStatus::Failed);
    // The first failure is the one reported
    assert_eq!(result.failed_stage(), Some(StageKind::Implementation));
    assert_eq!(result.failed_step().unwrap().command, "vlan 100");

    let message = result.error_message().unwrap();
    assert!(message.contains("rollback failed"));
    assert!(!result.status().is_success());
}

/// Steps after the failing one never run
#[tokio::test]
async fn test_first_failure_stops_stage() {
    let yaml = r#"
name: "Stop early"
implementation:
  - "vlan 100"
  - command: "name USERS"
    regex_pattern: "OK"
  - "exit"
"#;
    let device = ScriptedDevice::new()
        .respond("vlan 100", "")
        .respond("name USERS", "% Incomplete command");

    let (result, device) = run(yaml, device).await;

    assert_status(&result, ExecutionStatus::RolledBack);
    assert_eq!(device.count("exit"), 0);
    let implementation = result.stage(StageKind::Implementation).unwrap();
    assert_eq!(implementation.steps_executed, 2);
    assert_eq!(result.failed_step().unwrap().position, 1);
}

/// A device error in the pre-check aborts like a mismatch
#[tokio::test]
async fn test_unscripted_command_aborts() {
    let yaml = r#"
name: "Unknown command"
pre_check: ["show inventory"]
"#;

    let (result, _) = run(yaml, ScriptedDevice::new()).await;

    assert_status(&result, ExecutionStatus::Aborted);
    assert!(result
        .error_message()
        .unwrap()
        .contains("no scripted response"));
}

/// Per-command timeout turns a hung device into a failure
#[tokio::test(start_paused = true)]
async fn test_command_timeout_fails_step() {
    let yaml = r#"
name: "Slow device"
pre_check: ["show tech-support"]
validation_rules:
  timeout: 5
"#;
    let device = ScriptedDevice::new()
        .respond("show tech-support", "...")
        .with_delay(std::time::Duration::from_secs(60));

    let (result, _) = run(yaml, device).await;

    assert_status(&result, ExecutionStatus::Aborted);
    assert!(result.error_message().unwrap().contains("timed out"));
}
