//! Test: Success Chain - every stage passes

use crate::helpers::*;
use netflow::device::ScriptedReply;
use netflow::{ExecutionStatus, ScriptedDevice, StageKind, StageStatus};

/// A matching pre-check lets the change go ahead
#[tokio::test]
async fn test_precheck_match_runs_implementation() {
    let yaml = r#"
name: "Interface description"
pre_check:
  - command: "show interface Gi0/1"
    regex_pattern: "up"
    operator: contains
implementation:
  - "interface Gi0/1 description uplink"
post_check:
  - command: "show interface Gi0/1 description"
    regex_pattern: "uplink"
"#;

    let device = ScriptedDevice::new()
        .respond("show interface Gi0/1", "Gi0/1 is up")
        .respond("interface Gi0/1 description uplink", "")
        .respond("show interface Gi0/1 description", "Gi0/1 up up uplink");

    let (result, device) = run(yaml, device).await;

    assert_status(&result, ExecutionStatus::Completed);
    assert_stages_ran(
        &result,
        &[StageKind::PreCheck, StageKind::Implementation, StageKind::PostCheck],
    );
    assert_eq!(device.count("interface Gi0/1 description uplink"), 1);
    assert!(result.stages().iter().all(|s| s.status == StageStatus::Success));
    assert!(result.failed_stage().is_none());
    assert!(result.error_message().is_none());
}

/// Steps without a pattern pass whatever the device prints
#[tokio::test]
async fn test_steps_without_pattern_always_pass() {
    let yaml = r#"
name: "Save config"
implementation:
  - "copy running-config startup-config"
  - "write memory"
"#;

    let device = ScriptedDevice::new()
        .respond("copy running-config startup-config", "% Warning: something odd")
        .respond_with_exit_code("write memory", "", 0);

    let (result, device) = run(yaml, device).await;

    assert_status(&result, ExecutionStatus::Completed);
    assert_eq!(
        device.sent_commands(),
        vec![
            "copy running-config startup-config".to_string(),
            "write memory".to_string()
        ]
    );
    let implementation = result.stage(StageKind::Implementation).unwrap();
    assert_eq!(implementation.steps_executed, 2);
}

/// An empty workflow completes without touching the device
#[tokio::test]
async fn test_empty_workflow_completes() {
    let (result, device) = run("name: \"Nothing to do\"\n", ScriptedDevice::new()).await;

    assert_status(&result, ExecutionStatus::Completed);
    assert!(device.sent_commands().is_empty());
    assert!(!result.ran(StageKind::Rollback));
}

/// Operators other than contains
#[tokio::test]
async fn test_equal_and_not_contains_operators() {
    let yaml = r#"
name: "Operators"
pre_check:
  - command: "show running-config | include hostname"
    regex_pattern: "hostname core-sw1"
    operator: equal
  - command: "show logging | include %SYS-2"
    regex_pattern: "%SYS-2"
    operator: not_contains
  - command: "show vtp status | include Mode"
    regex_pattern: "transparent"
    operator: not_equal
"#;

    let device = ScriptedDevice::new()
        .respond("show running-config | include hostname", "hostname core-sw1\n")
        .respond("show logging | include %SYS-2", "")
        .respond("show vtp status | include Mode", "VTP Operating Mode : Server");

    let (result, _) = run(yaml, device).await;

    assert_status(&result, ExecutionStatus::Completed);
}

/// Workflows load from JSON as emitted by the builder
#[tokio::test]
async fn test_builder_json_document() {
    let json = r#"{
        "name": "JSON workflow",
        "pre_check_commands": [{"command": "show version", "regex_pattern": "IOS", "operator": "contains"}],
        "implementation_commands": ["vlan 100"],
        "post_check_commands": [],
        "rollback_commands": ["no vlan 100"],
        "validation_rules": {"timeout": 10, "retry_count": 1}
    }"#;

    let workflow = netflow::WorkflowConfig::from_json(json)
        .unwrap()
        .to_workflow()
        .unwrap();
    assert_eq!(workflow.validation.retry_count, 1);

    let (engine, device) = engine(
        ScriptedDevice::new()
            .respond("show version", "Cisco IOS XE")
            .respond("vlan 100", ""),
    );
    let result = engine
        .execute(&workflow, netflow::ExecutionRequest::new())
        .await;

    assert_status(&result, ExecutionStatus::Completed);
    assert_eq!(device.count("no vlan 100"), 0);
}

/// Post-check output is compared with the pre-check output
#[tokio::test]
async fn test_pre_post_diff_attached_to_result() {
    let yaml = r#"
name: "Add VLAN"
pre_check: ["show vlan brief"]
implementation: ["vlan 100"]
post_check: ["show vlan brief"]
"#;
    let device = ScriptedDevice::new()
        .script(
            "show vlan brief",
            vec![
                ScriptedReply::ok("1    default    active\n"),
                ScriptedReply::ok("1    default    active\n100  VLAN0100   active\n"),
            ],
        )
        .respond("vlan 100", "");

    let (result, _) = run(yaml, device).await;

    assert_status(&result, ExecutionStatus::Completed);
    let diff = result.output_diff().unwrap();
    assert_eq!(diff.stats.additions, 1);
    assert_eq!(diff.stats.deletions, 0);
    assert!(diff.unified.contains("+100  VLAN0100   active\n"));
    assert!(result.transcript(StageKind::PreCheck).starts_with("! Command: show vlan brief\n"));
}

/// Without a post-check there is nothing to compare
#[tokio::test]
async fn test_no_diff_when_post_check_skipped() {
    let yaml = r#"
name: "Blocked"
pre_check:
  - command: "show version"
    regex_pattern: "IOS XE"
post_check: ["show version"]
"#;
    let device = ScriptedDevice::new().respond("show version", "NX-OS");

    let (result, _) = run(yaml, device).await;

    assert_status(&result, ExecutionStatus::Aborted);
    assert!(result.output_diff().is_none());
}
