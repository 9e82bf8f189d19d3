//! Test: Loop Until - bounded polling with success and failure continuations

use crate::helpers::*;
use netflow::core::{Branch, LoopExit};
use netflow::{ExecutionStatus, ScriptedDevice, StageKind};

const BGP_CONVERGENCE: &str = r#"
name: "BGP convergence"
post_check:
  - command: "show bgp summary"
    condition:
      type: loop_until_condition
      check_condition:
        type: if_regex_matches
        pattern: "^ready"
      max_iterations: 3
      timeout_seconds: 60
      loop_commands: ["show bgp status"]
      on_failure: ["show logging last 20"]
"#;

/// The loop gives up after max_iterations and runs its failure commands
#[tokio::test]
async fn test_loop_exhausts_after_max_iterations() {
    let device = ScriptedDevice::new()
        .respond("show bgp summary", "BGP table version is 5")
        .respond("show bgp status", "not ready")
        .respond("show logging last 20", "%BGP-5-ADJCHANGE: neighbor 10.0.0.2 Down");

    let (result, device) = run(BGP_CONVERGENCE, device).await;

    assert_eq!(device.count("show bgp status"), 3);
    assert_eq!(device.count("show logging last 20"), 1);
    assert_eq!(loop_exits(&result), vec![(LoopExit::MaxIterations, 3)]);
    assert_eq!(branches(&result), vec![Branch::LoopExhausted]);

    // Passing failure commands keep the stage alive
    assert_status(&result, ExecutionStatus::Completed);
}

/// A failure command that does not validate fails the stage
#[tokio::test]
async fn test_failing_failure_command_triggers_rollback() {
    let yaml = r#"
name: "BGP convergence"
post_check:
  - command: "show bgp summary"
    condition:
      type: loop_until_condition
      check_condition: {type: if_output_contains, text: "Established"}
      max_iterations: 2
      timeout_seconds: 60
      loop_commands: ["show bgp neighbor 10.0.0.2 | include state"]
      on_failure:
        - command: "show bgp neighbor 10.0.0.2 | include Last reset"
          regex_pattern: "never"
rollback:
  - "no router bgp 65000"
"#;
    let device = ScriptedDevice::new()
        .respond("show bgp summary", "")
        .respond("show bgp neighbor 10.0.0.2 | include state", "BGP state = Idle")
        .respond("show bgp neighbor 10.0.0.2 | include Last reset", "Last reset 00:00:10, due to BGP Notification")
        .respond("no router bgp 65000", "");

    let (result, device) = run(yaml, device).await;

    assert_status(&result, ExecutionStatus::RolledBack);
    assert_eq!(result.failed_stage(), Some(StageKind::PostCheck));
    assert_eq!(
        result.failed_step().unwrap().command,
        "show bgp neighbor 10.0.0.2 | include Last reset"
    );
    assert_eq!(device.count("no router bgp 65000"), 1);
}

/// The loop stops as soon as its check holds
#[tokio::test]
async fn test_loop_satisfied_on_third_iteration() {
    let device = ScriptedDevice::new()
        .respond("show bgp summary", "BGP table version is 5")
        .respond_sequence("show bgp status", vec!["not ready", "not ready", "ready"])
        .respond("show logging last 20", "");

    let (result, device) = run(BGP_CONVERGENCE, device).await;

    assert_status(&result, ExecutionStatus::Completed);
    assert_eq!(device.count("show bgp status"), 3);
    assert_eq!(device.count("show logging last 20"), 0);
    assert_eq!(loop_exits(&result), vec![(LoopExit::Satisfied, 3)]);
    assert_eq!(branches(&result), vec![Branch::LoopSucceeded]);
}

/// The timeout bounds the loop even when max_iterations is generous
#[tokio::test(start_paused = true)]
async fn test_loop_timeout() {
    let yaml = r#"
name: "Wait for link"
implementation:
  - command: "interface Gi0/1 no shutdown"
    condition:
      type: loop_until_condition
      check_condition: {type: if_output_contains, text: "line protocol is up"}
      max_iterations: 100
      timeout_seconds: 30
      interval_seconds: 10
      loop_commands: ["show interface Gi0/1 | include protocol"]
"#;
    let device = ScriptedDevice::new()
        .respond("interface Gi0/1 no shutdown", "")
        .respond("show interface Gi0/1 | include protocol", "Gi0/1 is down, line protocol is down");

    let (result, device) = run(yaml, device).await;

    assert_eq!(loop_exits(&result), vec![(LoopExit::Timeout, 3)]);
    assert_eq!(device.count("show interface Gi0/1 | include protocol"), 3);
    // No failure commands, so the exhausted loop is not fatal
    assert_status(&result, ExecutionStatus::Completed);
}

/// Without loop commands the originating command is polled
#[tokio::test]
async fn test_empty_loop_commands_poll_origin() {
    let yaml = r#"
name: "Poll origin"
pre_check:
  - command: "show bgp neighbor 10.0.0.2 | include state"
    condition:
      type: loop_until_condition
      check_condition: {type: if_output_contains, text: "Established"}
      max_iterations: 5
      timeout_seconds: 60
"#;
    let device = ScriptedDevice::new().respond_sequence(
        "show bgp neighbor 10.0.0.2 | include state",
        vec!["BGP state = Idle", "BGP state = Active", "BGP state = Established"],
    );

    let (result, device) = run(yaml, device).await;

    assert_status(&result, ExecutionStatus::Completed);
    // Initial run plus two polls
    assert_eq!(device.count("show bgp neighbor 10.0.0.2 | include state"), 3);
    assert_eq!(loop_exits(&result), vec![(LoopExit::Satisfied, 2)]);
}

/// A satisfied loop hands over to its nested loop, then runs commands
#[tokio::test]
async fn test_nested_loop_then_run_commands() {
    let yaml = r#"
name: "Soft reset"
implementation:
  - command: "clear ip bgp 10.0.0.2 soft"
    condition:
      type: loop_until_condition
      check_condition: {type: if_output_contains, text: "Established"}
      max_iterations: 5
      timeout_seconds: 60
      loop_commands: ["show bgp neighbor 10.0.0.2 | include state"]
      loop_success_action:
        action: nested_loop
        loop:
          check_condition: {type: if_output_contains, text: "10.1.0.0/16"}
          max_iterations: 3
          timeout_seconds: 60
          loop_commands: ["show ip route bgp"]
          loop_success_action:
            action: run_commands
            commands: ["write memory"]
"#;
    let device = ScriptedDevice::new()
        .respond("clear ip bgp 10.0.0.2 soft", "")
        .respond_sequence(
            "show bgp neighbor 10.0.0.2 | include state",
            vec!["BGP state = Idle", "BGP state = Established"],
        )
        .respond_sequence("show ip route bgp", vec!["", "B 10.1.0.0/16 [20/0] via 10.0.0.2"])
        .respond("write memory", "[OK]");

    let (result, device) = run(yaml, device).await;

    assert_status(&result, ExecutionStatus::Completed);
    assert_eq!(
        loop_exits(&result),
        vec![(LoopExit::Satisfied, 2), (LoopExit::Satisfied, 2)]
    );
    assert_eq!(branches(&result), vec![Branch::LoopSucceeded]);
    assert_eq!(device.count("write memory"), 1);
    assert_eq!(device.sent_commands().last().map(String::as_str), Some("write memory"));
}

/// complete_workflow finishes successfully without the remaining stages
#[tokio::test]
async fn test_complete_workflow_skips_remaining_stages() {
    let json = r#"{
        "name": "Already converged",
        "implementation": [
            {
                "command": "show bgp summary",
                "condition": {
                    "type": "loop_until_condition",
                    "checkCondition": {"type": "output_contains", "text": "Established"},
                    "maxIterations": 2,
                    "timeoutSeconds": 10,
                    "successAction": {"action": "complete_workflow"}
                }
            },
            "router bgp 65000"
        ],
        "post_check": ["show bgp neighbors"]
    }"#;
    let workflow = netflow::WorkflowConfig::from_json(json)
        .unwrap()
        .to_workflow()
        .unwrap();
    let (engine, device) = engine(
        ScriptedDevice::new().respond("show bgp summary", "10.0.0.2 4 65001 Established"),
    );

    let result = engine
        .execute(&workflow, netflow::ExecutionRequest::new())
        .await;

    assert_status(&result, ExecutionStatus::Completed);
    assert_stages_ran(&result, &[StageKind::PreCheck, StageKind::Implementation]);
    assert_eq!(device.count("router bgp 65000"), 0);
    assert_eq!(device.count("show bgp neighbors"), 0);
}
