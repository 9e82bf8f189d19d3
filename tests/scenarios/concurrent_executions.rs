//! Test: Concurrent Executions - one engine, isolated runs

use crate::helpers::*;
use netflow::{ExecutionRequest, ExecutionStatus, ScriptedDevice};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

const VLAN_STATE: &str = r#"
name: "VLAN state"
pre_check:
  - command: "show vlan id {{vlan_id}}"
    regex_pattern: "(active|suspended)"
    is_dynamic: true
    store_in_variable: vlan_state
implementation:
  - command: "vlan {{vlan_id}}"
    is_dynamic: true
"#;

/// Two runs sharing an engine keep their own variables and logs
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_parallel_runs_are_isolated() {
    let workflow = Arc::new(load(VLAN_STATE));
    let (engine, device) = engine(
        ScriptedDevice::new()
            .respond("show vlan id 100", "VLAN0100 active")
            .respond("show vlan id 200", "VLAN0200 suspended")
            .respond("vlan 100", "")
            .respond("vlan 200", "")
            .with_delay(Duration::from_millis(20)),
    );
    let engine = Arc::new(engine);

    let handles: Vec<_> = ["100", "200"]
        .into_iter()
        .map(|vlan| {
            let engine = engine.clone();
            let workflow = workflow.clone();
            tokio::spawn(async move {
                let request = ExecutionRequest::new()
                    .with_param("vlan_id", vlan)
                    .with_target(format!("sw-{}", vlan));
                engine.execute(&workflow, request).await
            })
        })
        .collect();

    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap());
    }

    let by_target = |target: &str| {
        results
            .iter()
            .find(|r| r.target() == Some(target))
            .unwrap()
    };
    let first = by_target("sw-100");
    let second = by_target("sw-200");

    assert_status(first, ExecutionStatus::Completed);
    assert_status(second, ExecutionStatus::Completed);
    assert_eq!(first.variables().get("vlan_state").map(String::as_str), Some("active"));
    assert_eq!(second.variables().get("vlan_state").map(String::as_str), Some("suspended"));
    assert_ne!(first.execution_id(), second.execution_id());

    // Each log only mentions its own commands
    let commands = |r: &netflow::ExecutionResult| -> HashSet<String> {
        r.log().iter().filter_map(|e| e.command.clone()).collect()
    };
    assert!(commands(first).iter().all(|c| c.contains("100")));
    assert!(commands(second).iter().all(|c| c.contains("200")));

    assert_eq!(device.sent_commands().len(), 4);
}

/// Sequence numbers restart for every execution
#[tokio::test]
async fn test_log_sequence_per_execution() {
    let workflow = load(VLAN_STATE);
    let (engine, _) = engine(
        ScriptedDevice::new()
            .respond("show vlan id 100", "VLAN0100 active")
            .respond("vlan 100", ""),
    );

    for _ in 0..2 {
        let result = engine
            .execute(&workflow, ExecutionRequest::new().with_param("vlan_id", "100"))
            .await;
        let sequences: Vec<u64> = result.log().iter().map(|e| e.sequence).collect();
        let expected: Vec<u64> = (0..sequences.len() as u64).collect();
        assert_eq!(sequences, expected);
    }
}
