//! Test: Retry Behavior - transport failures are retried, mismatches are not

use crate::helpers::*;
use netflow::device::ScriptedReply;
use netflow::{DeviceError, ExecutionStatus, ScriptedDevice};

fn flaky_version(failures: usize) -> ScriptedDevice {
    let mut replies: Vec<ScriptedReply> = (0..failures)
        .map(|_| ScriptedReply::error(DeviceError::Connection("connection refused".into())))
        .collect();
    replies.push(ScriptedReply::ok("Cisco IOS XE Software, Version 17.3.4"));
    ScriptedDevice::new().script("show version", replies)
}

fn workflow(retry_count: u32) -> String {
    format!(
        r#"
name: "Retry"
pre_check:
  - command: "show version"
    regex_pattern: "IOS XE"
validation_rules:
  timeout: 10
  retry_count: {}
"#,
        retry_count
    )
}

/// A transient connection failure is absorbed by a retry
#[tokio::test]
async fn test_connection_failure_retried() {
    let (result, device) = run(&workflow(1), flaky_version(1)).await;

    assert_status(&result, ExecutionStatus::Completed);
    assert_eq!(device.count("show version"), 2);
    assert_eq!(count_retries(&result), 1);
}

/// Without retries the first failure is final
#[tokio::test]
async fn test_no_retries_by_default() {
    let (result, device) = run(&workflow(0), flaky_version(1)).await;

    assert_status(&result, ExecutionStatus::Aborted);
    assert_eq!(device.count("show version"), 1);
    assert_eq!(count_retries(&result), 0);
    assert!(result.error_message().unwrap().contains("connection refused"));
}

/// retry_count bounds the extra attempts
#[tokio::test]
async fn test_retries_exhausted() {
    let (result, device) = run(&workflow(2), flaky_version(5)).await;

    assert_status(&result, ExecutionStatus::Aborted);
    assert_eq!(device.count("show version"), 3);
    assert_eq!(count_retries(&result), 2);
}

/// A validation mismatch is an answer, not a transport failure
#[tokio::test]
async fn test_mismatch_not_retried() {
    let device = ScriptedDevice::new().respond("show version", "Cisco NX-OS");

    let (result, device) = run(&workflow(3), device).await;

    assert_status(&result, ExecutionStatus::Aborted);
    assert_eq!(device.count("show version"), 1);
    assert_eq!(count_retries(&result), 0);
}

/// Timeouts count as transport failures
#[tokio::test(start_paused = true)]
async fn test_timeout_retried() {
    let yaml = r#"
name: "Slow"
pre_check: ["show tech-support"]
validation_rules:
  timeout: 2
  retry_count: 1
"#;
    let device = ScriptedDevice::new()
        .respond("show tech-support", "...")
        .with_delay(std::time::Duration::from_secs(10));

    let (result, device) = run(yaml, device).await;

    assert_status(&result, ExecutionStatus::Aborted);
    assert_eq!(device.count("show tech-support"), 2);
    assert_eq!(count_retries(&result), 1);
}
