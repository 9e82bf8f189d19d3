//! Test utility functions for workflow scenarios

use netflow::core::{Branch, LoopExit};
use netflow::{
    ExecutionEngine, ExecutionEvent, ExecutionRequest, ExecutionResult, ExecutionStatus,
    ScriptedDevice, StageKind, WorkflowConfig, WorkflowDefinition,
};
use std::sync::Arc;

/// Parse and validate a YAML workflow document
pub fn load(yaml: &str) -> WorkflowDefinition {
    WorkflowConfig::from_yaml(yaml)
        .expect("workflow parses")
        .to_workflow()
        .expect("workflow is valid")
}

/// Engine around a scripted device, keeping a handle for inspection
pub fn engine(device: ScriptedDevice) -> (ExecutionEngine<ScriptedDevice>, Arc<ScriptedDevice>) {
    let device = Arc::new(device);
    (ExecutionEngine::from_shared(device.clone()), device)
}

/// Run a workflow once with default request settings
pub async fn run(yaml: &str, device: ScriptedDevice) -> (ExecutionResult, Arc<ScriptedDevice>) {
    run_with(yaml, device, ExecutionRequest::new()).await
}

pub async fn run_with(
    yaml: &str,
    device: ScriptedDevice,
    request: ExecutionRequest,
) -> (ExecutionResult, Arc<ScriptedDevice>) {
    let workflow = load(yaml);
    let (engine, device) = engine(device);
    let result = engine.execute(&workflow, request).await;
    (result, device)
}

pub fn assert_status(result: &ExecutionResult, expected: ExecutionStatus) {
    assert_eq!(
        result.status(),
        expected,
        "unexpected status, summary: {}",
        result.summary()
    );
}

/// Assert exactly these stages ran, in this order
pub fn assert_stages_ran(result: &ExecutionResult, expected: &[StageKind]) {
    let ran: Vec<StageKind> = result.stages().iter().map(|s| s.stage).collect();
    assert_eq!(ran, expected);
}

pub fn events(result: &ExecutionResult) -> Vec<&ExecutionEvent> {
    result.log().iter().map(|e| &e.event).collect()
}

/// Branches chosen by conditions, in order
pub fn branches(result: &ExecutionResult) -> Vec<Branch> {
    events(result)
        .into_iter()
        .filter_map(|e| match e {
            ExecutionEvent::ConditionEvaluated { branch, .. } => Some(*branch),
            _ => None,
        })
        .collect()
}

/// (exit, iterations) of every finished loop, in order
pub fn loop_exits(result: &ExecutionResult) -> Vec<(LoopExit, u32)> {
    events(result)
        .into_iter()
        .filter_map(|e| match e {
            ExecutionEvent::LoopFinished { exit, iterations } => Some((*exit, *iterations)),
            _ => None,
        })
        .collect()
}

pub fn count_retries(result: &ExecutionResult) -> usize {
    events(result)
        .into_iter()
        .filter(|e| matches!(e, ExecutionEvent::RetryScheduled { .. }))
        .count()
}
