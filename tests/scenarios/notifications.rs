//! Test: Notifications - webhooks around an execution

use crate::helpers::*;
use axum::{http::HeaderMap, routing::post, Json, Router};
use netflow::device::ScriptedReply;
use netflow::{ExecutionRequest, ExecutionStatus, ScriptedDevice, WebhookConfig, WebhookNotifier};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Webhook endpoint on a local port, forwarding (event type, body) pairs
async fn webhook_endpoint() -> (String, mpsc::UnboundedReceiver<(String, Value)>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let app = Router::new().route(
        "/events",
        post(move |headers: HeaderMap, Json(body): Json<Value>| {
            let tx = tx.clone();
            async move {
                let kind = headers
                    .get("x-event-type")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                let _ = tx.send((kind, body));
            }
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}/events", addr), rx)
}

/// A completed run posts a start and a completion event
#[tokio::test]
async fn test_webhooks_for_completed_run() {
    let (url, mut rx) = webhook_endpoint().await;
    let workflow = load(
        r#"
name: "Add VLAN"
pre_check: ["show vlan brief"]
implementation: ["vlan 100"]
post_check: ["show vlan brief"]
"#,
    );
    let device = ScriptedDevice::new()
        .script(
            "show vlan brief",
            vec![
                ScriptedReply::ok("1 default active"),
                ScriptedReply::ok("1 default active\n100 VLAN0100 active"),
            ],
        )
        .respond("vlan 100", "");
    let (engine, _) = engine(device);
    let engine = engine.with_notifier(Arc::new(
        WebhookNotifier::new(WebhookConfig::new(url)).unwrap(),
    ));

    let result = engine
        .execute(&workflow, ExecutionRequest::new().with_target("core-sw1"))
        .await;
    assert_status(&result, ExecutionStatus::Completed);

    let (kind, started) = rx.recv().await.unwrap();
    assert_eq!(kind, "execution_started");
    assert_eq!(started["execution"]["id"], result.execution_id().to_string());
    assert_eq!(started["target"], "core-sw1");

    let (kind, finished) = rx.recv().await.unwrap();
    assert_eq!(kind, "execution_completed");
    assert_eq!(finished["execution"]["status"], "completed");
    assert_eq!(finished["commands"].as_array().unwrap().len(), 3);
    assert_eq!(finished["diff"]["additions"], 1);
}

/// A rolled back run is reported as failed
#[tokio::test]
async fn test_webhook_for_rolled_back_run() {
    let (url, mut rx) = webhook_endpoint().await;
    let workflow = load(
        r#"
name: "Bad change"
implementation:
  - command: "vlan 5000"
    regex_pattern: "OK"
rollback: ["no vlan 5000"]
"#,
    );
    let device = ScriptedDevice::new()
        .respond("vlan 5000", "% Invalid VLAN")
        .respond("no vlan 5000", "");
    let (engine, _) = engine(device);
    let engine = engine.with_notifier(Arc::new(
        WebhookNotifier::new(WebhookConfig::new(url)).unwrap(),
    ));

    let result = engine.execute(&workflow, ExecutionRequest::new()).await;
    assert_status(&result, ExecutionStatus::RolledBack);

    let (kind, _) = rx.recv().await.unwrap();
    assert_eq!(kind, "execution_started");
    let (kind, finished) = rx.recv().await.unwrap();
    assert_eq!(kind, "execution_failed");
    assert_eq!(finished["execution"]["failed_stage"], "implementation");
    assert_eq!(finished["execution"]["failed_step"]["command"], "vlan 5000");
}
