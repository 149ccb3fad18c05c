//! Integration tests for the control API, driven through the router
//! without binding a socket.

mod common;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use common::fixtures::{ScriptedUnit, TestStack};
use orchestrator::services::heartbeat::HeartbeatSettings;
use orchestrator::services::{HeartbeatUnit, ServiceUnit, UnitHooks, UnitOptions};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

async fn send(stack: &TestStack, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = stack.router().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn stack_with_heartbeat() -> TestStack {
    let stack = TestStack::with_units(
        vec![("worker", Arc::new(ScriptedUnit::new()) as Arc<dyn UnitHooks>)],
        60,
        Duration::from_secs(1),
    )
    .await;

    let heartbeat = ServiceUnit::new(
        "heartbeat",
        Arc::new(HeartbeatUnit::new(HeartbeatSettings::default())),
        stack.scheduler.clone(),
        UnitOptions {
            kind: "heartbeat".to_string(),
            ..UnitOptions::default()
        },
    );
    stack
        .manager
        .register_service("heartbeat", heartbeat)
        .await
        .unwrap();
    stack
}

#[tokio::test]
async fn test_status_map_shape() {
    let stack = stack_with_heartbeat().await;
    stack.manager.start_service("worker").await;

    let (status, body) = send(&stack, "GET", "/api/status", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["worker"]["running"], true);
    assert_eq!(body["worker"]["healthy"], true);
    assert_eq!(body["worker"]["error_count"], 0);
    assert!(body["worker"]["last_error"].is_null());
    assert_eq!(body["heartbeat"]["running"], false);
    assert!(body["worker"].get("uptime_seconds").is_some());
}

#[tokio::test]
async fn test_list_and_get_service() {
    let stack = stack_with_heartbeat().await;

    let (status, body) = send(&stack, "GET", "/api/services", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["heartbeat"]["kind"], "heartbeat");

    let (status, body) = send(&stack, "GET", "/api/services/heartbeat", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], "heartbeat");
    assert_eq!(body["data"]["message"], "alive");
    assert_eq!(body["data"]["config_overrides"], json!([]));

    let (status, body) = send(&stack, "GET", "/api/services/missing", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_start_stop_restart_endpoints() {
    let stack = stack_with_heartbeat().await;

    let (status, body) = send(&stack, "POST", "/api/services/worker/start", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert!(stack.manager.get_service("worker").await.unwrap().is_running());

    let (_, body) = send(&stack, "POST", "/api/services/worker/restart", None).await;
    assert_eq!(body["success"], true);
    assert!(stack.manager.get_service("worker").await.unwrap().is_running());

    let (_, body) = send(&stack, "POST", "/api/services/worker/stop", None).await;
    assert_eq!(body["success"], true);
    assert!(!stack.manager.get_service("worker").await.unwrap().is_running());

    let (status, body) = send(&stack, "POST", "/api/services/missing/start", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_failed_start_reports_failure() {
    let stack = TestStack::with_units(
        vec![(
            "broken",
            Arc::new(ScriptedUnit::new().failing_start("bad credentials")) as Arc<dyn UnitHooks>,
        )],
        60,
        Duration::from_secs(1),
    )
    .await;

    let (status, body) = send(&stack, "POST", "/api/services/broken/start", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_slow_start_is_accepted_while_in_progress() {
    let stack = TestStack::with_units(
        vec![(
            "slow",
            Arc::new(ScriptedUnit::new().slow_start(Duration::from_secs(4))) as Arc<dyn UnitHooks>,
        )],
        60,
        Duration::from_secs(1),
    )
    .await;

    let (status, body) = send(&stack, "POST", "/api/services/slow/start", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert!(body["message"].as_str().unwrap().contains("in progress"));
}

#[tokio::test]
async fn test_config_update_applies_and_persists() {
    let stack = stack_with_heartbeat().await;

    let (status, body) = send(
        &stack,
        "POST",
        "/api/services/heartbeat/config",
        Some(json!({"message": "still here", "interval_seconds": 0, "colour": "red"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"]["success"], true);
    assert_eq!(body["interval_seconds"]["success"], false);
    assert_eq!(body["colour"]["success"], false);
    assert!(body["colour"]["error"].is_string());

    let stored = stack.database.get_unit_config("heartbeat").await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].key, "message");
    assert_eq!(stored[0].value, json!("still here"));

    let (_, body) = send(&stack, "GET", "/api/services/heartbeat", None).await;
    assert_eq!(body["data"]["message"], "still here");

    let (status, _) = send(
        &stack,
        "POST",
        "/api/services/missing/config",
        Some(json!({"message": "x"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_scheduler_job_endpoints() {
    let stack = stack_with_heartbeat().await;
    stack.manager.start_service("worker").await;

    let (status, body) = send(&stack, "GET", "/api/scheduler/jobs", None).await;
    assert_eq!(status, StatusCode::OK);
    let jobs = body["data"].as_array().unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0]["id"], "unit:worker");

    let (status, body) = send(&stack, "POST", "/api/scheduler/jobs/unit:worker/pause", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["paused"], true);
    assert!(body["data"]["next_run_time"].is_null());

    let (_, body) = send(&stack, "POST", "/api/scheduler/jobs/unit:worker/resume", None).await;
    assert_eq!(body["data"]["paused"], false);
    assert!(body["data"]["next_run_time"].is_string());

    let (status, _) = send(&stack, "POST", "/api/scheduler/jobs/nope/pause", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_rate_limiter_endpoints() {
    let stack = stack_with_heartbeat().await;
    let limiter = stack.limiters.get("remote-api").unwrap();
    limiter.register_error(None);

    let (status, body) = send(&stack, "GET", "/api/rate-limiters", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["remote-api"]["errors"], 1);

    let (status, body) = send(&stack, "POST", "/api/rate-limiters/remote-api/reset", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["errors"], 0);
    assert_eq!(limiter.current_rate(), 10.0);

    let (status, _) = send(&stack, "POST", "/api/rate-limiters/unknown/reset", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_health_history_endpoints() {
    let stack = stack_with_heartbeat().await;

    let (status, _) = send(&stack, "GET", "/api/health/latest", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let dir = tempfile::TempDir::new().unwrap();
    let mut config = (*stack.config).clone();
    config.status_file = dir.path().join("status.json").display().to_string();
    let monitor =
        orchestrator::HealthMonitor::new(&config, stack.manager.clone(), stack.database.clone());

    monitor.check_once().await.unwrap();
    monitor.check_once().await.unwrap();

    let (status, body) = send(&stack, "GET", "/api/health/latest", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 2);

    let (_, body) = send(&stack, "GET", "/api/health/history?limit=1", None).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (status, _) = send(&stack, "GET", "/api/health/history?limit=0", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
