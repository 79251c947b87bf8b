use std::collections::HashMap;
use std::time::Duration;

use axum::extract::Query;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use third_eye_shell_lib::agent_client::{AgentApi, AgentClient};
use third_eye_shell_lib::error::AgentError;
use third_eye_shell_lib::types::AgentConfigUpdate;

async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

async fn logs(Query(query): Query<HashMap<String, String>>) -> Json<Value> {
    let level = query.get("level").cloned().unwrap_or_else(|| "ALL".into());
    let limit = query.get("limit").cloned().unwrap_or_default();
    Json(json!({
        "logs": [{ "timestamp": "2024-01-01T00:00:00Z", "level": level, "message": format!("limit={}", limit) }]
    }))
}

async fn config(Json(body): Json<Value>) -> Json<Value> {
    if body["interval"] == 42 {
        return Json(json!({ "ok": false, "error": "collector busy" }));
    }
    Json(body)
}

fn agent() -> Router {
    Router::new()
        .route("/api/status", get(|| async { Json(json!({ "cpu_usage_percent": 12.5 })) }))
        .route(
            "/api/alerts",
            get(|| async {
                Json(json!({
                    "active": [{
                        "type": "cpu_high",
                        "severity": "warning",
                        "message": "CPU usage 95.0% above 90.0%",
                        "timestamp": "2024-01-01T00:00:05Z",
                        "value": 95.0,
                        "threshold": 90.0,
                        "active": true
                    }],
                    "history": []
                }))
            }),
        )
        .route("/api/logs", get(logs))
        .route("/api/config", post(config))
        .route(
            "/slow/api/status",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(2)).await;
                Json(json!({}))
            }),
        )
}

fn update(interval: u32) -> AgentConfigUpdate {
    AgentConfigUpdate {
        interval,
        log_level: "debug".into(),
        cpu_threshold: Some(80.0),
        memory_threshold: None,
        collect_threshold: Some(2.0),
    }
}

#[tokio::test]
async fn reads_status_and_active_alerts() {
    let client = AgentClient::new(serve(agent()).await);

    let status = client.status(Duration::from_secs(1)).await.unwrap();
    assert_eq!(status["cpu_usage_percent"], 12.5);

    let active = client.active_alerts(Duration::from_secs(1)).await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].alert_type, "cpu_high");
    assert_eq!(active[0].timestamp, "2024-01-01T00:00:05Z");
}

#[tokio::test]
async fn log_query_omits_empty_level() {
    let client = AgentClient::new(serve(agent()).await);

    let filtered = client.logs(Some("DEBUG"), 50).await.unwrap();
    assert_eq!(filtered.logs[0].level, "DEBUG");
    assert_eq!(filtered.logs[0].message, "limit=50");

    let all = client.logs(Some(""), 500).await.unwrap();
    assert_eq!(all.logs[0].level, "ALL");
}

#[tokio::test]
async fn config_is_echoed_or_rejected() {
    let client = AgentClient::new(serve(agent()).await);

    let echoed = client.apply_config(&update(5)).await.unwrap();
    assert_eq!(echoed["interval"], 5);
    assert_eq!(echoed["log_level"], "debug");
    assert!(echoed.get("memory_threshold").is_none());

    match client.apply_config(&update(42)).await {
        Err(AgentError::Rejected(reason)) => assert_eq!(reason, "collector busy"),
        other => panic!("expected rejection, got {:?}", other),
    }
}

#[tokio::test]
async fn invalid_config_never_reaches_the_agent() {
    // Nothing listens here; a request would fail with an HTTP error instead.
    let client = AgentClient::new("http://127.0.0.1:9");

    assert!(matches!(
        client.apply_config(&update(0)).await,
        Err(AgentError::InvalidConfig(_))
    ));

    let mut bad_level = update(5);
    bad_level.log_level = "trace".into();
    assert!(matches!(
        client.apply_config(&bad_level).await,
        Err(AgentError::InvalidConfig(_))
    ));
}

#[tokio::test]
async fn slow_agent_times_out() {
    let base = serve(agent()).await;
    let client = AgentClient::new(format!("{}/slow", base));

    match client.status(Duration::from_millis(200)).await {
        Err(AgentError::Timeout(ms)) => assert_eq!(ms, 200),
        other => panic!("expected timeout, got {:?}", other),
    }
}

#[tokio::test]
async fn unreachable_agent_is_an_http_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = AgentClient::new(format!("http://{}", addr));
    let result = client.status(Duration::from_secs(1)).await;
    assert!(matches!(result, Err(AgentError::Http(_))));
    assert!(client.alerts(Duration::from_secs(1)).await.is_err());
}
