//! Control server API client tests

use std::sync::Arc;
use std::time::Duration;

use mockito::Matcher;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use fleetagent::errors::AgentError;
use fleetagent::http::agent::{task_status_path, HEARTBEAT_PATH};
use fleetagent::http::client::HttpClient;
use fleetagent::queue::scheduler::TaskReporter;
use fleetagent::report::{ReporterOptions, StatusReporter};
use fleetagent::workers::poller::PollResult;
use openapi_client::models::{HeartbeatRequest, TaskStatusRequest, STATUS_FAILED, STATUS_SUCCESS};

fn client(url: &str) -> HttpClient {
    HttpClient::new(url, fleetagent::storage::identity::AgentIdentity::new("agent-1", "s3cret"))
        .unwrap()
}

#[tokio::test]
async fn test_heartbeat_returns_commands_and_policy() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", HEARTBEAT_PATH)
        .match_header("X-Agent-UUID", "agent-1")
        .match_header("X-Agent-Secret", "s3cret")
        .match_body(Matcher::PartialJson(json!({
            "hostname": "ws-01",
            "current_status": "Idle",
            "apps_changed": false,
        })))
        .with_status(200)
        .with_body(
            json!({
                "status": "ok",
                "server_time": "2026-02-14T22:00:00Z",
                "config": {"store_tray_enabled": true},
                "commands": [
                    {"task_id": 9, "app_id": 3, "download_url": "/api/v1/files/3", "priority": 1}
                ]
            })
            .to_string(),
        )
        .create_async()
        .await;

    let request = HeartbeatRequest {
        hostname: "ws-01".to_string(),
        current_status: "Idle".to_string(),
        ..Default::default()
    };
    let response = client(&server.url()).heartbeat(&request).await.unwrap();
    mock.assert_async().await;

    let result = PollResult::from_response(response);
    assert_eq!(result.server_time.to_rfc3339(), "2026-02-14T22:00:00+00:00");
    assert_eq!(result.config["store_tray_enabled"], json!(true));
    assert_eq!(result.commands.len(), 1);
    assert_eq!(result.commands[0].task_id, 9);
    assert_eq!(result.commands[0].download_url, "/api/v1/files/3");
}

#[tokio::test]
async fn test_heartbeat_with_null_fields_keeps_commands() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", HEARTBEAT_PATH)
        .with_status(200)
        .with_body(
            r#"{"status": "ok", "server_time": "2026-02-14T09:30:00Z", "config": null,
                "commands": [{"task_id": 4, "app_id": 1, "app_version": "2.0",
                              "install_args": null, "file_hash": null}]}"#,
        )
        .create_async()
        .await;

    let response = client(&server.url())
        .heartbeat(&HeartbeatRequest::default())
        .await
        .unwrap();

    let result = PollResult::from_response(response);
    assert!(result.config.is_empty());
    assert_eq!(result.commands.len(), 1);
    assert_eq!(result.commands[0].task_id, 4);
    assert!(result.commands[0].install_args.is_empty());
}

#[tokio::test]
async fn test_task_status_always_carries_exit_code() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", task_status_path(42).as_str())
        .match_header("X-Agent-UUID", "agent-1")
        .match_body(Matcher::PartialJson(json!({
            "status": "success",
            "progress": 100,
            "exit_code": 0,
            "installed_version": "1.2.3",
        })))
        .with_status(200)
        .with_body(r#"{"status":"ok"}"#)
        .create_async()
        .await;

    let request = TaskStatusRequest {
        status: STATUS_SUCCESS.to_string(),
        progress: 100,
        message: "Installation completed successfully".to_string(),
        exit_code: 0,
        installed_version: "1.2.3".to_string(),
        ..Default::default()
    };
    let ack = client(&server.url())
        .report_task_status(42, &request)
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(ack.status, "ok");
}

#[tokio::test]
async fn test_error_body_detail_is_surfaced() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", HEARTBEAT_PATH)
        .with_status(403)
        .with_body(r#"{"status":"error","detail":"agent disabled"}"#)
        .create_async()
        .await;

    let err = client(&server.url())
        .heartbeat(&HeartbeatRequest::default())
        .await
        .unwrap_err();

    match err {
        AgentError::ApiError { status, detail, method, .. } => {
            assert_eq!(status, 403);
            assert_eq!(detail, "agent disabled");
            assert_eq!(method, "POST");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_reporter_retries_until_attempts_run_out() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", task_status_path(7).as_str())
        .with_status(500)
        .with_body("boom")
        .expect(3)
        .create_async()
        .await;

    let reporter = StatusReporter::new(
        Arc::new(client(&server.url())),
        ReporterOptions {
            max_attempts: 3,
            backoff_step: Duration::from_millis(10),
        },
    );
    let status = TaskStatusRequest {
        status: STATUS_FAILED.to_string(),
        exit_code: -1,
        message: "download failed: 404".to_string(),
        error: Some("download failed: 404".to_string()),
        ..Default::default()
    };

    let err = reporter
        .report(7, status, &CancellationToken::new())
        .await
        .unwrap_err();

    mock.assert_async().await;
    assert!(matches!(err, AgentError::ApiError { status: 500, .. }));
}
