//! Local diagnostics routes

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Body;
use chrono::Utc;
use http::{Request, StatusCode};
use serde_json::json;
use tower::ServiceExt;

use fleetagent::queue::scheduler::{SchedulerOptions, TaskScheduler};
use fleetagent::server::handlers::{HealthResponse, StatusResponse};
use fleetagent::server::serve::router;
use fleetagent::server::state::ServerState;
use fleetagent::workers::dispatcher::{PolicyFlags, STORE_TRAY_ENABLED_KEY};
use openapi_client::models::Command;

fn state() -> Arc<ServerState> {
    Arc::new(ServerState::new(
        "agent-1".to_string(),
        Arc::new(TaskScheduler::new(SchedulerOptions::default())),
        Arc::new(PolicyFlags::default()),
        Utc::now(),
    ))
}

async fn get_json<T: serde::de::DeserializeOwned>(state: Arc<ServerState>, uri: &str) -> T {
    let response = router(state)
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_health() {
    let health: HealthResponse = get_json(state(), "/health").await;
    assert_eq!(health.status, "healthy");
    assert_eq!(health.service, "fleetagent");
}

#[tokio::test]
async fn test_status_reflects_queue_and_policy() {
    let state = state();
    state.scheduler.add_commands(&[
        Command {
            task_id: 1,
            ..Default::default()
        },
        Command {
            task_id: 2,
            ..Default::default()
        },
    ]);
    state.flags.apply(&HashMap::from([(
        STORE_TRAY_ENABLED_KEY.to_string(),
        json!(true),
    )]));

    let status: StatusResponse = get_json(state.clone(), "/status").await;
    assert_eq!(status.service_state, "running");
    assert_eq!(status.pending_tasks, 2);
    assert_eq!(status.agent_uuid, "agent-1");
    assert!(status.store_tray_enabled);
    assert!(!status.remote_support_enabled);
    assert_eq!(status.started_at, state.started_at.to_rfc3339());
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let response = router(state())
        .oneshot(Request::builder().uri("/tasks").body(Body::empty()).unwrap())
        .await;
    let response = tokio_test::assert_ok!(response);
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
