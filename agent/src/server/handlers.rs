//! HTTP request handlers

use std::sync::Arc;

use axum::{extract::State, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};

use crate::server::state::ServerState;
use crate::utils::{version_info, VersionInfo};
use crate::workers::dispatcher::PolicySnapshot;

pub const SERVICE_NAME: &str = "fleetagent";

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// Health check handler
pub async fn health_handler() -> impl IntoResponse {
    let version = version_info();
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: SERVICE_NAME.to_string(),
        version: version.version,
    })
}

/// Version handler
pub async fn version_handler() -> Json<VersionInfo> {
    Json(version_info())
}

/// Agent status response
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub service_state: String,
    pub started_at: String,
    pub pending_tasks: usize,
    pub agent_version: String,
    pub agent_uuid: String,
    pub store_tray_enabled: bool,
    pub remote_support_enabled: bool,
}

/// Agent status handler
pub async fn status_handler(State(state): State<Arc<ServerState>>) -> Json<StatusResponse> {
    let PolicySnapshot {
        store_tray_enabled,
        remote_support_enabled,
    } = state.flags.snapshot();

    Json(StatusResponse {
        service_state: "running".to_string(),
        started_at: state.started_at.to_rfc3339(),
        pending_tasks: state.scheduler.pending_count(),
        agent_version: version_info().version,
        agent_uuid: state.agent_uuid.clone(),
        store_tray_enabled,
        remote_support_enabled,
    })
}
