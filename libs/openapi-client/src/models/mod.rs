//! API models

use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize};

/// Treat an explicit `null` like a missing key
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A deployment command issued by the control server
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Command {
    #[serde(deserialize_with = "null_as_default")]
    pub task_id: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub action: String,
    #[serde(deserialize_with = "null_as_default")]
    pub app_id: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub app_name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub app_version: String,
    #[serde(deserialize_with = "null_as_default")]
    pub download_url: String,
    #[serde(deserialize_with = "null_as_default")]
    pub file_hash: String,
    #[serde(deserialize_with = "null_as_default")]
    pub file_size_bytes: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub install_args: String,
    #[serde(deserialize_with = "null_as_default")]
    pub force_update: bool,
    /// Lower value runs first
    #[serde(deserialize_with = "null_as_default")]
    pub priority: i32,
}

/// Installed application version reported through the heartbeat
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledApp {
    pub app_id: i64,
    pub version: String,
}

/// Terminal status of one task attempt
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStatusRequest {
    /// "success" or "failed"
    pub status: String,

    /// 0 or 100
    pub progress: u8,

    pub message: String,

    /// Always serialized so the server can tell "0" from "unknown"
    pub exit_code: i32,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub installed_version: String,

    #[serde(default, skip_serializing_if = "is_zero")]
    pub download_duration_sec: u64,

    #[serde(default, skip_serializing_if = "is_zero")]
    pub install_duration_sec: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn is_zero(value: &u64) -> bool {
    *value == 0
}

pub const STATUS_SUCCESS: &str = "success";
pub const STATUS_FAILED: &str = "failed";

/// Task status acknowledgement
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskStatusResponse {
    #[serde(default)]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Periodic heartbeat sent by the agent
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    pub hostname: String,
    pub ip_address: String,
    pub os_user: String,
    pub agent_version: String,
    pub disk_free_gb: u64,
    pub cpu_usage: f32,
    pub ram_usage: f32,
    pub current_status: String,
    pub apps_changed: bool,
    pub installed_apps: Vec<InstalledApp>,
}

/// Heartbeat response carrying new commands and server policy
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatResponse {
    #[serde(deserialize_with = "null_as_default")]
    pub status: String,
    #[serde(deserialize_with = "null_as_default")]
    pub server_time: String,
    #[serde(deserialize_with = "null_as_default")]
    pub config: HashMap<String, serde_json::Value>,
    #[serde(deserialize_with = "null_as_default")]
    pub commands: Vec<Command>,
}

/// Error body returned by the server (`detail`, or the older `message`)
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ApiErrorBody {
    pub status: String,
    pub detail: String,
    pub message: String,
}

impl ApiErrorBody {
    /// The most specific human-readable text, if any
    pub fn text(&self) -> Option<&str> {
        if !self.detail.is_empty() {
            Some(&self.detail)
        } else if !self.message.is_empty() {
            Some(&self.message)
        } else {
            None
        }
    }
}
