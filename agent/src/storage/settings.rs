//! Settings file management

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::errors::AgentError;
use crate::installer::DEFAULT_PACKAGE_TOOL;
use crate::logs::LogLevel;
use crate::queue::scheduler::DEFAULT_MAX_RETRIES;
use crate::queue::window::WorkWindow;

/// Agent settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Directory for rolling log files, stdout only when unset
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Emit JSON log lines
    #[serde(default)]
    pub json_logs: bool,

    /// Control server
    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub heartbeat: HeartbeatSettings,

    #[serde(default)]
    pub download: DownloadSettings,

    #[serde(default)]
    pub install: InstallSettings,

    #[serde(default)]
    pub queue: QueueSettings,

    /// Execution window for non-forced tasks
    #[serde(default)]
    pub work_hours: WorkHoursSettings,

    /// Local diagnostics endpoint
    #[serde(default)]
    pub local_server: LocalServerSettings,
}

impl Settings {
    /// Reject settings the agent cannot run with
    pub fn validate(&self) -> Result<(), AgentError> {
        if self.server.url.trim().is_empty() {
            return Err(AgentError::ConfigError("server.url is required".to_string()));
        }
        let url = Url::parse(self.server.url.trim())
            .map_err(|e| AgentError::ConfigError(format!("server.url is invalid: {}", e)))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(AgentError::ConfigError(format!(
                "server.url must be http(s), got {}",
                url.scheme()
            )));
        }
        if self.heartbeat.interval_secs == 0 {
            return Err(AgentError::ConfigError(
                "heartbeat.interval_secs must be greater than 0".to_string(),
            ));
        }
        if self.download.bandwidth_limit_kbps == 0 {
            return Err(AgentError::ConfigError(
                "download.bandwidth_limit_kbps must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Control server settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Base URL, e.g. `https://fleet.example.com`
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatSettings {
    #[serde(default = "default_heartbeat_interval")]
    pub interval_secs: u64,
}

fn default_heartbeat_interval() -> u64 {
    60
}

impl Default for HeartbeatSettings {
    fn default() -> Self {
        Self {
            interval_secs: default_heartbeat_interval(),
        }
    }
}

impl HeartbeatSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Download staging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadSettings {
    /// Staging directory, `<base_dir>/downloads` when unset
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,

    /// Throughput cap in KiB/s
    #[serde(default = "default_bandwidth_limit")]
    pub bandwidth_limit_kbps: u32,
}

fn default_bandwidth_limit() -> u32 {
    1024
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            temp_dir: None,
            bandwidth_limit_kbps: default_bandwidth_limit(),
        }
    }
}

/// Installer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallSettings {
    /// Installer deadline, 0 means the default
    #[serde(default = "default_install_timeout")]
    pub timeout_secs: u64,

    /// Delete the installer file after a successful install
    #[serde(default = "default_true")]
    pub enable_auto_cleanup: bool,

    /// Program that runs `.msi` packages
    #[serde(default = "default_package_tool")]
    pub package_tool: PathBuf,
}

fn default_true() -> bool {
    true
}

fn default_install_timeout() -> u64 {
    1800
}

fn default_package_tool() -> PathBuf {
    PathBuf::from(DEFAULT_PACKAGE_TOOL)
}

impl Default for InstallSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_install_timeout(),
            enable_auto_cleanup: true,
            package_tool: default_package_tool(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueSettings {
    /// Failed attempts before a task is dropped, 0 means the default
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
        }
    }
}

/// `HH:MM` UTC bounds. Empty or invalid means always eligible.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkHoursSettings {
    #[serde(default)]
    pub start_utc: String,

    #[serde(default)]
    pub end_utc: String,
}

impl WorkHoursSettings {
    pub fn window(&self) -> Option<WorkWindow> {
        WorkWindow::parse(&self.start_utc, &self.end_utc)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalServerSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_local_host")]
    pub host: String,

    #[serde(default = "default_local_port")]
    pub port: u16,
}

fn default_local_host() -> String {
    "127.0.0.1".to_string()
}

fn default_local_port() -> u16 {
    8765
}

impl Default for LocalServerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_local_host(),
            port: default_local_port(),
        }
    }
}
