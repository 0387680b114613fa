//! Error types for the fleet agent

use thiserror::Error;

/// Main error type for the fleet agent
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("{method} {url} failed with {status}: {detail}")]
    ApiError {
        method: String,
        url: String,
        status: u16,
        detail: String,
    },

    #[error("failed to prepare download directory: {0}")]
    TempDirError(String),

    #[error("download failed: {0}")]
    DownloadError(String),

    #[error("hash verification failed: {0}")]
    HashVerifyError(String),

    #[error("hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },

    #[error("install failed: {0}")]
    InstallError(String),

    #[error("Report error: {0}")]
    ReportError(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),

    #[error("Agent not registered: {0}")]
    NotRegistered(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for AgentError {
    fn from(err: anyhow::Error) -> Self {
        AgentError::Internal(err.to_string())
    }
}
