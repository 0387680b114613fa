//! Per-command orchestration: stage, download, verify, install, clean up

use std::path::PathBuf;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use openapi_client::models::Command;

use crate::errors::AgentError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;
use crate::installer::Installer;
use crate::integrity::verify_file_hash;
use crate::pipeline::paths::{
    base_path, find_existing_download_path, installer_path_for, resolve_download_url,
};
use crate::queue::scheduler::{
    ExecutionFailure, ExecutionResult, TaskExecutor, DEFAULT_SUCCESS_MESSAGE,
};
use crate::storage::identity::AgentIdentity;
use crate::transfer::{download_file, DownloadRequest};

/// Pipeline settings
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Staging directory for downloads
    pub temp_dir: PathBuf,

    /// Base URL used for server-relative download URLs
    pub server_url: String,

    /// Download throughput cap in KiB/s
    pub bandwidth_limit_kbps: u32,

    /// Installer deadline, zero for the default
    pub install_timeout: Duration,

    /// Remove the installer after a successful install
    pub auto_cleanup: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            temp_dir: std::env::temp_dir().join("fleetagent"),
            server_url: String::new(),
            bandwidth_limit_kbps: 1024,
            install_timeout: crate::installer::DEFAULT_INSTALL_TIMEOUT,
            auto_cleanup: true,
        }
    }
}

/// Production [`TaskExecutor`]
pub struct InstallPipeline {
    client: reqwest::Client,
    identity: AgentIdentity,
    installer: Installer,
    options: PipelineOptions,
}

impl InstallPipeline {
    pub fn new(
        client: reqwest::Client,
        identity: AgentIdentity,
        installer: Installer,
        options: PipelineOptions,
    ) -> Self {
        Self {
            client,
            identity,
            installer,
            options,
        }
    }

    async fn run(
        &self,
        command: &Command,
        cancel: &CancellationToken,
        result: &mut ExecutionResult,
    ) -> Result<(), AgentError> {
        Dir::new(&self.options.temp_dir)
            .ensure()
            .await
            .map_err(|e| AgentError::TempDirError(e.to_string()))?;

        let base = base_path(&self.options.temp_dir, command.task_id, command.app_id);
        let download_path = find_existing_download_path(&base).await;
        let url = resolve_download_url(&self.options.server_url, &command.download_url);

        let request = DownloadRequest {
            url,
            dest: download_path.clone(),
            limit_kbps: self.options.bandwidth_limit_kbps,
            agent_uuid: self.identity.uuid.clone(),
            secret_key: self.identity.secret_key.clone(),
        };
        let started = Instant::now();
        let downloaded = download_file(&self.client, &request, cancel).await;
        result.download_duration_sec = started.elapsed().as_secs();
        let outcome = downloaded.map_err(|e| match e {
            AgentError::DownloadError(_) => e,
            other => AgentError::DownloadError(other.to_string()),
        })?;

        let mut install_file = File::new(&download_path);
        if let Some(target) = installer_path_for(&base, &download_path, &outcome.filename) {
            match install_file.rename(&target).await {
                Ok(renamed) => install_file = renamed,
                Err(e) => debug!("Keeping {}: rename failed: {}", download_path.display(), e),
            }
        }

        if let Err(e) = verify_file_hash(install_file.path(), &command.file_hash).await {
            // corrupt bytes must not be resumed on the next attempt
            if matches!(e, AgentError::HashMismatch { .. }) {
                if let Err(del) = install_file.delete().await {
                    warn!("Failed to remove {}: {}", install_file.path().display(), del);
                }
            }
            return Err(e);
        }

        let started = Instant::now();
        let installed = self
            .installer
            .install(
                install_file.path(),
                &command.install_args,
                self.options.install_timeout,
                cancel,
            )
            .await;
        result.install_duration_sec = started.elapsed().as_secs();
        match installed {
            Ok(exit_code) => result.exit_code = exit_code,
            Err(failure) => {
                result.exit_code = failure.exit_code;
                return Err(AgentError::InstallError(failure.message));
            }
        }

        if self.options.auto_cleanup {
            if let Err(e) = install_file.delete().await {
                warn!("Failed to remove {}: {}", install_file.path().display(), e);
            }
        }

        result.installed_version = command.app_version.clone();
        result.message = DEFAULT_SUCCESS_MESSAGE.to_string();
        Ok(())
    }
}

#[async_trait]
impl TaskExecutor for InstallPipeline {
    async fn execute(
        &self,
        command: &Command,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult, ExecutionFailure> {
        let mut result = ExecutionResult::pipeline_failure();
        match self.run(command, cancel, &mut result).await {
            Ok(()) => {
                info!(
                    task_id = command.task_id,
                    download_secs = result.download_duration_sec,
                    install_secs = result.install_duration_sec,
                    "Pipeline completed"
                );
                Ok(result)
            }
            Err(error) => Err(ExecutionFailure::new(result, error)),
        }
    }
}
