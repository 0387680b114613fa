//! Installer runner
//!
//! Dispatches on file extension to a strategy and normalizes the outcome to
//! an exit code plus, on failure, a diagnostic message.

pub mod exe;
pub mod msi;

use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub const DEFAULT_INSTALL_TIMEOUT: Duration = Duration::from_secs(1800);
pub const DEFAULT_PACKAGE_TOOL: &str = "msiexec";

/// Exit code used when no subprocess ran or it was killed
pub const NO_EXIT_CODE: i32 = -1;

/// Installer failure with the exit code to report
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct InstallFailure {
    pub exit_code: i32,
    pub message: String,
}

impl InstallFailure {
    pub fn new(exit_code: i32, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }
}

/// Installer strategy, resolved once from the file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallerKind {
    /// `.msi`, run through the package tool
    Package,
    /// `.exe`, run directly
    SelfExtracting,
}

impl InstallerKind {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "msi" => Some(Self::Package),
            "exe" => Some(Self::SelfExtracting),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Package => "msi",
            Self::SelfExtracting => "exe",
        }
    }
}

/// Runs installer files
#[derive(Debug, Clone)]
pub struct Installer {
    package_tool: PathBuf,
    log_dir: PathBuf,
}

impl Default for Installer {
    fn default() -> Self {
        Self::new(DEFAULT_PACKAGE_TOOL)
    }
}

impl Installer {
    pub fn new(package_tool: impl Into<PathBuf>) -> Self {
        Self {
            package_tool: package_tool.into(),
            log_dir: std::env::temp_dir(),
        }
    }

    /// Directory for package-tool verbose logs
    pub fn with_log_dir(mut self, log_dir: impl Into<PathBuf>) -> Self {
        self.log_dir = log_dir.into();
        self
    }

    /// Run the installer at `path`.
    ///
    /// `Ok` carries the exit code, which is non-zero for the package tool's
    /// reboot codes. A zero `timeout` means the default.
    pub async fn install(
        &self,
        path: &Path,
        args: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<i32, InstallFailure> {
        let timeout = effective_timeout(timeout);
        let Some(kind) = InstallerKind::from_path(path) else {
            let ext = path
                .extension()
                .map(|e| format!(".{}", e.to_string_lossy()))
                .unwrap_or_default();
            return Err(InstallFailure::new(
                NO_EXIT_CODE,
                format!("unsupported installer type: {}", ext),
            ));
        };

        info!("Running {:?} installer {}", kind, path.display());
        match kind {
            InstallerKind::Package => {
                msi::install(&self.package_tool, &self.log_dir, path, args, timeout, cancel).await
            }
            InstallerKind::SelfExtracting => exe::install(path, args, timeout, cancel).await,
        }
    }
}

pub fn effective_timeout(timeout: Duration) -> Duration {
    if timeout.is_zero() {
        DEFAULT_INSTALL_TIMEOUT
    } else {
        timeout
    }
}

pub(crate) fn split_args(args: &str) -> Vec<String> {
    args.split_whitespace().map(str::to_string).collect()
}

/// stdout followed by stderr, trimmed
pub(crate) fn combined_output(output: &Output) -> String {
    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.trim().is_empty() {
        if !text.is_empty() && !text.ends_with('\n') {
            text.push('\n');
        }
        text.push_str(&stderr);
    }
    text.trim().to_string()
}

/// Spawn `command` and wait for it under `timeout` and `cancel`.
///
/// The child is killed when the wait is abandoned.
pub(crate) async fn run_bounded(
    mut command: Command,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<Output, InstallFailure> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = command
        .spawn()
        .map_err(|e| InstallFailure::new(NO_EXIT_CODE, format!("failed to start installer: {}", e)))?;

    tokio::select! {
        _ = cancel.cancelled() => {
            debug!("Installer cancelled, killing subprocess");
            Err(InstallFailure::new(NO_EXIT_CODE, "installer cancelled"))
        }
        res = tokio::time::timeout(timeout, child.wait_with_output()) => match res {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(InstallFailure::new(NO_EXIT_CODE, format!("installer wait failed: {}", e))),
            Err(_) => Err(InstallFailure::new(
                NO_EXIT_CODE,
                format!("installer timed out after {}s", timeout.as_secs()),
            )),
        },
    }
}
