//! Self-extracting executable strategy

use std::path::Path;
use std::time::Duration;

use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use super::{combined_output, run_bounded, split_args, InstallFailure, NO_EXIT_CODE};

pub async fn install(
    path: &Path,
    args: &str,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<i32, InstallFailure> {
    let mut command = Command::new(path);
    command.args(split_args(args));

    let output = run_bounded(command, timeout, cancel).await?;
    if output.status.success() {
        return Ok(0);
    }

    let exit_code = output.status.code().unwrap_or(NO_EXIT_CODE);
    Err(InstallFailure::new(
        exit_code,
        format!("exe install failed: {}", combined_output(&output)),
    ))
}
