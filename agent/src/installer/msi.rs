//! Package installer strategy (`msiexec /i`)

use std::path::Path;
use std::process::Output;
use std::time::Duration;

use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{combined_output, run_bounded, split_args, InstallFailure, NO_EXIT_CODE};

/// Success, reboot required
pub const EXIT_REBOOT_REQUIRED: i32 = 3010;
/// Success, reboot initiated
pub const EXIT_REBOOT_INITIATED: i32 = 1641;

pub async fn install(
    tool: &Path,
    log_dir: &Path,
    path: &Path,
    args: &str,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<i32, InstallFailure> {
    let log_path = log_dir.join(format!("fleetagent-msi-{}.log", uuid::Uuid::new_v4()));

    let mut command = Command::new(tool);
    command
        .arg("/i")
        .arg(path)
        .args(split_args(args))
        .arg("/L*v")
        .arg(&log_path);

    let outcome = match run_bounded(command, timeout, cancel).await {
        Ok(output) => interpret(&output, &log_path).await,
        Err(failure) => Err(failure),
    };

    // the summary has been read by now
    if let Err(e) = tokio::fs::remove_file(&log_path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Failed to remove {}: {}", log_path.display(), e);
        }
    }
    outcome
}

async fn interpret(output: &Output, log_path: &Path) -> Result<i32, InstallFailure> {
    if output.status.success() {
        return Ok(0);
    }

    let exit_code = output.status.code().unwrap_or(NO_EXIT_CODE);
    if exit_code == EXIT_REBOOT_REQUIRED || exit_code == EXIT_REBOOT_INITIATED {
        debug!("Package installed, reboot pending (exit code {})", exit_code);
        return Ok(exit_code);
    }

    let mut detail = combined_output(output);
    if detail.is_empty() {
        detail = summarize_log(log_path).await.unwrap_or_default();
    }
    if detail.is_empty() {
        detail = format!("exit code {}", exit_code);
    }
    Err(InstallFailure::new(
        exit_code,
        format!("msi install failed: {}", detail),
    ))
}

/// Pick the most telling line of a verbose package log: the last
/// `Product: ... --` line, else the last line mentioning an error.
pub async fn summarize_log(path: &Path) -> Option<String> {
    let bytes = tokio::fs::read(path).await.ok()?;
    summarize_log_text(&decode_log(&bytes))
}

pub fn summarize_log_text(text: &str) -> Option<String> {
    let mut product = None;
    let mut error = None;

    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if line.contains("Product:") && line.contains("--") {
            product = Some(line);
            continue;
        }
        let lower = line.to_lowercase();
        if lower.contains("error") || lower.contains("failed") {
            error = Some(line);
        }
    }

    product.or(error).map(str::to_string)
}

// verbose logs are usually UTF-16LE with a BOM
fn decode_log(bytes: &[u8]) -> String {
    match bytes {
        [0xFF, 0xFE, rest @ ..] => {
            let units: Vec<u16> = rest
                .chunks_exact(2)
                .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                .collect();
            String::from_utf16_lossy(&units)
        }
        _ => String::from_utf8_lossy(bytes).into_owned(),
    }
}
