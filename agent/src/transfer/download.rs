//! Resumable, rate-limited HTTP download

use std::path::{Path, PathBuf};

use reqwest::{header, Client, StatusCode};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::errors::AgentError;
use crate::transfer::throttle::Throttle;

pub const AGENT_UUID_HEADER: &str = "X-Agent-UUID";
pub const AGENT_SECRET_HEADER: &str = "X-Agent-Secret";

/// One download job
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub url: String,
    pub dest: PathBuf,

    /// Throughput cap in KiB/s, must be positive
    pub limit_kbps: u32,

    pub agent_uuid: String,
    pub secret_key: String,
}

/// Result of a completed download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOutcome {
    /// Bytes written by this call (excludes a resumed prefix)
    pub bytes_written: u64,

    /// Server-suggested file name, else the destination's base name
    pub filename: String,
}

/// Download `request.url` into `request.dest`.
///
/// An existing file at the destination is resumed with a `Range` request.
/// The file is appended to only when the server answers 206; a 200 always
/// restarts from scratch, and a 416 is retried once without `Range`.
/// Partial files stay on disk on every error path, including cancellation,
/// so the next attempt resumes.
pub async fn download_file(
    client: &Client,
    request: &DownloadRequest,
    cancel: &CancellationToken,
) -> Result<DownloadOutcome, AgentError> {
    let throttle = Throttle::new(request.limit_kbps)?;

    let mut offset = match fs::metadata(&request.dest).await {
        Ok(meta) => meta.len(),
        Err(_) => 0,
    };

    let mut response = send(client, request, offset, cancel).await?;
    if offset > 0 && response.status() == StatusCode::RANGE_NOT_SATISFIABLE {
        // the staged file is already complete or longer than the remote one
        debug!(
            "Resume of {} at byte {} rejected, restarting",
            request.dest.display(),
            offset
        );
        offset = 0;
        response = send(client, request, offset, cancel).await?;
    }

    let status = response.status();
    if status != StatusCode::OK && status != StatusCode::PARTIAL_CONTENT {
        return Err(AgentError::DownloadError(format!(
            "download request failed: {}",
            status
        )));
    }

    let filename = response
        .headers()
        .get(header::CONTENT_DISPOSITION)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_content_disposition)
        .unwrap_or_else(|| fallback_name(&request.dest));

    let append = offset > 0 && status == StatusCode::PARTIAL_CONTENT;
    let mut file = if append {
        OpenOptions::new().append(true).open(&request.dest).await
    } else {
        OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&request.dest)
            .await
    }
    .map_err(|e| AgentError::DownloadError(format!("open {}: {}", request.dest.display(), e)))?;

    let mut bytes_written: u64 = 0;
    let streamed = async {
        loop {
            let chunk = tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(AgentError::DownloadError("cancelled".to_string()));
                }
                chunk = response.chunk() => {
                    chunk.map_err(|e| AgentError::DownloadError(e.to_string()))?
                }
            };
            let Some(chunk) = chunk else {
                return Ok(());
            };

            file.write_all(&chunk)
                .await
                .map_err(|e| AgentError::DownloadError(format!("write: {}", e)))?;
            bytes_written += chunk.len() as u64;

            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(AgentError::DownloadError("cancelled".to_string()));
                }
                res = throttle.consume(chunk.len()) => res?,
            }
        }
    }
    .await;

    // keep whatever reached the file, even on error
    let flushed = file
        .flush()
        .await
        .map_err(|e| AgentError::DownloadError(format!("flush: {}", e)));
    streamed?;
    flushed?;

    info!(
        "Downloaded {} bytes to {} ({})",
        bytes_written,
        request.dest.display(),
        if append { "resumed" } else { "full" }
    );

    Ok(DownloadOutcome {
        bytes_written,
        filename,
    })
}

async fn send(
    client: &Client,
    request: &DownloadRequest,
    offset: u64,
    cancel: &CancellationToken,
) -> Result<reqwest::Response, AgentError> {
    let mut builder = client
        .get(&request.url)
        .header(AGENT_UUID_HEADER, &request.agent_uuid)
        .header(AGENT_SECRET_HEADER, &request.secret_key);
    if offset > 0 {
        debug!("Resuming {} from byte {}", request.dest.display(), offset);
        builder = builder.header(header::RANGE, format!("bytes={}-", offset));
    }

    tokio::select! {
        _ = cancel.cancelled() => {
            Err(AgentError::DownloadError("cancelled before response".to_string()))
        }
        res = builder.send() => res.map_err(|e| AgentError::DownloadError(e.to_string())),
    }
}

fn fallback_name(dest: &Path) -> String {
    dest.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Extract the file name from a `Content-Disposition` value.
///
/// `filename*` (RFC 5987) wins over `filename`. Path components are stripped.
pub fn parse_content_disposition(value: &str) -> Option<String> {
    let mut plain = None;
    let mut extended = None;

    for part in value.split(';').map(str::trim) {
        let Some((key, raw)) = part.split_once('=') else {
            continue;
        };
        let raw = raw.trim();
        match key.trim().to_ascii_lowercase().as_str() {
            "filename" => plain = Some(raw.trim_matches('"').to_string()),
            "filename*" => {
                // charset'lang'value
                let encoded = raw.splitn(3, '\'').nth(2).unwrap_or(raw);
                let decoded = urlencoding::decode_binary(encoded.trim_matches('"').as_bytes());
                extended = Some(String::from_utf8_lossy(&decoded).into_owned());
            }
            _ => {}
        }
    }

    let name = extended.or(plain)?;
    let name = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim()
        .to_string();
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}
