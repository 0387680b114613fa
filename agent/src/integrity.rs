//! Content digest verification for downloaded artifacts

use std::path::Path;

use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncReadExt;

use crate::errors::AgentError;

const ALGORITHM_PREFIX: &str = "sha256:";
const READ_BUF_SIZE: usize = 64 * 1024;

/// Hex SHA-256 of a file, streamed
pub async fn sha256_file(path: &Path) -> Result<String, AgentError> {
    let mut file = fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; READ_BUF_SIZE];

    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Normalize a server-declared digest: lowercase, optional `sha256:` prefix removed
pub fn normalize_expected(expected: &str) -> String {
    let lowered = expected.trim().to_lowercase();
    match lowered.strip_prefix(ALGORITHM_PREFIX) {
        Some(rest) => rest.to_string(),
        None => lowered,
    }
}

/// Verify a file against the expected digest.
///
/// I/O problems surface as `HashVerifyError`, a wrong digest as `HashMismatch`.
pub async fn verify_file_hash(path: &Path, expected: &str) -> Result<(), AgentError> {
    let actual = sha256_file(path)
        .await
        .map_err(|e| AgentError::HashVerifyError(e.to_string()))?;
    let expected = normalize_expected(expected);

    if actual != expected {
        return Err(AgentError::HashMismatch { expected, actual });
    }
    Ok(())
}
