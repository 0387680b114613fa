//! Directory handle

use std::io;
use std::path::{Path, PathBuf};

use tokio::fs;

use crate::errors::AgentError;

/// A directory the agent owns (staging, logs)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dir {
    path: PathBuf,
}

impl Dir {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn exists(&self) -> bool {
        fs::metadata(&self.path)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }

    /// Create the directory and its parents if missing. A regular file in
    /// the way is an error rather than something to remove.
    pub async fn ensure(&self) -> Result<(), AgentError> {
        match fs::metadata(&self.path).await {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => Err(AgentError::IoError(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} exists and is not a directory", self.path.display()),
            ))),
            Err(_) => {
                fs::create_dir_all(&self.path).await?;
                Ok(())
            }
        }
    }
}
