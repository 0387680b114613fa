//! End-to-end install pipeline against a mock server and a stand-in package tool
#![cfg(unix)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use mockito::Matcher;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use fleetagent::errors::AgentError;
use fleetagent::installer::Installer;
use fleetagent::pipeline::{InstallPipeline, PipelineOptions};
use fleetagent::queue::scheduler::{TaskExecutor, DEFAULT_SUCCESS_MESSAGE};
use fleetagent::storage::identity::AgentIdentity;
use openapi_client::models::Command;

use crate::support::{sha256_hex, write_script};

const PACKAGE: &[u8] = b"not really an msi";

struct Fixture {
    dir: TempDir,
    marker: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("installed.txt");
        Self { dir, marker }
    }

    fn staging(&self) -> PathBuf {
        self.dir.path().join("downloads")
    }

    fn pipeline(&self, server_url: &str, tool_body: &str) -> InstallPipeline {
        let tool = write_script(self.dir.path(), "fake-msiexec", tool_body);
        InstallPipeline::new(
            reqwest::Client::new(),
            AgentIdentity::new("agent-1", "s3cret"),
            Installer::new(tool).with_log_dir(self.dir.path()),
            PipelineOptions {
                temp_dir: self.staging(),
                server_url: server_url.to_string(),
                bandwidth_limit_kbps: 4096,
                install_timeout: Duration::from_secs(10),
                auto_cleanup: true,
            },
        )
    }

    fn recording_tool(&self) -> String {
        format!("echo \"$2\" > {}", self.marker.display())
    }
}

fn command(file_hash: String) -> Command {
    Command {
        task_id: 1,
        app_id: 2,
        app_name: "Demo".to_string(),
        app_version: "4.5.6".to_string(),
        download_url: "/api/v1/files/2".to_string(),
        file_hash,
        install_args: "/qn".to_string(),
        ..Default::default()
    }
}

async fn serve_package(server: &mut mockito::ServerGuard) -> mockito::Mock {
    server
        .mock("GET", "/api/v1/files/2")
        .match_header("X-Agent-UUID", "agent-1")
        .match_header("Range", Matcher::Missing)
        .with_status(200)
        .with_header("Content-Disposition", "attachment; filename=\"demo-4.5.6.msi\"")
        .with_body(PACKAGE)
        .create_async()
        .await
}

/// Answers any resume with 416, like a server whose file is shorter than the
/// staged copy
async fn reject_ranges(server: &mut mockito::ServerGuard) -> mockito::Mock {
    server
        .mock("GET", "/api/v1/files/2")
        .match_header("Range", Matcher::Regex("^bytes=".to_string()))
        .with_status(416)
        .create_async()
        .await
}

fn staged(staging: &Path, ext: &str) -> PathBuf {
    staging.join(format!("task_1_app_2.{}", ext))
}

#[tokio::test]
async fn test_successful_install_cleans_up() {
    let mut server = mockito::Server::new_async().await;
    let mock = serve_package(&mut server).await;
    let fixture = Fixture::new();
    let pipeline = fixture.pipeline(&server.url(), &fixture.recording_tool());

    let result = pipeline
        .execute(&command(sha256_hex(PACKAGE)), &CancellationToken::new())
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(result.exit_code, 0);
    assert_eq!(result.installed_version, "4.5.6");
    assert_eq!(result.message, DEFAULT_SUCCESS_MESSAGE);

    let installed = std::fs::read_to_string(&fixture.marker).unwrap();
    assert_eq!(
        installed.trim(),
        staged(&fixture.staging(), "msi").display().to_string()
    );
    assert!(!staged(&fixture.staging(), "msi").exists());
    assert!(!staged(&fixture.staging(), "bin").exists());
}

#[tokio::test]
async fn test_prefixed_uppercase_hash_is_accepted() {
    let mut server = mockito::Server::new_async().await;
    serve_package(&mut server).await;
    let fixture = Fixture::new();
    let pipeline = fixture.pipeline(&server.url(), "exit 3010");

    let expected = format!("sha256:{}", sha256_hex(PACKAGE).to_uppercase());
    let result = pipeline
        .execute(&command(expected), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.exit_code, 3010);
}

#[tokio::test]
async fn test_hash_mismatch_never_runs_installer() {
    let mut server = mockito::Server::new_async().await;
    serve_package(&mut server).await;
    let fixture = Fixture::new();
    let pipeline = fixture.pipeline(&server.url(), &fixture.recording_tool());

    let failure = pipeline
        .execute(&command("0".repeat(64)), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(failure.error, AgentError::HashMismatch { .. }));
    assert!(failure.error.to_string().starts_with("hash mismatch"));
    assert_eq!(failure.result.exit_code, -1);
    assert!(!fixture.marker.exists());
    assert!(!staged(&fixture.staging(), "msi").exists());
}

#[tokio::test]
async fn test_retry_after_corrupt_download_succeeds() {
    let mut server = mockito::Server::new_async().await;
    let corrupt = server
        .mock("GET", "/api/v1/files/2")
        .with_status(200)
        .with_header("Content-Disposition", "attachment; filename=\"demo-4.5.6.msi\"")
        .with_body(b"not really an msi, truncated and garbled")
        .create_async()
        .await;
    let fixture = Fixture::new();
    let pipeline = fixture.pipeline(&server.url(), &fixture.recording_tool());
    let cmd = command(sha256_hex(PACKAGE));

    let failure = pipeline
        .execute(&cmd, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(failure.error, AgentError::HashMismatch { .. }));
    assert!(!staged(&fixture.staging(), "msi").exists());

    corrupt.remove_async().await;
    reject_ranges(&mut server).await;
    let fresh = serve_package(&mut server).await;

    let result = pipeline
        .execute(&cmd, &CancellationToken::new())
        .await
        .unwrap();

    fresh.assert_async().await;
    assert_eq!(result.exit_code, 0);
    assert!(fixture.marker.exists());
}

#[tokio::test]
async fn test_retry_after_install_failure_redownloads_complete_file() {
    let mut server = mockito::Server::new_async().await;
    reject_ranges(&mut server).await;
    serve_package(&mut server).await;
    let fixture = Fixture::new();
    let cmd = command(sha256_hex(PACKAGE));

    let failing = fixture.pipeline(&server.url(), "exit 1618");
    failing
        .execute(&cmd, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(staged(&fixture.staging(), "msi").exists());

    let working = fixture.pipeline(&server.url(), &fixture.recording_tool());
    let result = working
        .execute(&cmd, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.exit_code, 0);
    assert!(fixture.marker.exists());
    assert!(!staged(&fixture.staging(), "msi").exists());
}

#[tokio::test]
async fn test_installer_failure_keeps_exit_code() {
    let mut server = mockito::Server::new_async().await;
    serve_package(&mut server).await;
    let fixture = Fixture::new();
    let pipeline = fixture.pipeline(&server.url(), "echo 'another install in progress' >&2\nexit 1618");

    let failure = pipeline
        .execute(&command(sha256_hex(PACKAGE)), &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(failure.result.exit_code, 1618);
    assert_eq!(
        failure.error.to_string(),
        "install failed: msi install failed: another install in progress"
    );
    assert!(staged(&fixture.staging(), "msi").exists());
}

#[tokio::test]
async fn test_download_error_is_reported_as_download_failure() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/api/v1/files/2")
        .with_status(503)
        .create_async()
        .await;
    let fixture = Fixture::new();
    let pipeline = fixture.pipeline(&server.url(), &fixture.recording_tool());

    let failure = pipeline
        .execute(&command(sha256_hex(PACKAGE)), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(failure.error, AgentError::DownloadError(_)));
    assert_eq!(failure.result.exit_code, -1);
    assert!(!fixture.marker.exists());
}
