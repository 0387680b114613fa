//! Application state management

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::info;

use crate::app::options::AppOptions;
use crate::errors::AgentError;
use crate::http::client::HttpClient;
use crate::installer::Installer;
use crate::pipeline::InstallPipeline;
use crate::queue::scheduler::TaskScheduler;
use crate::report::StatusReporter;
use crate::storage::identity::AgentIdentity;
use crate::workers::dispatcher::{Dispatcher, PolicyFlags};

/// Main application state
pub struct AppState {
    /// Agent credentials
    pub identity: AgentIdentity,

    /// HTTP client for control server communication
    pub http_client: Arc<HttpClient>,

    /// Pending tasks and the installed-app ledger
    pub scheduler: Arc<TaskScheduler>,

    /// Server policy flags
    pub flags: Arc<PolicyFlags>,

    pub pipeline: Arc<InstallPipeline>,

    pub reporter: Arc<StatusReporter>,

    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Initialize application state
    pub async fn init(options: &AppOptions, identity: AgentIdentity) -> Result<Self, AgentError> {
        info!("Initializing application state...");

        options.layout.setup().await?;

        let http_client = Arc::new(HttpClient::new(&options.server_url, identity.clone())?);
        let scheduler = Arc::new(TaskScheduler::new(options.scheduler.clone()));

        // no overall timeout: large transfers must be able to run long
        let download_client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()?;
        let pipeline = Arc::new(InstallPipeline::new(
            download_client,
            identity.clone(),
            Installer::new(&options.package_tool),
            options.pipeline.clone(),
        ));
        let reporter = Arc::new(StatusReporter::new(
            http_client.clone(),
            options.reporter.clone(),
        ));

        Ok(Self {
            identity,
            http_client,
            scheduler,
            flags: Arc::new(PolicyFlags::default()),
            pipeline,
            reporter,
            started_at: Utc::now(),
        })
    }

    /// Wire the driver loop collaborators
    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher {
            scheduler: self.scheduler.clone(),
            executor: self.pipeline.clone(),
            reporter: self.reporter.clone(),
            flags: self.flags.clone(),
        }
    }
}
