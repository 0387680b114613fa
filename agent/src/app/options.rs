//! Application configuration options

use std::path::PathBuf;
use std::time::Duration;

use crate::installer::DEFAULT_PACKAGE_TOOL;
use crate::pipeline::PipelineOptions;
use crate::queue::scheduler::SchedulerOptions;
use crate::report::ReporterOptions;
use crate::storage::layout::StorageLayout;
use crate::storage::settings::Settings;
use crate::workers::poller;

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Lifecycle configuration
    pub lifecycle: LifecycleOptions,

    /// Control server base URL
    pub server_url: String,

    /// Storage layout paths
    pub layout: StorageLayout,

    /// Enable local HTTP server
    pub enable_local_server: bool,

    /// Local HTTP server configuration
    pub server: ServerOptions,

    /// Poller worker options
    pub poller: poller::Options,

    /// Task scheduler options
    pub scheduler: SchedulerOptions,

    /// Execution pipeline options
    pub pipeline: PipelineOptions,

    /// Program that runs `.msi` packages
    pub package_tool: PathBuf,

    /// Status reporter options
    pub reporter: ReporterOptions,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            lifecycle: LifecycleOptions::default(),
            server_url: String::new(),
            layout: StorageLayout::default(),
            enable_local_server: true,
            server: ServerOptions::default(),
            poller: poller::Options::default(),
            scheduler: SchedulerOptions::default(),
            pipeline: PipelineOptions::default(),
            package_tool: PathBuf::from(DEFAULT_PACKAGE_TOOL),
            reporter: ReporterOptions::default(),
        }
    }
}

impl AppOptions {
    /// Derive runtime options from validated settings
    pub fn from_settings(settings: &Settings, layout: StorageLayout) -> Self {
        let temp_dir = settings
            .download
            .temp_dir
            .clone()
            .unwrap_or_else(|| layout.downloads_dir().path().to_path_buf());

        Self {
            server_url: settings.server.url.clone(),
            enable_local_server: settings.local_server.enabled,
            server: ServerOptions {
                host: settings.local_server.host.clone(),
                port: settings.local_server.port,
            },
            poller: poller::Options {
                interval: settings.heartbeat.interval(),
            },
            scheduler: SchedulerOptions {
                max_retries: settings.queue.max_retries,
                work_hours: settings.work_hours.window(),
                ..Default::default()
            },
            pipeline: PipelineOptions {
                temp_dir,
                server_url: settings.server.url.clone(),
                bandwidth_limit_kbps: settings.download.bandwidth_limit_kbps,
                install_timeout: Duration::from_secs(settings.install.timeout_secs),
                auto_cleanup: settings.install.enable_auto_cleanup,
            },
            package_tool: settings.install.package_tool.clone(),
            layout,
            ..Default::default()
        }
    }
}

/// Lifecycle options for the agent
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Maximum delay for graceful shutdown
    pub max_shutdown_delay: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            max_shutdown_delay: Duration::from_secs(30),
        }
    }
}

/// Local HTTP server options
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8765,
        }
    }
}
