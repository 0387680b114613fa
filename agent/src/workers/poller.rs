//! Heartbeat worker: polls the control server and hands results to the
//! dispatcher over a bounded channel.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, error, info, warn};

use openapi_client::models::{Command, HeartbeatRequest, HeartbeatResponse};

use crate::errors::AgentError;
use crate::http::client::HttpClient;
use crate::queue::scheduler::TaskScheduler;
use crate::telemetry::HostProbe;
use crate::utils::version_info;

/// Capacity of the poll-result channel
pub const RESULT_QUEUE_CAPACITY: usize = 8;

pub const STATUS_IDLE: &str = "Idle";
pub const STATUS_BUSY: &str = "Busy";

/// One heartbeat's worth of work for the dispatcher
#[derive(Debug, Clone)]
pub struct PollResult {
    pub server_time: DateTime<Utc>,
    pub config: HashMap<String, serde_json::Value>,
    pub commands: Vec<Command>,
}

impl PollResult {
    pub fn from_response(response: HeartbeatResponse) -> Self {
        Self {
            server_time: parse_server_time(&response.server_time),
            config: response.config,
            commands: response.commands,
        }
    }
}

/// RFC3339 server time, else local UTC now
pub fn parse_server_time(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// Heartbeat endpoint, abstracted for testability
#[async_trait]
pub trait HeartbeatApi: Send + Sync {
    async fn send_heartbeat(&self, request: &HeartbeatRequest) -> Result<HeartbeatResponse, AgentError>;
}

#[async_trait]
impl HeartbeatApi for HttpClient {
    async fn send_heartbeat(&self, request: &HeartbeatRequest) -> Result<HeartbeatResponse, AgentError> {
        self.heartbeat(request).await
    }
}

/// Poller worker options
#[derive(Debug, Clone)]
pub struct Options {
    /// Heartbeat interval
    pub interval: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
        }
    }
}

/// Run the poller worker. The first heartbeat goes out immediately.
pub async fn run<S, F>(
    options: &Options,
    api: Arc<dyn HeartbeatApi>,
    scheduler: Arc<TaskScheduler>,
    results: mpsc::Sender<PollResult>,
    sleep_fn: S,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) where
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    info!("Poller worker starting...");
    let mut probe = HostProbe::new();

    loop {
        let request = build_heartbeat(&mut probe, &scheduler);

        let response = tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Poller worker shutting down...");
                return;
            }
            res = api.send_heartbeat(&request) => res,
        };

        match response {
            Ok(response) => {
                let result = PollResult::from_response(response);
                debug!("Heartbeat ok, {} command(s)", result.commands.len());
                if !forward(&results, result) {
                    info!("Dispatcher gone, poller worker exiting");
                    return;
                }
            }
            Err(e) => {
                error!("Heartbeat failed: {}", e);
            }
        }

        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Poller worker shutting down...");
                return;
            }
            _ = sleep_fn(options.interval) => {}
        }
    }
}

/// Hand a result to the dispatcher without blocking. Returns false once the
/// receiver is gone.
pub fn forward(results: &mpsc::Sender<PollResult>, result: PollResult) -> bool {
    match results.try_send(result) {
        Ok(()) => true,
        Err(TrySendError::Full(dropped)) => {
            warn!(
                "heartbeat result queue full, dropping {} command(s)",
                dropped.commands.len()
            );
            true
        }
        Err(TrySendError::Closed(_)) => false,
    }
}

pub fn build_heartbeat(probe: &mut HostProbe, scheduler: &TaskScheduler) -> HeartbeatRequest {
    let facts = probe.sample();
    let (apps_changed, installed_apps) = scheduler.consume_apps_changed();
    let current_status = if scheduler.pending_count() > 0 {
        STATUS_BUSY
    } else {
        STATUS_IDLE
    };

    HeartbeatRequest {
        hostname: facts.hostname,
        ip_address: facts.ip_address,
        os_user: facts.os_user,
        agent_version: version_info().version,
        disk_free_gb: facts.disk_free_gb,
        cpu_usage: facts.cpu_usage,
        ram_usage: facts.ram_usage,
        current_status: current_status.to_string(),
        apps_changed,
        installed_apps,
    }
}
