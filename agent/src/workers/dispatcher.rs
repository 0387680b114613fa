//! Driver loop: sole consumer of poll results. Applies server policy,
//! enqueues commands and drains runnable tasks one at a time.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::queue::scheduler::{TaskExecutor, TaskReporter, TaskScheduler};
use crate::workers::poller::PollResult;

pub const STORE_TRAY_ENABLED_KEY: &str = "store_tray_enabled";
pub const REMOTE_SUPPORT_ENABLED_KEY: &str = "remote_support_enabled";

/// Server-controlled feature flags, owned by the driver
#[derive(Debug, Default)]
pub struct PolicyFlags {
    store_tray_enabled: AtomicBool,
    remote_support_enabled: AtomicBool,
}

/// Copy of the flags for diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PolicySnapshot {
    pub store_tray_enabled: bool,
    pub remote_support_enabled: bool,
}

impl PolicyFlags {
    pub fn store_tray_enabled(&self) -> bool {
        self.store_tray_enabled.load(Ordering::Relaxed)
    }

    pub fn remote_support_enabled(&self) -> bool {
        self.remote_support_enabled.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> PolicySnapshot {
        PolicySnapshot {
            store_tray_enabled: self.store_tray_enabled(),
            remote_support_enabled: self.remote_support_enabled(),
        }
    }

    /// Apply boolean keys from the heartbeat `config` map. Absent or
    /// non-boolean keys leave the flag unchanged.
    pub fn apply(&self, config: &HashMap<String, serde_json::Value>) {
        apply_flag(config, STORE_TRAY_ENABLED_KEY, &self.store_tray_enabled);
        apply_flag(config, REMOTE_SUPPORT_ENABLED_KEY, &self.remote_support_enabled);
    }
}

fn apply_flag(config: &HashMap<String, serde_json::Value>, key: &str, flag: &AtomicBool) {
    let Some(value) = config.get(key).and_then(|v| v.as_bool()) else {
        return;
    };
    let previous = flag.swap(value, Ordering::Relaxed);
    if previous != value {
        info!("Server policy: {}={}", key, value);
    }
}

/// Collaborators of the driver loop
pub struct Dispatcher {
    pub scheduler: Arc<TaskScheduler>,
    pub executor: Arc<dyn TaskExecutor>,
    pub reporter: Arc<dyn TaskReporter>,
    pub flags: Arc<PolicyFlags>,
}

impl Dispatcher {
    /// Handle one poll result: policy, enqueue, then drain runnable tasks
    /// serially until none is left or `cancel` fires.
    pub async fn handle(&self, result: PollResult, cancel: &CancellationToken) {
        self.flags.apply(&result.config);
        self.scheduler.add_commands(&result.commands);

        let pending = self.scheduler.pending_count();
        if !result.commands.is_empty() {
            info!(
                "Received {} command(s), {} task(s) pending",
                result.commands.len(),
                pending
            );
        }

        self.drain(result.server_time, cancel).await;

        if self.scheduler.pending_count() == 0 {
            debug!("Task queue empty, idle-time work may run");
        }
    }

    async fn drain(&self, server_time: DateTime<Utc>, cancel: &CancellationToken) {
        while !cancel.is_cancelled() {
            let processed = self
                .scheduler
                .process_one(
                    server_time,
                    self.executor.as_ref(),
                    self.reporter.as_ref(),
                    cancel,
                )
                .await;
            if !processed {
                break;
            }
        }
    }
}

/// Run the dispatcher worker.
///
/// On shutdown an in-flight task is cancelled, not abandoned: it still
/// finishes its failure bookkeeping before the worker returns.
pub async fn run(
    dispatcher: Dispatcher,
    mut results: mpsc::Receiver<PollResult>,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) {
    info!("Dispatcher worker starting...");
    let cancel = CancellationToken::new();

    loop {
        let result = tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Dispatcher worker shutting down...");
                return;
            }
            result = results.recv() => match result {
                Some(result) => result,
                None => {
                    info!("Poll channel closed, dispatcher worker exiting");
                    return;
                }
            },
        };

        let handled = dispatcher.handle(result, &cancel);
        tokio::pin!(handled);
        tokio::select! {
            _ = &mut handled => {}
            _ = &mut shutdown_signal => {
                info!("Dispatcher worker shutting down, cancelling current task...");
                cancel.cancel();
                handled.await;
                return;
            }
        }
    }
}
