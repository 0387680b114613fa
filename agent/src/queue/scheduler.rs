//! Task scheduler: pending commands, retry state, selection and the
//! installed-app ledger.
//!
//! The scheduler is the only component holding mutable shared state. Every
//! public method takes the single internal lock for the duration of its read
//! or mutation and never holds it across an `.await`, so it can be called
//! from the driver loop and from diagnostics concurrently.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use openapi_client::models::{
    Command, InstalledApp, TaskStatusRequest, STATUS_FAILED, STATUS_SUCCESS,
};

use crate::errors::AgentError;
use crate::queue::retry::{linear_backoff, RetryInfo};
use crate::queue::window::{should_execute_now, WorkWindow};

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_SUCCESS_MESSAGE: &str = "Installation completed successfully";
const UNKNOWN_VERSION: &str = "unknown";

/// Output of one pipeline run. Returned on failure too, so partial timing
/// survives.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionResult {
    /// `-1` when the pipeline failed before a subprocess ran
    pub exit_code: i32,
    pub installed_version: String,
    pub download_duration_sec: u64,
    pub install_duration_sec: u64,
    pub message: String,
}

impl ExecutionResult {
    pub fn pipeline_failure() -> Self {
        Self {
            exit_code: -1,
            ..Default::default()
        }
    }
}

/// A failed execution together with whatever telemetry was collected
#[derive(Debug, Error)]
#[error("{error}")]
pub struct ExecutionFailure {
    pub result: ExecutionResult,
    #[source]
    pub error: AgentError,
}

impl ExecutionFailure {
    pub fn new(result: ExecutionResult, error: AgentError) -> Self {
        Self { result, error }
    }
}

/// Runs one command end to end
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(
        &self,
        command: &Command,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult, ExecutionFailure>;
}

/// Delivers the terminal status of one attempt to the server
#[async_trait]
pub trait TaskReporter: Send + Sync {
    async fn report(
        &self,
        task_id: i64,
        status: TaskStatusRequest,
        cancel: &CancellationToken,
    ) -> Result<(), AgentError>;
}

/// Wall-clock source, injectable for tests
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Random delay source, injectable for tests
pub trait JitterSource: Send + Sync {
    /// A delay in `0..=max`, whole seconds
    fn jitter(&self, max: Duration) -> Duration;
}

pub struct RandomJitter;

impl JitterSource for RandomJitter {
    fn jitter(&self, max: Duration) -> Duration {
        let secs = rand::thread_rng().gen_range(0..=max.as_secs());
        Duration::from_secs(secs)
    }
}

/// Scheduler settings
#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    /// Failures after which a task is dropped
    pub max_retries: u32,

    /// Backoff unit; the n-th failure waits `n * retry_step`
    pub retry_step: Duration,

    /// Upper bound of the pre-execution jitter for non-forced tasks
    pub max_jitter: Duration,

    /// Execution window for non-forced tasks, `None` = always
    pub work_hours: Option<WorkWindow>,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            retry_step: Duration::from_secs(5 * 60),
            max_jitter: Duration::from_secs(300),
            work_hours: None,
        }
    }
}

#[derive(Debug, Clone)]
struct QueuedTask {
    command: Command,
}

#[derive(Debug, Default)]
struct QueueState {
    tasks: HashMap<i64, QueuedTask>,
    retries: HashMap<i64, RetryInfo>,
    installed: BTreeMap<i64, String>,
    apps_changed: bool,
}

/// Pending-task queue
pub struct TaskScheduler {
    state: Mutex<QueueState>,
    options: SchedulerOptions,
    clock: Arc<dyn Clock>,
    jitter: Arc<dyn JitterSource>,
}

impl TaskScheduler {
    /// Create a scheduler using the system clock and random jitter
    pub fn new(mut options: SchedulerOptions) -> Self {
        if options.max_retries == 0 {
            options.max_retries = DEFAULT_MAX_RETRIES;
        }
        Self {
            state: Mutex::new(QueueState::default()),
            options,
            clock: Arc::new(SystemClock),
            jitter: Arc::new(RandomJitter),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_jitter(mut self, jitter: Arc<dyn JitterSource>) -> Self {
        self.jitter = jitter;
        self
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Enqueue commands whose non-zero `task_id` is not already queued
    pub fn add_commands<'a>(&self, commands: impl IntoIterator<Item = &'a Command>) {
        let mut state = self.lock();
        for command in commands {
            if command.task_id == 0 || state.tasks.contains_key(&command.task_id) {
                continue;
            }
            debug!(task_id = command.task_id, app_id = command.app_id, "Queued task");
            state.tasks.insert(
                command.task_id,
                QueuedTask {
                    command: command.clone(),
                },
            );
        }
    }

    /// Number of queued tasks, including those in backoff
    pub fn pending_count(&self) -> usize {
        self.lock().tasks.len()
    }

    /// Return and clear the ledger dirty flag, with a snapshot sorted by app id
    pub fn consume_apps_changed(&self) -> (bool, Vec<InstalledApp>) {
        let mut state = self.lock();
        if !state.apps_changed {
            return (false, Vec::new());
        }
        state.apps_changed = false;

        let apps = state
            .installed
            .iter()
            .map(|(app_id, version)| InstalledApp {
                app_id: *app_id,
                version: version.clone(),
            })
            .collect();
        (true, apps)
    }

    /// Run the next runnable task, if any.
    ///
    /// Returns `false` only when nothing is runnable or the pre-execution
    /// jitter was cancelled; in the latter case the task stays queued.
    pub async fn process_one(
        &self,
        server_time: DateTime<Utc>,
        executor: &dyn TaskExecutor,
        reporter: &dyn TaskReporter,
        cancel: &CancellationToken,
    ) -> bool {
        let Some(command) = self.next_runnable(server_time) else {
            return false;
        };

        if !command.force_update {
            let delay = self.jitter.jitter(self.options.max_jitter);
            if !delay.is_zero() {
                debug!(task_id = command.task_id, "Delaying task by {:?}", delay);
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!(task_id = command.task_id, "Task start cancelled during jitter");
                        return false;
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }

        info!(
            task_id = command.task_id,
            app_id = command.app_id,
            app = %command.app_name,
            version = %command.app_version,
            "Executing task"
        );

        match executor.execute(&command, cancel).await {
            Ok(mut result) => {
                if result.message.is_empty() {
                    result.message = DEFAULT_SUCCESS_MESSAGE.to_string();
                }
                info!(
                    task_id = command.task_id,
                    exit_code = result.exit_code,
                    "Task succeeded"
                );
                let status = TaskStatusRequest {
                    status: STATUS_SUCCESS.to_string(),
                    progress: 100,
                    message: result.message.clone(),
                    exit_code: result.exit_code,
                    installed_version: result.installed_version.clone(),
                    download_duration_sec: result.download_duration_sec,
                    install_duration_sec: result.install_duration_sec,
                    error: None,
                };
                self.send_report(reporter, command.task_id, status, cancel).await;
                self.handle_success(&command);
            }
            Err(failure) => {
                let message = failure.error.to_string();
                warn!(
                    task_id = command.task_id,
                    exit_code = failure.result.exit_code,
                    "Task failed: {}",
                    message
                );
                self.handle_failure(command.task_id);
                let status = TaskStatusRequest {
                    status: STATUS_FAILED.to_string(),
                    progress: 0,
                    message: message.clone(),
                    exit_code: failure.result.exit_code,
                    installed_version: String::new(),
                    download_duration_sec: failure.result.download_duration_sec,
                    install_duration_sec: failure.result.install_duration_sec,
                    error: Some(message),
                };
                self.send_report(reporter, command.task_id, status, cancel).await;
            }
        }

        true
    }

    async fn send_report(
        &self,
        reporter: &dyn TaskReporter,
        task_id: i64,
        status: TaskStatusRequest,
        cancel: &CancellationToken,
    ) {
        if let Err(e) = reporter.report(task_id, status, cancel).await {
            warn!(task_id, "Giving up on status report: {}", e);
        }
    }

    fn next_runnable(&self, server_time: DateTime<Utc>) -> Option<Command> {
        let state = self.lock();
        if state.tasks.is_empty() {
            return None;
        }

        let now = self.clock.now();
        let mut candidates: Vec<&Command> = state
            .tasks
            .values()
            .map(|task| &task.command)
            .filter(|command| {
                state
                    .retries
                    .get(&command.task_id)
                    .map_or(true, |retry| retry.is_due(now))
            })
            .filter(|command| {
                should_execute_now(command, server_time, self.options.work_hours.as_ref())
            })
            .collect();

        candidates.sort_by_key(|command| (command.priority, command.task_id));
        candidates.first().map(|command| (*command).clone())
    }

    fn handle_failure(&self, task_id: i64) {
        let now = self.clock.now();
        let mut state = self.lock();

        let retry = state
            .retries
            .entry(task_id)
            .or_insert_with(|| RetryInfo::new(now));
        retry.count += 1;
        let count = retry.count;

        if count >= self.options.max_retries {
            state.retries.remove(&task_id);
            state.tasks.remove(&task_id);
            info!(task_id, attempts = count, "Retry budget exhausted, dropping task");
            return;
        }

        let delay = linear_backoff(self.options.retry_step, count);
        retry.next_retry_at = chrono::Duration::from_std(delay)
            .ok()
            .and_then(|delay| now.checked_add_signed(delay))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        debug!(task_id, attempts = count, "Task in backoff until {}", retry.next_retry_at);
    }

    fn handle_success(&self, command: &Command) {
        let mut state = self.lock();
        state.tasks.remove(&command.task_id);
        state.retries.remove(&command.task_id);

        if command.app_id > 0 {
            let version = if command.app_version.is_empty() {
                UNKNOWN_VERSION.to_string()
            } else {
                command.app_version.clone()
            };
            state.installed.insert(command.app_id, version);
            state.apps_changed = true;
        }
    }

    #[cfg(test)]
    fn retry_info(&self, task_id: i64) -> Option<RetryInfo> {
        self.lock().retries.get(&task_id).cloned()
    }
}
