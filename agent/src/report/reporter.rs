//! Task status delivery with bounded retries

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use openapi_client::models::TaskStatusRequest;

use crate::errors::AgentError;
use crate::queue::scheduler::TaskReporter;

/// Server status endpoint, abstracted for testability
#[async_trait]
pub trait TaskStatusApi: Send + Sync {
    async fn send_task_status(&self, task_id: i64, status: &TaskStatusRequest) -> Result<(), AgentError>;
}

/// Reporter options
#[derive(Debug, Clone)]
pub struct ReporterOptions {
    /// Delivery attempts per report
    pub max_attempts: u32,

    /// Backoff unit; after the n-th failed attempt the reporter waits `n * backoff_step`
    pub backoff_step: Duration,
}

impl Default for ReporterOptions {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_step: Duration::from_secs(1),
        }
    }
}

/// Reports task outcomes, retrying with linear backoff
pub struct StatusReporter {
    api: Arc<dyn TaskStatusApi>,
    options: ReporterOptions,
}

impl StatusReporter {
    pub fn new(api: Arc<dyn TaskStatusApi>, options: ReporterOptions) -> Self {
        Self { api, options }
    }
}

#[async_trait]
impl TaskReporter for StatusReporter {
    async fn report(
        &self,
        task_id: i64,
        status: TaskStatusRequest,
        cancel: &CancellationToken,
    ) -> Result<(), AgentError> {
        let mut last_err = AgentError::ReportError("no delivery attempt made".to_string());

        for attempt in 1..=self.options.max_attempts.max(1) {
            match self.api.send_task_status(task_id, &status).await {
                Ok(()) => {
                    debug!(task_id, attempt, status = %status.status, "Task status reported");
                    return Ok(());
                }
                Err(e) => {
                    warn!(task_id, attempt, "Task status report failed: {}", e);
                    last_err = e;
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(AgentError::Cancelled("task status report".to_string()));
                }
                _ = tokio::time::sleep(self.options.backoff_step * attempt) => {}
            }
        }

        Err(last_err)
    }
}
