//! Agent API endpoints

use async_trait::async_trait;

use openapi_client::models::{
    HeartbeatRequest, HeartbeatResponse, TaskStatusRequest, TaskStatusResponse,
};

use crate::errors::AgentError;
use crate::http::client::HttpClient;
use crate::report::TaskStatusApi;

pub const HEARTBEAT_PATH: &str = "/api/v1/agent/heartbeat";

pub fn task_status_path(task_id: i64) -> String {
    format!("/api/v1/agent/task/{}/status", task_id)
}

impl HttpClient {
    /// Send a heartbeat and receive pending commands
    pub async fn heartbeat(&self, request: &HeartbeatRequest) -> Result<HeartbeatResponse, AgentError> {
        self.post(HEARTBEAT_PATH, request).await
    }

    /// Report the terminal status of one task attempt
    pub async fn report_task_status(
        &self,
        task_id: i64,
        request: &TaskStatusRequest,
    ) -> Result<TaskStatusResponse, AgentError> {
        self.post(&task_status_path(task_id), request).await
    }
}

#[async_trait]
impl TaskStatusApi for HttpClient {
    async fn send_task_status(&self, task_id: i64, status: &TaskStatusRequest) -> Result<(), AgentError> {
        self.report_task_status(task_id, status).await.map(|_| ())
    }
}
