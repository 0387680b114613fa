//! Server state

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::queue::scheduler::TaskScheduler;
use crate::workers::dispatcher::PolicyFlags;

/// Server state shared across handlers
pub struct ServerState {
    pub agent_uuid: String,
    pub scheduler: Arc<TaskScheduler>,
    pub flags: Arc<PolicyFlags>,
    pub started_at: DateTime<Utc>,
}

impl ServerState {
    pub fn new(
        agent_uuid: String,
        scheduler: Arc<TaskScheduler>,
        flags: Arc<PolicyFlags>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            agent_uuid,
            scheduler,
            flags,
            started_at,
        }
    }
}
