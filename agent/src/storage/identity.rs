//! Agent credential file

use serde::{Deserialize, Serialize};

use crate::errors::AgentError;
use crate::filesys::file::File;

/// Credentials issued to this agent at registration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentIdentity {
    /// Agent UUID, sent as `X-Agent-UUID`
    pub uuid: String,

    /// Shared secret, sent as `X-Agent-Secret`
    pub secret_key: String,
}

impl AgentIdentity {
    pub fn new(uuid: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            secret_key: secret_key.into(),
        }
    }
}

/// Assert that the agent has been registered
pub async fn assert_registered(identity_file: &File) -> Result<AgentIdentity, AgentError> {
    if !identity_file.exists().await {
        return Err(AgentError::NotRegistered(format!(
            "{} does not exist",
            identity_file.path().display()
        )));
    }

    let identity: AgentIdentity = identity_file.read_json().await.map_err(|e| {
        AgentError::NotRegistered(format!("Failed to read identity file: {}", e))
    })?;

    if identity.uuid.trim().is_empty() {
        return Err(AgentError::NotRegistered("Agent UUID is empty".to_string()));
    }

    if identity.secret_key.trim().is_empty() {
        return Err(AgentError::NotRegistered(
            "Agent secret key is empty".to_string(),
        ));
    }

    Ok(identity)
}
