//! HTTP client implementation

use std::time::Duration;

use reqwest::{Client, Method, Response};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, error};

use openapi_client::models::ApiErrorBody;

use crate::errors::AgentError;
use crate::storage::identity::AgentIdentity;
use crate::transfer::download::{AGENT_SECRET_HEADER, AGENT_UUID_HEADER};

/// Upper bound on how much of an error body is kept
const MAX_ERROR_BODY: usize = 64 * 1024;

/// HTTP client for control server communication
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    base_url: String,
    identity: AgentIdentity,
}

impl HttpClient {
    /// Create a new HTTP client
    pub fn new(base_url: &str, identity: AgentIdentity) -> Result<Self, AgentError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self::with_client(client, base_url, identity))
    }

    /// Wrap an existing client
    pub fn with_client(client: Client, base_url: &str, identity: AgentIdentity) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            identity,
        }
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Make a POST request with a JSON body
    pub async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, AgentError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("POST {}", url);

        let response = self
            .client
            .request(Method::POST, &url)
            .header(AGENT_UUID_HEADER, &self.identity.uuid)
            .header(AGENT_SECRET_HEADER, &self.identity.secret_key)
            .json(body)
            .send()
            .await?;

        let response = check_response("POST", &url, response).await?;
        Ok(response.json().await?)
    }
}

/// Turn a non-2xx response into `AgentError::ApiError`
async fn check_response(method: &str, url: &str, response: Response) -> Result<Response, AgentError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = read_bounded(response).await;
    let detail = api_error_detail(&body);
    error!("HTTP {} failed: {} - {}", method, status, detail);
    Err(AgentError::ApiError {
        method: method.to_string(),
        url: url.to_string(),
        status: status.as_u16(),
        detail,
    })
}

async fn read_bounded(mut response: Response) -> String {
    let mut body = Vec::new();
    while let Ok(Some(chunk)) = response.chunk().await {
        let room = MAX_ERROR_BODY - body.len();
        body.extend_from_slice(&chunk[..chunk.len().min(room)]);
        if body.len() >= MAX_ERROR_BODY {
            break;
        }
    }
    String::from_utf8_lossy(&body).into_owned()
}

/// `detail` or `message` from a JSON error body, else the raw body
pub fn api_error_detail(body: &str) -> String {
    serde_json::from_str::<ApiErrorBody>(body)
        .ok()
        .and_then(|parsed| parsed.text().map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}
