//! HTTP agent gateway client
//!
//! Invokes a remote agent over `POST {base_url}/invoke` with a bearer token.
//! The request body is `{ "agentName": <stage name>, "input": <StageInput> }`
//! and the response body must be a JSON object (the stage output).

use super::{AgentError, AgentInvoker};
use crate::types::{Stage, StageInput, StageOutput};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InvokeRequest<'a> {
    agent_name: &'static str,
    input: &'a StageInput,
}

/// Remote agent backend.
#[derive(Clone)]
pub struct HttpAgentInvoker {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpAgentInvoker {
    /// Build a client with a per-request timeout.
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, AgentError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AgentError::Permanent(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    pub fn endpoint(&self) -> String {
        format!("{}/invoke", self.base_url)
    }
}

/// Map a non-success status to the error kind the runner reports.
fn classify_status(status: reqwest::StatusCode) -> AgentError {
    if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        AgentError::Transient(format!("agent gateway returned {status}"))
    } else {
        AgentError::Permanent(format!("agent gateway returned {status}"))
    }
}

#[async_trait]
impl AgentInvoker for HttpAgentInvoker {
    async fn invoke(&self, stage: Stage, input: &StageInput) -> Result<StageOutput, AgentError> {
        debug!(stage = %stage, endpoint = %self.endpoint(), "Invoking remote agent");

        let resp = self
            .http
            .post(self.endpoint())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&InvokeRequest {
                agent_name: stage.name(),
                input,
            })
            .send()
            .await
            .map_err(|e| {
                warn!(stage = %stage, error = %e, "Agent gateway unreachable");
                AgentError::Transient(e.to_string())
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(classify_status(status));
        }

        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| AgentError::MalformedResponse(e.to_string()))?;

        StageOutput::try_from(body)
            .map_err(|v| AgentError::MalformedResponse(format!("expected JSON object, got {v}")))
    }

    fn backend_name(&self) -> &'static str {
        "HTTP"
    }
}
