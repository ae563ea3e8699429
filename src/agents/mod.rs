//! Agent invocation for the advisory pipeline
//!
//! Every stage is served by one agent behind the [`AgentInvoker`] trait, so
//! the runner never knows whether it is talking to a scripted simulation or a
//! remote inference provider.
//!
//! ## Backends
//!
//! - **SimulatedAgents**: fixed per-stage delay, then a scripted payload
//! - **HttpAgentInvoker**: `POST {base_url}/invoke` against an agent gateway
//!
//! ## Output Contract
//!
//! Whatever the backend, these fields must resolve for the runner:
//!
//! | Stage                    | Fields                         |
//! |--------------------------|--------------------------------|
//! | Crop Prediction          | `suitability`, `confidence`    |
//! | Weather Intelligence     | `weatherScore`, `forecast`     |
//! | Decision Orchestrator    | `optimizedYield`, `priceTrend` |
//! | Explanation & Compliance | `reasoning`, `confidence`      |

pub mod http;
pub mod simulated;

pub use http::HttpAgentInvoker;
pub use simulated::{SimulatedAgents, DEFAULT_STAGE_DELAYS_MS};

use crate::types::{Stage, StageInput, StageOutput};
use async_trait::async_trait;

/// Invokes the agent behind one pipeline stage.
///
/// Implementations must be thread-safe (Send + Sync); one invoker is shared
/// by every concurrent pipeline run.
#[async_trait]
pub trait AgentInvoker: Send + Sync {
    /// Run the agent for `stage` and return its structured output.
    async fn invoke(&self, stage: Stage, input: &StageInput) -> Result<StageOutput, AgentError>;

    /// Backend name for logging
    fn backend_name(&self) -> &'static str;
}

/// Agent invocation errors. None of these are retried by the runner.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AgentError {
    /// Network or provider hiccup; a later run may succeed.
    #[error("transient agent failure: {0}")]
    Transient(String),
    /// The provider refused the request.
    #[error("agent rejected request: {0}")]
    Permanent(String),
    /// The provider answered with something that is not a JSON object.
    #[error("malformed agent response: {0}")]
    MalformedResponse(String),
}
