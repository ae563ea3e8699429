//! AgriCoPilot: multi-agent farm advisory pipeline
//!
//! Six specialist agents run strictly in sequence for each farmer request;
//! their outputs feed three deterministic scoring tools that produce the
//! final Advisory. Every step is written to a progress store that clients
//! can read or subscribe to while the run is in flight.
//!
//! ## Architecture
//!
//! - **Agents**: `AgentInvoker` trait with simulated and HTTP backends
//! - **Pipeline**: `AdvisoryRunner`, sequential stage execution and scoring
//! - **Scoring**: crop risk, shelf life, recommendation text
//! - **Store**: `ProgressStore` trait with in-memory and sled backends
//! - **API**: axum endpoints for invocation, progress reads and SSE

pub mod agents;
pub mod api;
pub mod config;
pub mod pipeline;
pub mod scoring;
pub mod store;
pub mod types;

// Re-export configuration
pub use config::AppConfig;

// Re-export commonly used types
pub use types::{
    Advisory, FarmerInput, PipelineId, PipelineRecord, PipelineStatus, SoilType, Stage,
    StageInput, StageLogEntry, StageOutput,
};

// Re-export agents
pub use agents::{AgentError, AgentInvoker, HttpAgentInvoker, SimulatedAgents};

// Re-export pipeline
pub use pipeline::{AdvisoryRunner, PipelineError, PipelineSettings};

// Re-export storage
pub use store::{
    InMemoryProgressStore, ProgressEvent, ProgressStore, ProgressView, SledProgressStore,
    StoreError,
};
