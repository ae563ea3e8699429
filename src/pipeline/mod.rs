//! Advisory Pipeline
//!
//! ## Stages
//!
//! ```text
//! STAGE 1: Farmer Interaction      (parse farmer input)
//! STAGE 2: Crop Prediction         (suitability, confidence)
//! STAGE 3: Weather Intelligence    (weatherScore, forecast)   -> risk score
//! STAGE 4: Field Operations & IoT  (irrigation status)
//! STAGE 5: Decision Orchestrator   (optimizedYield, priceTrend) -> advisory
//! STAGE 6: Explanation & Compliance (reasoning, confidence)   -> advisory
//! ```
//!
//! CRITICAL GUARANTEE: an Advisory is produced only after all six stages have
//! logged output; the first failure ends the run.

mod runner;

pub use runner::{
    assemble_advisory, AdvisoryRunner, PipelineSettings, DEFAULT_HOURS_SINCE_HARVEST,
    DEFAULT_PRICE_VOLATILITY, DEFAULT_STAGE_TIMEOUT_SECS,
};

use crate::agents::AgentError;
use crate::store::StoreError;
use crate::types::{InputError, PipelineId, PipelineStatus, Stage, TransitionError};
use std::time::Duration;

/// Why a pipeline run did not produce an Advisory.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Rejected before a record was created.
    #[error("invalid input: {0}")]
    InvalidInput(#[from] InputError),

    #[error("pipeline {pipeline_id} already finished with status {status}")]
    AlreadyFinished {
        pipeline_id: PipelineId,
        status: PipelineStatus,
    },

    /// Another run already owns this pipeline id.
    #[error("pipeline {pipeline_id} is already running")]
    AlreadyRunning { pipeline_id: PipelineId },

    /// The task driving the run ended without a result.
    #[error("pipeline {pipeline_id} aborted: {reason}")]
    Aborted {
        pipeline_id: PipelineId,
        reason: String,
    },

    #[error("{stage} failed: {source}")]
    Agent {
        stage: Stage,
        #[source]
        source: AgentError,
    },

    #[error("{stage} timed out after {limit:?}")]
    StageTimeout { stage: Stage, limit: Duration },

    #[error("{stage} output is missing field '{field}'")]
    MissingOutputField { stage: Stage, field: &'static str },

    #[error("no output recorded for {0}")]
    MissingStageOutput(Stage),

    #[error("progress store error: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Transition(#[from] TransitionError),
}

impl PipelineError {
    /// Errors caused by the request rather than by a stage.
    pub const fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::InvalidInput(_) | Self::AlreadyFinished { .. } | Self::AlreadyRunning { .. }
        )
    }

    /// Stage the run was on when it failed, if any.
    pub const fn stage(&self) -> Option<Stage> {
        match self {
            Self::Agent { stage, .. }
            | Self::StageTimeout { stage, .. }
            | Self::MissingOutputField { stage, .. }
            | Self::MissingStageOutput(stage) => Some(*stage),
            _ => None,
        }
    }
}
