//! Pipeline record types: PipelineStatus, PipelineRecord, StageLogEntry, Advisory

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::{FarmerInput, PipelineId, Stage, StageOutput};

// ============================================================================
// Status
// ============================================================================

/// Lifecycle of a pipeline record.
///
/// `Pending -> Running -> {Completed | Failed}`; terminal states are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl PipelineStatus {
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Running => write!(f, "Running"),
            Self::Completed => write!(f, "Completed"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal pipeline transition {from} -> {to}")]
pub struct TransitionError {
    pub from: PipelineStatus,
    pub to: PipelineStatus,
}

// ============================================================================
// Advisory
// ============================================================================

/// Final recommendation assembled once every stage has completed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Advisory {
    /// Decision Orchestrator `optimizedYield`
    pub yield_expectation: String,
    /// Decision Orchestrator `priceTrend`
    pub price_trend: String,
    /// Crop risk score, 0-100
    pub risk_score: u8,
    #[serde(rename = "finalAdvice")]
    pub recommendation: String,
    /// Explanation & Compliance `reasoning`
    pub reasoning: String,
    /// Explanation & Compliance `confidence`, 0-1
    pub confidence: f64,
    /// Post-harvest shelf-life probability, 0-1
    pub shelf_life: f64,
}

// ============================================================================
// Pipeline Record
// ============================================================================

/// Durable state of one end-to-end advisory run.
///
/// Owned by the runner while `Running`. All status changes go through the
/// transition methods below so the record invariants hold in one place:
/// `current_stage` is set only while running, `advisory` only when completed,
/// `error` only when failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineRecord {
    pub pipeline_id: PipelineId,
    pub status: PipelineStatus,
    #[serde(rename = "currentAgent", default, skip_serializing_if = "Option::is_none")]
    pub current_stage: Option<Stage>,
    #[serde(rename = "userInput")]
    pub input: FarmerInput,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advisory: Option<Advisory>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PipelineRecord {
    pub const fn new(pipeline_id: PipelineId, input: FarmerInput) -> Self {
        Self {
            pipeline_id,
            status: PipelineStatus::Pending,
            current_stage: None,
            input,
            start_time: None,
            end_time: None,
            advisory: None,
            error: None,
        }
    }

    /// `Pending -> Running`, positioned on the first stage.
    pub fn start(&mut self, at: DateTime<Utc>) -> Result<(), TransitionError> {
        self.check(PipelineStatus::Pending, PipelineStatus::Running)?;
        self.status = PipelineStatus::Running;
        self.current_stage = Some(Stage::first());
        self.start_time = Some(at);
        Ok(())
    }

    /// Overwrite the current stage. Only legal while running.
    pub fn enter_stage(&mut self, stage: Stage) -> Result<(), TransitionError> {
        self.check(PipelineStatus::Running, PipelineStatus::Running)?;
        self.current_stage = Some(stage);
        Ok(())
    }

    pub fn complete(&mut self, advisory: Advisory, at: DateTime<Utc>) -> Result<(), TransitionError> {
        self.check(PipelineStatus::Running, PipelineStatus::Completed)?;
        self.status = PipelineStatus::Completed;
        self.current_stage = None;
        self.advisory = Some(advisory);
        self.end_time = Some(at);
        Ok(())
    }

    pub fn fail(&mut self, message: impl Into<String>, at: DateTime<Utc>) -> Result<(), TransitionError> {
        self.check(PipelineStatus::Running, PipelineStatus::Failed)?;
        self.status = PipelineStatus::Failed;
        self.current_stage = None;
        self.error = Some(message.into());
        self.end_time = Some(at);
        Ok(())
    }

    fn check(&self, required: PipelineStatus, to: PipelineStatus) -> Result<(), TransitionError> {
        if self.status == required {
            Ok(())
        } else {
            Err(TransitionError { from: self.status, to })
        }
    }
}

// ============================================================================
// Stage Log
// ============================================================================

/// Output of one completed stage. At most one per stage per pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageLogEntry {
    pub agent: Stage,
    pub output: StageOutput,
    pub timestamp: DateTime<Utc>,
}
