//! Scripted agents for demos and tests.
//!
//! Each stage sleeps for its configured delay and then returns a fixed
//! success payload that satisfies the per-stage output contract.

use super::{AgentError, AgentInvoker};
use crate::types::{Stage, StageInput, StageOutput};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

/// Default per-stage delays in milliseconds, in [`Stage::ALL`] order.
pub const DEFAULT_STAGE_DELAYS_MS: [u64; 6] = [800, 1200, 1000, 1500, 1200, 1000];

/// Simulated agent backend.
#[derive(Debug, Clone)]
pub struct SimulatedAgents {
    delays: [Duration; 6],
}

impl SimulatedAgents {
    /// Build with explicit per-stage delays (milliseconds, [`Stage::ALL`] order).
    pub fn new(delays_ms: [u64; 6]) -> Self {
        Self {
            delays: delays_ms.map(Duration::from_millis),
        }
    }

    /// No delays; every stage answers immediately.
    pub fn instant() -> Self {
        Self::new([0; 6])
    }

    pub const fn delay(&self, stage: Stage) -> Duration {
        self.delays[stage.index()]
    }
}

impl Default for SimulatedAgents {
    fn default() -> Self {
        Self::new(DEFAULT_STAGE_DELAYS_MS)
    }
}

/// Scripted payload for a stage.
pub fn scripted_output(stage: Stage) -> Value {
    match stage {
        Stage::FarmerInteraction => json!({
            "status": "Success",
            "message": "Farmer input successfully parsed."
        }),
        Stage::CropPrediction => json!({
            "status": "Success",
            "suitability": 0.91,
            "confidence": 0.88
        }),
        Stage::WeatherIntelligence => json!({
            "status": "Success",
            "weatherScore": 82,
            "forecast": "Partly Cloudy"
        }),
        Stage::FieldOperations => json!({
            "status": "Success",
            "irrigationStatus": "Optimal"
        }),
        Stage::DecisionOrchestrator => json!({
            "status": "Success",
            "optimizedYield": "4.8 Tons/Acre",
            "priceTrend": "Rising (+12%)"
        }),
        Stage::ExplanationCompliance => json!({
            "status": "Success",
            "reasoning": "Recommendation driven by high soil nitrogen and stable weather window. Confidence indexed at 92%.",
            "confidence": 0.92
        }),
    }
}

#[async_trait]
impl AgentInvoker for SimulatedAgents {
    async fn invoke(&self, stage: Stage, input: &StageInput) -> Result<StageOutput, AgentError> {
        let delay = self.delay(stage);
        debug!(stage = %stage, crop = %input.crop, delay = ?delay, "Simulating agent");

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        StageOutput::try_from(scripted_output(stage))
            .map_err(|v| AgentError::MalformedResponse(v.to_string()))
    }

    fn backend_name(&self) -> &'static str {
        "Simulated"
    }
}
