//! Stage types: Stage, StageInput, StageOutput

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use super::FarmerInput;

// ============================================================================
// Stage List
// ============================================================================

/// One named step of the advisory pipeline, backed by one agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Stage {
    #[serde(rename = "Farmer Interaction Agent")]
    FarmerInteraction,
    #[serde(rename = "Crop Prediction Agent")]
    CropPrediction,
    #[serde(rename = "Weather Intelligence Agent")]
    WeatherIntelligence,
    #[serde(rename = "Field Operations & IoT Agent")]
    FieldOperations,
    #[serde(rename = "Decision Orchestrator Agent")]
    DecisionOrchestrator,
    #[serde(rename = "Explanation & Compliance Agent")]
    ExplanationCompliance,
}

impl Stage {
    /// Fixed execution order.
    pub const ALL: [Self; 6] = [
        Self::FarmerInteraction,
        Self::CropPrediction,
        Self::WeatherIntelligence,
        Self::FieldOperations,
        Self::DecisionOrchestrator,
        Self::ExplanationCompliance,
    ];

    pub const fn first() -> Self {
        Self::ALL[0]
    }

    /// Agent name as written to the progress store.
    pub const fn name(self) -> &'static str {
        match self {
            Self::FarmerInteraction => "Farmer Interaction Agent",
            Self::CropPrediction => "Crop Prediction Agent",
            Self::WeatherIntelligence => "Weather Intelligence Agent",
            Self::FieldOperations => "Field Operations & IoT Agent",
            Self::DecisionOrchestrator => "Decision Orchestrator Agent",
            Self::ExplanationCompliance => "Explanation & Compliance Agent",
        }
    }

    pub const fn role(self) -> &'static str {
        match self {
            Self::FarmerInteraction => "Chat API input handling",
            Self::CropPrediction => "ML inference for crop suitability & risk",
            Self::WeatherIntelligence => "Weather API processing",
            Self::FieldOperations => "Irrigation, harvest & post-harvest logic",
            Self::DecisionOrchestrator => "Combines agent outputs",
            Self::ExplanationCompliance => "Explains reasoning & confidence",
        }
    }

    /// Position in [`Stage::ALL`].
    pub const fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown stage: {0}")]
pub struct UnknownStage(pub String);

impl FromStr for Stage {
    type Err = UnknownStage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|stage| stage.name() == s)
            .ok_or_else(|| UnknownStage(s.to_string()))
    }
}

// ============================================================================
// Stage Input / Output
// ============================================================================

/// Projection of the farmer input handed to every agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageInput {
    pub crop: String,
    pub soil_type: String,
    pub temp: f64,
    pub district: String,
}

impl From<&FarmerInput> for StageInput {
    fn from(input: &FarmerInput) -> Self {
        Self {
            crop: input.crop.clone(),
            soil_type: input.soil_type.to_string(),
            temp: input.temperature,
            district: input.district.clone(),
        }
    }
}

/// Structured payload returned by an agent.
///
/// Opaque to the store; the runner reads named fields from specific stages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StageOutput(Map<String, Value>);

impl StageOutput {
    pub const fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Numeric field, if present and a JSON number.
    pub fn number(&self, field: &str) -> Option<f64> {
        self.0.get(field).and_then(Value::as_f64)
    }

    /// Text field, if present and a JSON string.
    pub fn text(&self, field: &str) -> Option<&str> {
        self.0.get(field).and_then(Value::as_str)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl TryFrom<Value> for StageOutput {
    type Error = Value;

    /// Only JSON objects are valid stage outputs; anything else is handed back.
    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(fields) => Ok(Self(fields)),
            other => Err(other),
        }
    }
}
