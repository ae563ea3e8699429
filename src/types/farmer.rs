//! Farmer input types: FarmerInput, SoilType, PipelineId, InputError

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Soil Type
// ============================================================================

/// Soil classification submitted with the farmer form.
///
/// Parsing is total: any value outside the three scored classes is kept
/// verbatim as `Other` and contributes no risk adjustment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SoilType {
    Loamy,
    Sandy,
    Clayey,
    Other(String),
}

impl SoilType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Loamy => "Loamy",
            Self::Sandy => "Sandy",
            Self::Clayey => "Clayey",
            Self::Other(raw) => raw,
        }
    }
}

impl From<&str> for SoilType {
    fn from(raw: &str) -> Self {
        match raw {
            "Loamy" => Self::Loamy,
            "Sandy" => Self::Sandy,
            "Clayey" => Self::Clayey,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for SoilType {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "Loamy" | "Sandy" | "Clayey" => Self::from(raw.as_str()),
            _ => Self::Other(raw),
        }
    }
}

impl From<SoilType> for String {
    fn from(soil: SoilType) -> Self {
        match soil {
            SoilType::Other(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for SoilType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Farmer Input
// ============================================================================

/// Farm parameters collected by the advisory form.
///
/// Immutable once a pipeline starts; the runner only ever reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FarmerInput {
    pub crop: String,
    pub district: String,
    pub soil_type: SoilType,
    pub growth_stage: String,
    /// Air temperature in °C
    #[serde(rename = "temp")]
    pub temperature: f64,
    /// Relative humidity in %
    pub humidity: f64,
    /// Reference to an already-uploaded crop image. Passed through untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl FarmerInput {
    /// Reject malformed input before any pipeline record exists.
    pub fn validate(&self) -> Result<(), InputError> {
        require_text("crop", &self.crop)?;
        require_text("district", &self.district)?;
        require_text("soilType", self.soil_type.as_str())?;
        require_text("growthStage", &self.growth_stage)?;

        if !self.temperature.is_finite() {
            return Err(InputError::NonFinite("temp"));
        }
        if !self.humidity.is_finite() {
            return Err(InputError::NonFinite("humidity"));
        }
        if !(0.0..=100.0).contains(&self.humidity) {
            return Err(InputError::OutOfRange {
                field: "humidity",
                value: self.humidity,
            });
        }
        Ok(())
    }
}

fn require_text(field: &'static str, value: &str) -> Result<(), InputError> {
    if value.trim().is_empty() {
        Err(InputError::MissingField(field))
    } else {
        Ok(())
    }
}

// ============================================================================
// Pipeline Id
// ============================================================================

/// Identity of one pipeline run. Caller-supplied or generated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PipelineId(String);

impl PipelineId {
    pub fn new(raw: impl Into<String>) -> Result<Self, InputError> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(InputError::EmptyPipelineId);
        }
        Ok(Self(raw))
    }

    /// `pipeline_<unix millis>_<8 hex>`; the suffix keeps ids unique when two
    /// runs start in the same millisecond.
    pub fn generate() -> Self {
        let millis = chrono::Utc::now().timestamp_millis();
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        Self(format!("pipeline_{millis}_{}", &suffix[..8]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PipelineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PipelineId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Malformed advisory request.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InputError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("field {0} must be a finite number")]
    NonFinite(&'static str),
    #[error("field {field} out of range: {value}")]
    OutOfRange { field: &'static str, value: f64 },
    #[error("pipeline id must not be empty")]
    EmptyPipelineId,
}
