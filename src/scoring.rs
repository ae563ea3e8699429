//! Advisory scoring tools
//!
//! Pure, deterministic functions applied by the runner once every stage has
//! completed:
//!
//! - `crop_risk_tool`: weather, soil and market volatility -> risk score 0-100
//! - `shelf_life_tool`: post-harvest conditions -> shelf-life probability 0-1
//! - `advisory_formatter_tool`: risk tier -> recommendation text
//!
//! ## Risk Tiers
//!
//! | Risk     | Tier     | Recommendation                      |
//! |----------|----------|-------------------------------------|
//! | 0-29     | Low      | Optimal conditions, high-yield      |
//! | 30-59    | Moderate | Increase irrigation frequency by 20% |
//! | 60-100   | High     | Delay harvest by 5-7 days           |

use crate::types::SoilType;
use std::fmt;

/// Risk before soil, price and weather adjustments.
pub const BASE_RISK: f64 = 40.0;

/// Weight of price volatility in the risk score.
pub const PRICE_VOLATILITY_WEIGHT: f64 = 0.4;

/// Weight of the weather score (higher weather score lowers risk).
pub const WEATHER_SCORE_WEIGHT: f64 = 0.2;

/// Lower bound of the moderate tier.
pub const MODERATE_RISK_THRESHOLD: u8 = 30;

/// Lower bound of the high tier.
pub const HIGH_RISK_THRESHOLD: u8 = 60;

// ============================================================================
// Crop Risk
// ============================================================================

/// Soil contribution to base risk.
pub fn soil_adjustment(soil: &SoilType) -> f64 {
    match soil {
        SoilType::Loamy => -15.0,
        SoilType::Sandy => 15.0,
        SoilType::Clayey => 5.0,
        SoilType::Other(_) => 0.0,
    }
}

/// Crop risk score in `[0, 100]`.
///
/// `40 + soil + volatility * 0.4 - weather_score * 0.2`, clamped then rounded.
/// Total over every input: unknown soils add nothing and a NaN intermediate
/// scores as 0.
pub fn crop_risk_tool(weather_score: f64, soil_type: &SoilType, price_volatility: f64) -> u8 {
    let risk = BASE_RISK + soil_adjustment(soil_type) + price_volatility * PRICE_VOLATILITY_WEIGHT
        - weather_score * WEATHER_SCORE_WEIGHT;

    if risk.is_nan() {
        return 0;
    }

    // Clamped to [0, 100] so the cast cannot truncate
    risk.clamp(0.0, 100.0).round() as u8
}

// ============================================================================
// Shelf Life
// ============================================================================

/// Post-harvest shelf-life probability in `[0, 1]`.
///
/// `(temperature * 0.6 + humidity * 0.2 + hours_since_harvest * 1.5) / 100`.
/// Sub-zero temperatures would push the raw value negative, so it is floored
/// at 0 as well as capped at 1.
pub fn shelf_life_tool(temperature: f64, humidity: f64, hours_since_harvest: f64) -> f64 {
    let prob = (temperature * 0.6 + humidity * 0.2 + hours_since_harvest * 1.5) / 100.0;
    if prob.is_nan() {
        return 0.0;
    }
    prob.clamp(0.0, 1.0)
}

// ============================================================================
// Recommendation
// ============================================================================

/// Recommendation tier selected by the risk score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskTier {
    Low,
    Moderate,
    High,
}

impl RiskTier {
    pub const fn from_score(risk: u8) -> Self {
        if risk < MODERATE_RISK_THRESHOLD {
            Self::Low
        } else if risk < HIGH_RISK_THRESHOLD {
            Self::Moderate
        } else {
            Self::High
        }
    }
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "LOW"),
            Self::Moderate => write!(f, "MODERATE"),
            Self::High => write!(f, "HIGH"),
        }
    }
}

/// Recommendation text for the final advisory.
///
/// Every tier interpolates both `crop` and `weather`. The high-risk wording
/// departs from the legacy advisory text, which named no forecast: it now
/// appends `({weather})` after "in this region".
///
/// `shelf_life` is accepted for parity with the scoring step but no template
/// interpolates it yet; the value is surfaced on the Advisory instead.
pub fn advisory_formatter_tool(crop: &str, risk: u8, _shelf_life: f64, weather: &str) -> String {
    match RiskTier::from_score(risk) {
        RiskTier::Low => format!(
            "Optimal conditions detected for {crop}. The current weather ({weather}) and soil \
             profile suggest a high-yield season. Post-harvest stability is high."
        ),
        RiskTier::Moderate => format!(
            "Moderate risk environment for {crop}. While {weather} is acceptable, we suggest \
             increasing irrigation frequency by 20% to mitigate soil moisture loss."
        ),
        RiskTier::High => format!(
            "Elevated risk levels for {crop} in this region ({weather}). High temperature and \
             market volatility suggest delaying harvest by 5-7 days for better price indexing."
        ),
    }
}
