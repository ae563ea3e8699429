//! Application Configuration
//!
//! All operator-tunable values for the advisory service, with serde defaults
//! so partial TOML files work.

use super::defaults;
use crate::agents::DEFAULT_STAGE_DELAYS_MS;
use crate::pipeline::{
    PipelineSettings, DEFAULT_HOURS_SINCE_HARVEST, DEFAULT_PRICE_VOLATILITY,
    DEFAULT_STAGE_TIMEOUT_SECS,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Root configuration.
///
/// Load with `AppConfig::load()` which searches:
/// 1. `$AGRI_CONFIG` env var
/// 2. `./agri_config.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    /// Runner tuning and scoring placeholders
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Agent backend selection
    #[serde(default)]
    pub agents: AgentsConfig,

    /// Progress store backend selection
    #[serde(default)]
    pub storage: StorageConfig,
}

impl AppConfig {
    /// Load configuration using the standard search order.
    ///
    /// A file that fails to read, parse or validate is skipped with a warning.
    pub fn load() -> Self {
        // 1. Check env var
        if let Ok(path) = std::env::var(defaults::CONFIG_PATH_ENV) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), "Loaded config from {}", defaults::CONFIG_PATH_ENV);
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from {}, falling back", defaults::CONFIG_PATH_ENV);
                    }
                }
            } else {
                warn!(path = %path, "{} points to non-existent file, falling back", defaults::CONFIG_PATH_ENV);
            }
        }

        // 2. Check ./agri_config.toml
        let local = PathBuf::from(defaults::CONFIG_FILE_NAME);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!("Loaded config from ./{}", defaults::CONFIG_FILE_NAME);
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./{}, using defaults", defaults::CONFIG_FILE_NAME);
                }
            }
        }

        // 3. Defaults
        info!("No {} found, using built-in defaults", defaults::CONFIG_FILE_NAME);
        Self::default()
    }

    /// Load and validate a specific TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        let config: Self =
            toml::from_str(&contents).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Apply environment overrides (`AGRI_SERVER_ADDR`, `AGRI_AGENT_API_KEY`).
    pub fn apply_env_overrides(&mut self) {
        if let Ok(addr) = std::env::var(defaults::SERVER_ADDR_ENV) {
            if !addr.trim().is_empty() {
                self.server.addr = addr;
            }
        }
        if self.agents.api_key.is_empty() {
            if let Ok(key) = std::env::var(defaults::AGENT_API_KEY_ENV) {
                self.agents.api_key = key;
            }
        }
    }

    /// Validate cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        if self.server.addr.trim().is_empty() {
            errors.push("server.addr must not be empty".to_string());
        }

        let p = &self.pipeline;
        if !p.price_volatility.is_finite() {
            errors.push(format!(
                "pipeline.price_volatility must be finite (got {})",
                p.price_volatility
            ));
        }
        if !p.hours_since_harvest.is_finite() || p.hours_since_harvest < 0.0 {
            errors.push(format!(
                "pipeline.hours_since_harvest must be a finite value >= 0 (got {})",
                p.hours_since_harvest
            ));
        }

        let a = &self.agents;
        if a.backend == AgentBackend::Http {
            if a.base_url.trim().is_empty() {
                errors.push("agents.base_url is required when agents.backend = \"http\"".to_string());
            }
            if a.request_timeout_secs == 0 {
                errors.push("agents.request_timeout_secs must be > 0".to_string());
            }
        }

        if self.storage.backend == StorageBackend::Sled && self.storage.path.trim().is_empty() {
            errors.push("storage.path is required when storage.backend = \"sled\"".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config I/O error ({}): {}", .0.display(), .1)]
    Io(PathBuf, #[source] std::io::Error),
    #[error("Config parse error ({}): {}", .0.display(), .1)]
    Parse(PathBuf, #[source] toml::de::Error),
    #[error("Config serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Config validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),
}

// ============================================================================
// Server
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server bind address.
    ///
    /// Can be overridden by `AGRI_SERVER_ADDR` env var or `--addr` CLI flag.
    #[serde(default = "default_server_addr")]
    pub addr: String,
}

fn default_server_addr() -> String {
    defaults::DEFAULT_SERVER_ADDR.to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: default_server_addr(),
        }
    }
}

// ============================================================================
// Pipeline
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Per-stage timeout in seconds; 0 disables it
    pub stage_timeout_secs: u64,
    /// Market volatility fed to the crop risk score
    pub price_volatility: f64,
    /// Hours since harvest fed to the shelf-life estimate
    pub hours_since_harvest: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            stage_timeout_secs: DEFAULT_STAGE_TIMEOUT_SECS,
            price_volatility: DEFAULT_PRICE_VOLATILITY,
            hours_since_harvest: DEFAULT_HOURS_SINCE_HARVEST,
        }
    }
}

impl PipelineConfig {
    pub fn stage_timeout(&self) -> Option<Duration> {
        (self.stage_timeout_secs > 0).then(|| Duration::from_secs(self.stage_timeout_secs))
    }

    pub fn settings(&self) -> PipelineSettings {
        PipelineSettings {
            stage_timeout: self.stage_timeout(),
            price_volatility: self.price_volatility,
            hours_since_harvest: self.hours_since_harvest,
        }
    }
}

// ============================================================================
// Agents
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentBackend {
    #[default]
    Simulated,
    Http,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentsConfig {
    pub backend: AgentBackend,
    /// Agent gateway root, e.g. `https://agents.internal:9000`
    pub base_url: String,
    /// Bearer token; falls back to `AGRI_AGENT_API_KEY`
    pub api_key: String,
    pub request_timeout_secs: u64,
    /// Simulated backend only
    pub delays_ms: StageDelays,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            backend: AgentBackend::Simulated,
            base_url: String::new(),
            api_key: String::new(),
            request_timeout_secs: defaults::AGENT_REQUEST_TIMEOUT_SECS,
            delays_ms: StageDelays::default(),
        }
    }
}

impl AgentsConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Simulated per-stage delays in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageDelays {
    pub farmer_interaction: u64,
    pub crop_prediction: u64,
    pub weather_intelligence: u64,
    pub field_operations: u64,
    pub decision_orchestrator: u64,
    pub explanation_compliance: u64,
}

impl Default for StageDelays {
    fn default() -> Self {
        let [farmer_interaction, crop_prediction, weather_intelligence, field_operations, decision_orchestrator, explanation_compliance] =
            DEFAULT_STAGE_DELAYS_MS;
        Self {
            farmer_interaction,
            crop_prediction,
            weather_intelligence,
            field_operations,
            decision_orchestrator,
            explanation_compliance,
        }
    }
}

impl StageDelays {
    /// Delays in stage order.
    pub const fn as_array(&self) -> [u64; 6] {
        [
            self.farmer_interaction,
            self.crop_prediction,
            self.weather_intelligence,
            self.field_operations,
            self.decision_orchestrator,
            self.explanation_compliance,
        ]
    }
}

// ============================================================================
// Storage
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    #[default]
    Sled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Sled,
            path: defaults::DEFAULT_STORAGE_PATH.to_string(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
