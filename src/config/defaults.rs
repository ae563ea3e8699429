//! System-wide default constants.
//!
//! Grouped by subsystem for easy discovery.

// ============================================================================
// Server
// ============================================================================

/// Default HTTP listen address.
pub const DEFAULT_SERVER_ADDR: &str = "0.0.0.0:8080";

/// Env var overriding `[server] addr`.
pub const SERVER_ADDR_ENV: &str = "AGRI_SERVER_ADDR";

/// Env var with comma-separated CORS origins.
pub const CORS_ORIGINS_ENV: &str = "AGRI_CORS_ORIGINS";

/// Default page size for `GET /api/v1/pipelines`.
pub const DEFAULT_LIST_LIMIT: usize = 20;

/// Upper bound on `GET /api/v1/pipelines?limit=`.
pub const MAX_LIST_LIMIT: usize = 200;

// ============================================================================
// Config Discovery
// ============================================================================

/// Env var naming the config file.
pub const CONFIG_PATH_ENV: &str = "AGRI_CONFIG";

/// Config file looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "agri_config.toml";

// ============================================================================
// Agents
// ============================================================================

/// HTTP agent request timeout (seconds).
///
/// Independent of the per-stage timeout; whichever fires first wins.
pub const AGENT_REQUEST_TIMEOUT_SECS: u64 = 20;

/// Env var holding the agent gateway API key when not set in the file.
pub const AGENT_API_KEY_ENV: &str = "AGRI_AGENT_API_KEY";

// ============================================================================
// Storage
// ============================================================================

/// Default sled database directory.
pub const DEFAULT_STORAGE_PATH: &str = "./data/agri_progress";
