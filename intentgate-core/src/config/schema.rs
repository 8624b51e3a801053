//! Configuration schema.
//!
//! Every section is optional; an empty mapping (`schema: 1`) yields the
//! built-in defaults from [`super::defaults`].

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use super::defaults::*;

fn default_schema() -> u32 {
    1
}

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Schema version. Only `1` is supported.
    #[serde(default = "default_schema")]
    pub schema: u32,

    /// Tool names whose results count as trusted evidence.
    #[serde(default)]
    pub trusted_tools: Vec<String>,

    #[serde(default)]
    pub user_prompt_marker: MarkerConfig,

    #[serde(default)]
    pub oracle: OracleConfig,

    #[serde(default)]
    pub state: StateConfig,

    #[serde(default)]
    pub intercept: InterceptConfig,

    #[serde(default)]
    pub audit: AuditConfig,

    #[serde(default)]
    pub server: ServerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            schema: default_schema(),
            trusted_tools: Vec::new(),
            user_prompt_marker: MarkerConfig::default(),
            oracle: OracleConfig::default(),
            state: StateConfig::default(),
            intercept: InterceptConfig::default(),
            audit: AuditConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Sections
// ─────────────────────────────────────────────────────────────────────────────

/// Delimiters around user intent in user messages.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MarkerConfig {
    pub open: String,
    pub close: String,
}

impl Default for MarkerConfig {
    fn default() -> Self {
        Self {
            open: DEFAULT_MARKER_OPEN.to_string(),
            close: DEFAULT_MARKER_CLOSE.to_string(),
        }
    }
}

/// Which oracle adapter to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OracleBackend {
    /// OpenAI-compatible `/chat/completions`.
    #[default]
    OpenAi,
    /// Scripted local oracle; answers every query with `mock_reply`.
    Mock,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    pub backend: OracleBackend,
    pub base_url: String,
    pub model: String,
    /// Name of the environment variable holding the bearer token.
    pub api_key_env: String,
    pub max_tokens: u32,
    pub temperature: f32,
    #[serde(deserialize_with = "super::duration_format::deserialize")]
    pub timeout: Duration,
    /// Reply used by the mock backend (default `True`).
    pub mock_reply: Option<String>,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            backend: OracleBackend::OpenAi,
            base_url: DEFAULT_ORACLE_BASE_URL.to_string(),
            model: DEFAULT_ORACLE_MODEL.to_string(),
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            timeout: IntentGateDefaults::default().oracle_timeout,
            mock_reply: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    /// JSON state file toggled by the editor extension or `intentgate state`.
    pub path: PathBuf,
    #[serde(deserialize_with = "super::duration_format::deserialize")]
    pub poll_interval: Duration,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_STATE_PATH),
            poll_interval: IntentGateDefaults::default().state_poll_interval,
        }
    }
}

/// Which flows are subject to gating.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InterceptConfig {
    /// Host suffixes, matched on label boundaries.
    pub hosts: Vec<String>,
    pub path_prefix: String,
}

impl Default for InterceptConfig {
    fn default() -> Self {
        Self {
            hosts: vec![DEFAULT_INTERCEPT_HOST.to_string()],
            path_prefix: DEFAULT_INTERCEPT_PATH_PREFIX.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Directory for one JSON file per decision. Unset disables file output.
    pub directory: Option<PathBuf>,
    /// Emit a structured log line per decision.
    pub log_decisions: bool,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            directory: None,
            log_decisions: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address of the filter service.
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
        }
    }
}
