//! Centralized default values for IntentGate configuration.

use std::time::Duration;

/// Opening delimiter of user intent inside user messages.
pub const DEFAULT_MARKER_OPEN: &str = "<userPrompt>";
/// Closing delimiter of user intent inside user messages.
pub const DEFAULT_MARKER_CLOSE: &str = "</userPrompt>";

pub const DEFAULT_ORACLE_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_ORACLE_MODEL: &str = "gpt-4o";
pub const DEFAULT_API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const DEFAULT_MAX_TOKENS: u32 = 10;
pub const DEFAULT_TEMPERATURE: f32 = 0.1;

pub const DEFAULT_STATE_PATH: &str = "./proxy_state.json";
pub const DEFAULT_INTERCEPT_HOST: &str = "githubcopilot.com";
pub const DEFAULT_INTERCEPT_PATH_PREFIX: &str = "/chat/completions";
pub const DEFAULT_BIND: &str = "127.0.0.1:8000";

/// Timing defaults. Every duration in the config falls back to one of these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntentGateDefaults {
    /// Upper bound on a single oracle query.
    pub oracle_timeout: Duration,

    /// How often the state watcher re-reads the state file.
    pub state_poll_interval: Duration,

    /// Time allowed for in-flight requests when the server shuts down.
    pub shutdown_timeout: Duration,
}

impl Default for IntentGateDefaults {
    fn default() -> Self {
        Self {
            oracle_timeout: Duration::from_secs(30),
            state_poll_interval: Duration::from_secs(1),
            shutdown_timeout: Duration::from_secs(10),
        }
    }
}
