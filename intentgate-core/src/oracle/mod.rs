//! Boolean oracle abstraction.
//!
//! The natural-language judgment behind each policy check is delegated to an
//! external service. The gate only ever asks yes/no questions:
//!
//! ```text
//!   PolicyEvaluator ──OracleQuery──▶ dyn Oracle ──▶ reply text
//!                                                    │
//!                                    parse_verdict ◀─┘  ("true" ⇒ allowed)
//! ```
//!
//! # Adapters
//!
//! - [`ChatCompletionsOracle`] - OpenAI-compatible `/chat/completions` endpoint
//! - [`MockOracle`] - scripted replies for tests and local development

pub mod mock;
pub mod openai;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::config::{OracleBackend, OracleConfig};

pub use mock::MockOracle;
pub use openai::{ChatCompletionsOracle, OracleClientConfig};

// ─────────────────────────────────────────────────────────────────────────────
// Query Types
// ─────────────────────────────────────────────────────────────────────────────

/// Which policy stage a query belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    /// Do the pending tool calls match what the user asked for?
    Alignment,
    /// Are the arguments derivable from trusted evidence alone?
    Provenance,
}

impl CheckKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckKind::Alignment => "alignment",
            CheckKind::Provenance => "provenance",
        }
    }
}

impl fmt::Display for CheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single yes/no question for the oracle.
#[derive(Clone)]
pub struct OracleQuery {
    pub check: CheckKind,
    /// Full prompt text. Contains tool arguments and user content.
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

// Prompt text embeds tool arguments and user content; keep it out of logs.
impl fmt::Debug for OracleQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OracleQuery")
            .field("check", &self.check)
            .field("prompt_len", &self.prompt.len())
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Oracle failures. Every variant makes the asking check fail closed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OracleError {
    #[error("oracle transport error: {reason}")]
    Transport { reason: String },

    #[error("oracle did not answer within {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("oracle returned HTTP {status}")]
    HttpStatus { status: u16 },

    #[error("oracle reply malformed: {reason}")]
    MalformedReply { reason: String },

    #[error("oracle misconfigured: {reason}")]
    Config { reason: String },
}

impl OracleError {
    /// Short token for logs and decision reasons.
    pub fn kind(&self) -> &'static str {
        match self {
            OracleError::Transport { .. } => "transport",
            OracleError::Timeout { .. } => "timeout",
            OracleError::HttpStatus { .. } => "http_status",
            OracleError::MalformedReply { .. } => "malformed_reply",
            OracleError::Config { .. } => "config",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Trait
// ─────────────────────────────────────────────────────────────────────────────

/// A service that answers yes/no policy questions.
///
/// Implementations return the raw reply text; interpretation is done by
/// [`parse_verdict`] so every adapter shares one affirmative rule.
#[async_trait]
pub trait Oracle: Send + Sync {
    /// Submits one query and returns the reply text.
    ///
    /// # Errors
    ///
    /// Returns [`OracleError`] when no usable reply was obtained.
    async fn submit(&self, query: &OracleQuery) -> Result<String, OracleError>;

    /// Adapter name for logs.
    fn name(&self) -> &'static str;
}

/// Maps reply text to a verdict: any case-insensitive occurrence of `true`
/// is affirmative, anything else is not.
pub fn parse_verdict(reply: &str) -> bool {
    reply.to_ascii_lowercase().contains("true")
}

/// Builds the oracle adapter selected by configuration.
///
/// # Errors
///
/// Returns [`OracleError::Config`] when the HTTP client cannot be built.
pub fn build_oracle(config: &OracleConfig) -> Result<Arc<dyn Oracle>, OracleError> {
    match config.backend {
        OracleBackend::OpenAi => {
            let client_config = OracleClientConfig::from_oracle_config(config);
            Ok(Arc::new(ChatCompletionsOracle::new(client_config)?))
        }
        OracleBackend::Mock => Ok(Arc::new(MockOracle::always(
            config.mock_reply.clone().unwrap_or_else(|| "True".to_string()),
        ))),
    }
}
