//! Decision records and where they go.
//!
//! Every evaluated response produces exactly one [`Decision`]. The pipeline
//! hands it to each configured [`DecisionSink`]; sink failures are logged and
//! never change the outcome of the flow.
//!
//! ```json
//! {
//!   "timestamp": "2025-06-01T12:00:00.123456Z",
//!   "request_url": "https://api.individual.githubcopilot.com/chat/completions",
//!   "tool_calls": [{"id": "call_1", "type": "function",
//!                   "function": {"name": "read_file", "arguments": "{...}"}}],
//!   "decision": "blocked",
//!   "reason": "alignment check failed: ...",
//!   "oracle_elapsed_ms": 812
//! }
//! ```

use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::conversation::ToolCall;

// ─────────────────────────────────────────────────────────────────────────────
// Decision
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// Response forwarded unchanged after evaluation (or filtering disabled).
    Allowed,
    /// Response replaced by a synthetic completion.
    Blocked,
    /// Response carried no tool calls; nothing was evaluated.
    Skipped,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Allowed => "allowed",
            Outcome::Blocked => "blocked",
            Outcome::Skipped => "skipped",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable record of one gated response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "request_url")]
    pub subject_url: String,
    pub tool_calls: Vec<ToolCall>,
    #[serde(rename = "decision")]
    pub outcome: Outcome,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oracle_elapsed_ms: Option<u64>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Sinks
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize decision: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Destination for decision records.
#[async_trait]
pub trait DecisionSink: Send + Sync {
    /// Persists or emits one decision.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError`] if the record could not be written.
    async fn record(&self, decision: &Decision) -> Result<(), AuditError>;

    /// Sink name for logs.
    fn name(&self) -> &'static str;
}

/// Writes one pretty-printed JSON file per decision into a directory.
///
/// Files are named `decision_<timestamp>_<id>.json`; the random suffix keeps
/// concurrent decisions in the same microsecond apart.
#[derive(Debug, Clone)]
pub struct JsonDirSink {
    directory: PathBuf,
}

impl JsonDirSink {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &std::path::Path {
        &self.directory
    }

    fn file_name(decision: &Decision) -> String {
        let id = uuid::Uuid::new_v4().simple().to_string();
        format!(
            "decision_{}_{}.json",
            decision.timestamp.format("%Y%m%dT%H%M%S%.6fZ"),
            &id[..8]
        )
    }
}

#[async_trait]
impl DecisionSink for JsonDirSink {
    async fn record(&self, decision: &Decision) -> Result<(), AuditError> {
        tokio::fs::create_dir_all(&self.directory)
            .await
            .map_err(|source| AuditError::Io {
                path: self.directory.display().to_string(),
                source,
            })?;

        let path = self.directory.join(Self::file_name(decision));
        let json = serde_json::to_vec_pretty(decision)?;
        tokio::fs::write(&path, json)
            .await
            .map_err(|source| AuditError::Io {
                path: path.display().to_string(),
                source,
            })?;

        debug!(path = %path.display(), "Decision written");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "json_dir"
    }
}

/// Keeps decisions in memory. Used by tests and the offline evaluator.
#[derive(Debug, Default)]
pub struct MemorySink {
    decisions: Mutex<Vec<Decision>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decisions(&self) -> Vec<Decision> {
        self.decisions.lock().clone()
    }

    pub fn last(&self) -> Option<Decision> {
        self.decisions.lock().last().cloned()
    }
}

#[async_trait]
impl DecisionSink for MemorySink {
    async fn record(&self, decision: &Decision) -> Result<(), AuditError> {
        self.decisions.lock().push(decision.clone());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Emits one structured log line per decision. Arguments are not logged.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

#[async_trait]
impl DecisionSink for TracingSink {
    async fn record(&self, decision: &Decision) -> Result<(), AuditError> {
        let tools: Vec<&str> = decision.tool_calls.iter().map(|c| c.name()).collect();
        info!(
            outcome = %decision.outcome,
            url = %decision.subject_url,
            tools = ?tools,
            reason = decision.reason.as_deref().unwrap_or(""),
            oracle_elapsed_ms = decision.oracle_elapsed_ms,
            "Decision"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "tracing"
    }
}
