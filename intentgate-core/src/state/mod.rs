//! Proxy state monitor (the filtering kill-switch).
//!
//! The authoritative enabled flag lives in a small JSON file toggled from
//! outside the process (editor extension, `intentgate state disable`).
//! [`StateWatcher`] polls it and feeds observations into a
//! [`ProxyStateHandle`], which every in-flight flow reads lock-free.
//!
//! ## State Machine
//!
//! ```text
//!                  first observation
//!  Uninitialized ─────────────────────▶ Synced ◀──┐
//!  (enabled)                               │      │ every later observation
//!                                          └──────┘
//!
//!  observation = Read(record)  → enabled = record.enabled
//!              = Failed(_)     → enabled = true
//! ```
//!
//! Reading the file can fail (missing, unreadable, corrupt). Every failure
//! resolves to `enabled = true`: a broken kill-switch keeps filtering on.

pub mod file;
pub mod watcher;

use std::sync::Arc;

use arc_swap::{ArcSwap, ArcSwapOption};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::info;

use crate::metrics::IntentGateMetrics;

pub use file::{ensure_state_file, observe, read_state_file, write_state_file};
pub use watcher::StateWatcher;

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// State file errors.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("state file I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("state file {path} is not valid JSON: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode state for {path}: {source}")]
    Serialize {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// Types
// ─────────────────────────────────────────────────────────────────────────────

/// On-disk shape of the state file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateRecord {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Free text; writers use RFC 3339. Non-string values are kept as their
    /// JSON text.
    #[serde(
        default,
        deserialize_with = "timestamp_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp: Option<String>,
}

fn default_enabled() -> bool {
    true
}

fn timestamp_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    })
}

/// One poll of the state file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    Read(StateRecord),
    /// The file could not be read or parsed.
    Failed(String),
}

impl Observation {
    /// The flag this observation resolves to.
    pub fn enabled(&self) -> bool {
        match self {
            Observation::Read(record) => record.enabled,
            Observation::Failed(_) => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    /// No observation applied yet.
    Uninitialized,
    Synced,
}

/// Snapshot of the kill-switch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProxyState {
    pub enabled: bool,
    /// When `enabled` last took its current value.
    pub last_changed_at: DateTime<Utc>,
    pub phase: SyncPhase,
    /// `timestamp` field of the last successfully read record.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_timestamp: Option<String>,
    /// Set while the last observation was a failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Handle
// ─────────────────────────────────────────────────────────────────────────────

/// Process-wide enabled flag with lock-free reads.
///
/// Single writer (the watcher, through [`apply`](Self::apply)), many readers.
pub struct ProxyStateHandle {
    state: ArcSwap<ProxyState>,
    metrics: ArcSwapOption<IntentGateMetrics>,
}

impl Default for ProxyStateHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl ProxyStateHandle {
    /// Creates an uninitialized handle. Filtering is enabled until the first
    /// observation says otherwise.
    pub fn new() -> Self {
        Self {
            state: ArcSwap::new(Arc::new(ProxyState {
                enabled: true,
                last_changed_at: Utc::now(),
                phase: SyncPhase::Uninitialized,
                source_timestamp: None,
                last_error: None,
            })),
            metrics: ArcSwapOption::empty(),
        }
    }

    /// Attach metrics; the filtering gauge tracks every applied change.
    pub fn set_metrics(&self, metrics: Arc<IntentGateMetrics>) {
        metrics.set_filtering_enabled(self.is_enabled());
        self.metrics.store(Some(metrics));
    }

    pub fn is_enabled(&self) -> bool {
        self.state.load().enabled
    }

    pub fn snapshot(&self) -> Arc<ProxyState> {
        self.state.load_full()
    }

    /// Applies one observation. Returns `true` if the enabled flag changed.
    pub fn apply(&self, observation: Observation) -> bool {
        let previous = self.state.load_full();
        let enabled = observation.enabled();
        let changed = previous.enabled != enabled;

        let (source_timestamp, last_error) = match observation {
            Observation::Read(record) => (record.timestamp, None),
            Observation::Failed(reason) => (previous.source_timestamp.clone(), Some(reason)),
        };

        let last_changed_at = if changed || previous.phase == SyncPhase::Uninitialized {
            Utc::now()
        } else {
            previous.last_changed_at
        };

        self.state.store(Arc::new(ProxyState {
            enabled,
            last_changed_at,
            phase: SyncPhase::Synced,
            source_timestamp,
            last_error,
        }));

        if changed {
            info!(enabled, "Proxy filtering {}", if enabled { "enabled" } else { "disabled" });
        }
        if let Some(metrics) = self.metrics.load_full() {
            metrics.set_filtering_enabled(enabled);
        }
        changed
    }
}
