//! Error type for the `intentgate` binary.
//!
//! Library errors convert in via `#[from]`; [`CliError::exit_code`] maps each
//! failure to the process exit status.

use std::path::PathBuf;

use intentgate_core::config::ConfigError;
use intentgate_core::oracle::OracleError;
use intentgate_core::state::StateError;

/// Exit status when `evaluate` blocks the response.
pub const EXIT_BLOCKED: i32 = 2;

/// Errors surfaced by the CLI commands.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration could not be loaded or failed validation.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The oracle client could not be constructed.
    #[error("oracle setup failed: {0}")]
    Oracle(#[from] OracleError),

    /// The state file could not be read or written.
    #[error(transparent)]
    State(#[from] StateError),

    /// An input file for `evaluate` could not be read.
    #[error("failed to read {}: {source}", path.display())]
    ReadInput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The listener could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The HTTP service stopped with an error.
    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),

    /// Output could not be serialized.
    #[error("failed to encode output: {0}")]
    Encode(#[from] serde_json::Error),
}

impl CliError {
    /// Process exit status for this error.
    ///
    /// Configuration problems exit with 78 (`EX_CONFIG`); everything else
    /// with 1. Status 2 is reserved for a blocked `evaluate` result.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Config(_) => 78,
            _ => 1,
        }
    }
}
