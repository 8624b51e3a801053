//! CLI argument types for `intentgate serve`, `evaluate` and `state`.
//!
//! Defined apart from `main.rs` so integration tests can parse them directly.

use std::path::PathBuf;

use clap::{Args, Subcommand};

// ─────────────────────────────────────────────────────────────────────────────
// Serve
// ─────────────────────────────────────────────────────────────────────────────

/// Arguments for `intentgate serve`.
///
/// Runs the filter service that the host proxy calls once per completed
/// model response.
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Config file (default: search `INTENTGATE_CONFIG` and standard paths).
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Listen address, overriding `server.bind`.
    #[arg(long)]
    pub bind: Option<String>,

    /// Enable debug logging.
    #[arg(long)]
    pub verbose: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// Evaluate
// ─────────────────────────────────────────────────────────────────────────────

/// Arguments for `intentgate evaluate`.
///
/// Runs one flow offline and prints its decision. Exits 2 when blocked.
#[derive(Args, Debug)]
pub struct EvaluateArgs {
    /// Chat-completions request body (JSON with a `messages` array).
    #[arg(long)]
    pub request: PathBuf,

    /// Captured response body (event stream text).
    #[arg(long)]
    pub response: PathBuf,

    /// URL recorded in the decision.
    #[arg(long, default_value = "https://api.githubcopilot.com/chat/completions")]
    pub url: String,

    /// Config file.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable debug logging.
    #[arg(long)]
    pub verbose: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// State
// ─────────────────────────────────────────────────────────────────────────────

/// Arguments for `intentgate state`.
#[derive(Args, Debug)]
pub struct StateArgs {
    #[command(subcommand)]
    pub action: StateAction,

    /// State file (default: `state.path` from config).
    #[arg(long, global = true)]
    pub state_file: Option<PathBuf>,

    /// Config file used to locate the state file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

/// Kill-switch operations.
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateAction {
    /// Print the effective state.
    Show,
    /// Turn filtering on.
    Enable,
    /// Turn filtering off.
    Disable,
    /// Create the state file with filtering on, if missing.
    Init,
}
