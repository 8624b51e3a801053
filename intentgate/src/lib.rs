//! IntentGate filter service and CLI.
//!
//! Hosts the `intentgate-core` pipeline behind an HTTP interface for the
//! intercepting proxy, plus offline evaluation and kill-switch commands.

pub mod app;
pub mod cli;
pub mod commands;
pub mod error;
pub mod server;

/// Initialise tracing subscriber with stderr output.
///
/// When `verbose` is true, sets filter to `debug`. Otherwise, respects
/// `RUST_LOG` (defaulting to `info`).
pub fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
