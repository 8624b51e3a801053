//! IntentGate CLI entry point.
//!
//! Dispatches to `serve` (filter service), `evaluate` (offline one-shot
//! decision) or `state` (kill-switch file).

use clap::{Parser, Subcommand};

use intentgate::cli::{EvaluateArgs, ServeArgs, StateArgs};
use intentgate::{commands, init_tracing};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Definitions
// ─────────────────────────────────────────────────────────────────────────────

/// IntentGate: gates AI assistant tool calls on user intent and trusted context.
#[derive(Parser)]
#[command(name = "intentgate", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the filter service for the intercepting proxy.
    Serve(ServeArgs),
    /// Evaluate one captured request/response pair and print the decision.
    Evaluate(EvaluateArgs),
    /// Show or toggle the filtering kill-switch.
    State(StateArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Entry Point
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let (name, result) = match cli.command {
        Commands::Serve(args) => {
            init_tracing(args.verbose);
            ("serve", commands::run_serve(args).await)
        }
        Commands::Evaluate(args) => {
            init_tracing(args.verbose);
            ("evaluate", commands::run_evaluate(args).await)
        }
        Commands::State(args) => {
            init_tracing(false);
            ("state", commands::run_state(args))
        }
    };

    let code = match result {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, command = name, "command failed");
            eprintln!("intentgate {name}: {e}");
            e.exit_code()
        }
    };

    std::process::exit(code);
}
