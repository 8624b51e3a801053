//! Subcommand implementations.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use intentgate_core::audit::{Decision, Outcome};
use intentgate_core::config::load_or_default;
use intentgate_core::pipeline::InterceptedFlow;
use intentgate_core::state::{
    ProxyStateHandle, StateWatcher, ensure_state_file, observe, write_state_file,
};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::app::App;
use crate::cli::{EvaluateArgs, ServeArgs, StateAction, StateArgs};
use crate::error::{CliError, EXIT_BLOCKED};
use crate::server;

// ─────────────────────────────────────────────────────────────────────────────
// serve
// ─────────────────────────────────────────────────────────────────────────────

/// Runs the filter service until SIGINT or SIGTERM.
///
/// # Errors
///
/// Returns [`CliError`] if configuration, oracle setup or binding fails.
pub async fn run_serve(args: ServeArgs) -> Result<i32, CliError> {
    let mut config = load_or_default(args.config.as_deref())?;
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }

    match ensure_state_file(&config.state.path) {
        Ok(true) => info!(path = %config.state.path.display(), "Created state file"),
        Ok(false) => {}
        Err(e) => warn!(error = %e, "Could not create state file, filtering stays enabled"),
    }

    let bind = config.server.bind.clone();
    let state_path = config.state.path.clone();
    let poll_interval = config.state.poll_interval;
    let app = Arc::new(App::build(config)?);

    let shutdown = CancellationToken::new();
    setup_signal_handlers(shutdown.clone());

    let watcher =
        StateWatcher::new(state_path, poll_interval, app.state.clone()).spawn(shutdown.clone());

    let result = server::serve(app, &bind, shutdown.clone()).await;
    shutdown.cancel();
    if let Err(e) = watcher.await {
        warn!(error = %e, "State watcher task ended abnormally");
    }

    result.map(|()| 0)
}

/// Cancels `shutdown` on SIGINT, and on SIGTERM where available.
fn setup_signal_handlers(shutdown: CancellationToken) {
    let shutdown_sigint = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received SIGINT (Ctrl+C), initiating graceful shutdown");
                shutdown_sigint.cancel();
            }
            Err(e) => error!(error = %e, "Failed to listen for SIGINT"),
        }
    });

    #[cfg(unix)]
    {
        tokio::spawn(async move {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                    info!("Received SIGTERM, initiating graceful shutdown");
                    shutdown.cancel();
                }
                Err(e) => error!(error = %e, "Failed to listen for SIGTERM"),
            }
        });
    }

    #[cfg(not(unix))]
    let _ = shutdown;
}

// ─────────────────────────────────────────────────────────────────────────────
// evaluate
// ─────────────────────────────────────────────────────────────────────────────

/// Evaluates one captured flow and prints its decision as JSON.
///
/// The kill-switch is read once from the configured state file. Returns
/// [`EXIT_BLOCKED`] when the response would be replaced.
///
/// # Errors
///
/// Returns [`CliError`] if configuration or an input file cannot be read.
pub async fn run_evaluate(args: EvaluateArgs) -> Result<i32, CliError> {
    let config = load_or_default(args.config.as_deref())?;
    let request = read_input(&args.request)?;
    let response = read_input(&args.response)?;

    let app = App::build(config)?;
    app.state.apply(observe(&app.config.state.path));

    let flow = InterceptedFlow::from_request_body(args.url, &request, response);
    let decision = app.pipeline.process(&flow).await.decision;

    println!("{}", serde_json::to_string_pretty(&decision)?);
    Ok(exit_code_for(&decision))
}

/// Exit status for an evaluated decision.
pub fn exit_code_for(decision: &Decision) -> i32 {
    match decision.outcome {
        Outcome::Blocked => EXIT_BLOCKED,
        Outcome::Allowed | Outcome::Skipped => 0,
    }
}

fn read_input(path: &Path) -> Result<String, CliError> {
    std::fs::read_to_string(path).map_err(|source| CliError::ReadInput {
        path: path.to_path_buf(),
        source,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// state
// ─────────────────────────────────────────────────────────────────────────────

/// Shows or toggles the kill-switch file and prints the result as JSON.
///
/// # Errors
///
/// Returns [`CliError`] if configuration cannot be loaded or the state file
/// cannot be written.
pub fn run_state(args: StateArgs) -> Result<i32, CliError> {
    let path = resolve_state_path(args.state_file, args.config.as_deref())?;
    let output = apply_state_action(args.action, &path)?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(0)
}

/// Performs `action` on the state file at `path` and describes the outcome.
///
/// # Errors
///
/// Returns [`CliError::State`] if a write fails.
pub fn apply_state_action(
    action: StateAction,
    path: &Path,
) -> Result<serde_json::Value, CliError> {
    match action {
        StateAction::Show => {
            let handle = ProxyStateHandle::new();
            handle.apply(observe(path));
            let snapshot = handle.snapshot();
            Ok(json!({
                "path": path.display().to_string(),
                "enabled": snapshot.enabled,
                "timestamp": snapshot.source_timestamp,
                "error": snapshot.last_error,
            }))
        }
        StateAction::Enable | StateAction::Disable => {
            let record = write_state_file(path, action == StateAction::Enable)?;
            info!(path = %path.display(), enabled = record.enabled, "State file updated");
            Ok(json!({
                "path": path.display().to_string(),
                "enabled": record.enabled,
                "timestamp": record.timestamp,
            }))
        }
        StateAction::Init => {
            let created = ensure_state_file(path)?;
            Ok(json!({
                "path": path.display().to_string(),
                "created": created,
            }))
        }
    }
}

fn resolve_state_path(explicit: Option<PathBuf>, config: Option<&Path>) -> Result<PathBuf, CliError> {
    match explicit {
        Some(path) => Ok(path),
        None => Ok(load_or_default(config)?.state.path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decision(outcome: Outcome) -> Decision {
        serde_json::from_value(json!({
            "timestamp": "2025-06-01T12:00:00Z",
            "request_url": "https://api.githubcopilot.com/chat/completions",
            "tool_calls": [],
            "decision": outcome.as_str(),
            "reason": null,
        }))
        .unwrap()
    }

    #[test]
    fn test_exit_code_for_outcomes() {
        assert_eq!(exit_code_for(&decision(Outcome::Allowed)), 0);
        assert_eq!(exit_code_for(&decision(Outcome::Skipped)), 0);
        assert_eq!(exit_code_for(&decision(Outcome::Blocked)), EXIT_BLOCKED);
    }

    #[test]
    fn test_state_disable_then_show() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("proxy_state.json");

        let written = apply_state_action(StateAction::Disable, &path).unwrap();
        assert_eq!(written["enabled"], false);

        let shown = apply_state_action(StateAction::Show, &path).unwrap();
        assert_eq!(shown["enabled"], false);
        assert!(shown["timestamp"].is_string());
        assert!(shown["error"].is_null());
    }

    #[test]
    fn test_state_show_missing_file_is_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let shown = apply_state_action(StateAction::Show, &dir.path().join("nope.json")).unwrap();
        assert_eq!(shown["enabled"], true);
        assert!(shown["error"].is_string());
    }

    #[test]
    fn test_state_init_creates_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("proxy_state.json");

        assert_eq!(apply_state_action(StateAction::Init, &path).unwrap()["created"], true);
        assert_eq!(apply_state_action(StateAction::Init, &path).unwrap()["created"], false);
        let shown = apply_state_action(StateAction::Show, &path).unwrap();
        assert_eq!(shown["enabled"], true);
    }

    #[test]
    fn test_explicit_state_path_wins() {
        let path = resolve_state_path(Some(PathBuf::from("/tmp/x.json")), None).unwrap();
        assert_eq!(path, PathBuf::from("/tmp/x.json"));
    }
}
