//! HTTP filter service for the host proxy.
//!
//! The host proxy buffers each completed model response and posts it here
//! together with the originating request. The reply tells it whether to
//! forward the response or substitute the synthetic one.
//!
//! ```text
//!  POST /v1/intercept  {url, request_body | messages, response_body}
//!        ──▶ {"action":"pass"[, "decision"]}
//!        ──▶ {"action":"replace", "status", "content_type", "body", "decision"}
//!  GET  /v1/state      ProxyState snapshot
//!  GET  /health        liveness
//!  GET  /metrics       OpenMetrics text
//! ```

use std::sync::Arc;
use std::time::Instant;

use axum::{
    Json, Router,
    extract::State,
    http::{StatusCode, header},
    response::IntoResponse,
    routing::{get, post},
};
use intentgate_core::audit::Decision;
use intentgate_core::conversation::Message;
use intentgate_core::pipeline::{FlowAction, InterceptedFlow, messages_from_request};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::app::App;
use crate::error::CliError;

// ─────────────────────────────────────────────────────────────────────────────
// Wire Types
// ─────────────────────────────────────────────────────────────────────────────

/// Body of `POST /v1/intercept`.
///
/// History comes from `messages` when present, otherwise from the
/// `messages` array inside `request_body` (a JSON string or object).
#[derive(Debug, Deserialize)]
pub struct InterceptRequest {
    pub url: String,
    #[serde(default)]
    pub request_body: Option<Value>,
    #[serde(default)]
    pub messages: Option<Vec<Message>>,
    pub response_body: String,
}

impl InterceptRequest {
    fn into_flow(self) -> InterceptedFlow {
        let messages = match (self.messages, self.request_body) {
            (Some(messages), _) => messages,
            (None, Some(Value::String(raw))) => messages_from_request(&raw),
            (None, Some(other)) => messages_from_request(&other.to_string()),
            (None, None) => Vec::new(),
        };
        InterceptedFlow::new(self.url, messages, self.response_body)
    }
}

/// Reply of `POST /v1/intercept`.
#[derive(Debug, Serialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum InterceptResponse {
    Pass {
        #[serde(skip_serializing_if = "Option::is_none")]
        decision: Option<Decision>,
    },
    Replace {
        status: u16,
        content_type: &'static str,
        body: Value,
        decision: Decision,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Clone)]
struct ServerState {
    app: Arc<App>,
    started_at: Instant,
}

/// Builds the service router.
pub fn router(app: Arc<App>) -> Router {
    Router::new()
        .route("/v1/intercept", post(intercept_handler))
        .route("/v1/state", get(state_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(ServerState {
            app,
            started_at: Instant::now(),
        })
}

/// Serves `router(app)` on `bind` until `shutdown` is cancelled.
///
/// # Errors
///
/// Returns [`CliError::Bind`] if the address cannot be bound and
/// [`CliError::Serve`] if the server fails.
pub async fn serve(app: Arc<App>, bind: &str, shutdown: CancellationToken) -> Result<(), CliError> {
    let listener = TcpListener::bind(bind)
        .await
        .map_err(|source| CliError::Bind {
            addr: bind.to_string(),
            source,
        })?;

    info!(addr = %bind, "IntentGate filter listening");

    axum::serve(listener, router(app))
        .with_graceful_shutdown(async move {
            shutdown.cancelled().await;
            info!("Filter service shutting down");
        })
        .await
        .map_err(CliError::Serve)
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

async fn intercept_handler(
    State(state): State<ServerState>,
    Json(request): Json<InterceptRequest>,
) -> Json<InterceptResponse> {
    if !state.app.scope.matches_url(&request.url) {
        debug!(url = %request.url, "Out of scope, passing through");
        return Json(InterceptResponse::Pass { decision: None });
    }

    let flow = request.into_flow();
    let interception = state.app.pipeline.process(&flow).await;

    Json(match interception.action {
        FlowAction::PassThrough => InterceptResponse::Pass {
            decision: Some(interception.decision),
        },
        FlowAction::Replace(replacement) => InterceptResponse::Replace {
            status: replacement.status,
            content_type: replacement.content_type,
            body: replacement.body,
            decision: interception.decision,
        },
    })
}

async fn state_handler(State(state): State<ServerState>) -> impl IntoResponse {
    Json(state.app.state.snapshot().as_ref().clone())
}

async fn health_handler(State(state): State<ServerState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_seconds": state.started_at.elapsed().as_secs(),
    }))
}

async fn metrics_handler(State(state): State<ServerState>) -> impl IntoResponse {
    let mut buffer = String::new();

    if let Err(e) = prometheus_client::encoding::text::encode(&mut buffer, &state.app.registry) {
        error!(error = %e, "Failed to encode metrics");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to encode metrics: {}", e),
        )
            .into_response();
    }

    (
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            "application/openmetrics-text; version=1.0.0; charset=utf-8",
        )],
        buffer,
    )
        .into_response()
}
