//! Interception pipeline.
//!
//! Takes one completed model response plus the request that produced it and
//! yields exactly one action and exactly one [`Decision`].
//!
//! ```text
//!  response body ──▶ reconstruct_tool_calls
//!                         │
//!                 none ───┴──▶ Skipped   (pass through)
//!                         │
//!     no request messages ┴──▶ Skipped   (pass through, no oracle)
//!                         │
//!        kill-switch off ─┴──▶ Allowed   (pass through, no oracle)
//!                         │
//!  request messages + synthetic assistant turn ──▶ PolicyEvaluator
//!                         │
//!             allowed ────┴──▶ Allowed   (pass through)
//!             denied  ───────▶ Blocked   (replace with synthetic completion)
//!
//!  every branch ──▶ DecisionSink(s)
//! ```
//!
//! Nothing here fails: stream errors are skipped, oracle errors fail closed,
//! and sink errors are logged.

pub mod blocking;
pub mod scope;

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, warn};

use crate::audit::{Decision, DecisionSink, Outcome};
use crate::conversation::{Context, Message, ToolCall};
use crate::metrics::IntentGateMetrics;
use crate::policy::PolicyEvaluator;
use crate::state::ProxyStateHandle;
use crate::stream::reconstruct_tool_calls;

pub use blocking::{BLOCKED_COMPLETION_ID, BlockingResponse, blocked_completion};
pub use scope::InterceptScope;

pub const REASON_NO_TOOL_CALLS: &str = "no tool calls in response";
pub const REASON_NO_MESSAGES: &str = "no messages in request";
pub const REASON_FILTERING_DISABLED: &str = "filtering disabled";

// ─────────────────────────────────────────────────────────────────────────────
// Flow Types
// ─────────────────────────────────────────────────────────────────────────────

/// One completed request/response pair handed over by the host proxy.
#[derive(Debug, Clone, PartialEq)]
pub struct InterceptedFlow {
    pub url: String,
    /// Message history of the originating request.
    pub messages: Vec<Message>,
    /// Full response body (event stream text).
    pub response_body: String,
}

impl InterceptedFlow {
    pub fn new(
        url: impl Into<String>,
        messages: Vec<Message>,
        response_body: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            messages,
            response_body: response_body.into(),
        }
    }

    /// Builds a flow from the raw request JSON.
    ///
    /// The `messages` array is taken from the request. A body that is not
    /// JSON, has no `messages`, or whose messages do not parse yields an
    /// empty history.
    pub fn from_request_body(
        url: impl Into<String>,
        request_body: &str,
        response_body: impl Into<String>,
    ) -> Self {
        Self::new(url, messages_from_request(request_body), response_body)
    }
}

/// Extracts `messages` from a chat-completions request body.
pub fn messages_from_request(request_body: &str) -> Vec<Message> {
    let parsed: Value = match serde_json::from_str(request_body) {
        Ok(v) => v,
        Err(e) => {
            debug!(error = %e, "Request body is not JSON, using empty history");
            return Vec::new();
        }
    };
    match parsed.get("messages").cloned() {
        Some(messages) => serde_json::from_value(messages).unwrap_or_else(|e| {
            warn!(error = %e, "Request messages did not parse, using empty history");
            Vec::new()
        }),
        None => Vec::new(),
    }
}

/// What the host should do with the response.
#[derive(Debug, Clone, PartialEq)]
pub enum FlowAction {
    /// Forward the original response unchanged.
    PassThrough,
    /// Discard the original response and send this instead.
    Replace(BlockingResponse),
}

/// Result of processing one flow.
#[derive(Debug, Clone, PartialEq)]
pub struct Interception {
    pub action: FlowAction,
    pub decision: Decision,
}

// ─────────────────────────────────────────────────────────────────────────────
// Pipeline
// ─────────────────────────────────────────────────────────────────────────────

/// Composes reconstruction, the kill-switch, the evaluator and the sinks.
///
/// `Send + Sync`; share one instance behind `Arc` across all flows.
pub struct InterceptionPipeline {
    evaluator: PolicyEvaluator,
    state: Arc<ProxyStateHandle>,
    sinks: Vec<Arc<dyn DecisionSink>>,
    metrics: Option<Arc<IntentGateMetrics>>,
}

impl InterceptionPipeline {
    pub fn new(evaluator: PolicyEvaluator, state: Arc<ProxyStateHandle>) -> Self {
        Self {
            evaluator,
            state,
            sinks: Vec::new(),
            metrics: None,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn DecisionSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<IntentGateMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn state(&self) -> &Arc<ProxyStateHandle> {
        &self.state
    }

    /// Processes one flow. Always returns an action and a decision.
    #[tracing::instrument(skip_all, fields(url = %flow.url))]
    pub async fn process(&self, flow: &InterceptedFlow) -> Interception {
        let tool_calls = reconstruct_tool_calls(&flow.response_body);

        let interception = if tool_calls.is_empty() {
            debug!("No tool calls in response");
            pass(self.decision(flow, Vec::new(), Outcome::Skipped, REASON_NO_TOOL_CALLS, None))
        } else if flow.messages.is_empty() {
            debug!(tool_calls = tool_calls.len(), "No messages in request, nothing to judge against");
            pass(self.decision(flow, tool_calls, Outcome::Skipped, REASON_NO_MESSAGES, None))
        } else if !self.state.is_enabled() {
            debug!(tool_calls = tool_calls.len(), "Filtering disabled, passing through");
            pass(self.decision(flow, tool_calls, Outcome::Allowed, REASON_FILTERING_DISABLED, None))
        } else {
            self.evaluate(flow, tool_calls).await
        };

        self.emit(&interception.decision).await;
        interception
    }

    async fn evaluate(&self, flow: &InterceptedFlow, tool_calls: Vec<ToolCall>) -> Interception {
        let mut context = Context::new(flow.messages.clone());
        context.push(Message::assistant_tool_calls(tool_calls.clone()));

        let verdict = self.evaluator.evaluate(&context).await;
        let elapsed_ms = verdict.oracle_elapsed_ms();

        if verdict.allowed {
            pass(self.decision(flow, tool_calls, Outcome::Allowed, &verdict.reason, elapsed_ms))
        } else {
            let decision =
                self.decision(flow, tool_calls, Outcome::Blocked, &verdict.reason, elapsed_ms);
            Interception {
                action: FlowAction::Replace(BlockingResponse::new(
                    &verdict.reason,
                    decision.timestamp,
                )),
                decision,
            }
        }
    }

    fn decision(
        &self,
        flow: &InterceptedFlow,
        tool_calls: Vec<ToolCall>,
        outcome: Outcome,
        reason: &str,
        oracle_elapsed_ms: Option<u64>,
    ) -> Decision {
        Decision {
            timestamp: Utc::now(),
            subject_url: flow.url.clone(),
            tool_calls,
            outcome,
            reason: Some(reason.to_string()),
            oracle_elapsed_ms,
        }
    }

    async fn emit(&self, decision: &Decision) {
        if let Some(ref metrics) = self.metrics {
            metrics.record_decision(decision.outcome.as_str());
        }
        for sink in &self.sinks {
            if let Err(e) = sink.record(decision).await {
                warn!(sink = sink.name(), error = %e, "Failed to record decision");
            }
        }
    }
}

fn pass(decision: Decision) -> Interception {
    Interception {
        action: FlowAction::PassThrough,
        decision,
    }
}
