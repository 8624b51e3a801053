//! Two-stage policy evaluator.
//!
//! Decides whether the tool calls of the most recent assistant turn may run.
//! Both stages ask the oracle a yes/no question; the order is fixed and a
//! failed stage short-circuits the rest.
//!
//! ## Stage Flow
//!
//! ```text
//! ┌─ Stage 0: Pending calls ──────────────────────┐
//! │  last assistant turn with tool_calls?         │
//! │  None / empty → Allow (no oracle call)        │
//! └───────────────────────────────────────────────┘
//!     │
//! ┌─ Stage 1: Alignment ──────────────────────────┐
//! │  marked user intent + pending call names      │
//! │  oracle says no / fails → Deny                │
//! └───────────────────────────────────────────────┘
//!     │
//! ┌─ Stage 2: Provenance ─────────────────────────┐
//! │  TrustedView + pending calls with arguments   │
//! │  oracle says no / fails → Deny                │
//! └───────────────────────────────────────────────┘
//!     │
//!   Allow
//! ```
//!
//! Oracle failures (transport, status, malformed reply, timeout) fail
//! closed. Each query is bounded by [`OracleSettings::timeout`].

pub mod prompts;

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{Config, ConfigError, OracleConfig};
use crate::conversation::{Context, ToolCall, TrustSet};
use crate::metrics::IntentGateMetrics;
use crate::oracle::{CheckKind, Oracle, OracleError, OracleQuery, parse_verdict};

pub use prompts::PromptMarker;

// ─────────────────────────────────────────────────────────────────────────────
// Types
// ─────────────────────────────────────────────────────────────────────────────

/// Per-query oracle invocation settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OracleSettings {
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout: Duration,
}

impl Default for OracleSettings {
    fn default() -> Self {
        Self::from(&OracleConfig::default())
    }
}

impl From<&OracleConfig> for OracleSettings {
    fn from(config: &OracleConfig) -> Self {
        Self {
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            timeout: config.timeout,
        }
    }
}

/// The stage that settled a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// No pending tool calls; allowed without consulting the oracle.
    NoToolCalls,
    Alignment,
    Provenance,
}

/// Outcome of a full two-stage evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyVerdict {
    pub allowed: bool,
    /// Stage that produced the verdict (the last stage run).
    pub stage: Stage,
    pub reason: String,
    pub oracle_calls: u32,
    /// Wall time spent waiting on the oracle across all calls.
    pub oracle_elapsed: Duration,
}

impl PolicyVerdict {
    /// Oracle time in milliseconds, or `None` when the oracle was not asked.
    pub fn oracle_elapsed_ms(&self) -> Option<u64> {
        (self.oracle_calls > 0).then(|| self.oracle_elapsed.as_millis() as u64)
    }
}

/// Result of one oracle-backed check.
struct CheckOutcome {
    allowed: bool,
    failure: Option<OracleError>,
    elapsed: Duration,
}

// ─────────────────────────────────────────────────────────────────────────────
// Evaluator
// ─────────────────────────────────────────────────────────────────────────────

/// Runs the alignment and provenance checks against an oracle.
///
/// Stateless between evaluations; share behind `Arc`.
pub struct PolicyEvaluator {
    oracle: Arc<dyn Oracle>,
    trust: TrustSet,
    marker: PromptMarker,
    settings: OracleSettings,
    metrics: Option<Arc<IntentGateMetrics>>,
}

impl PolicyEvaluator {
    pub fn new(oracle: Arc<dyn Oracle>, trust: TrustSet, marker: PromptMarker) -> Self {
        Self {
            oracle,
            trust,
            marker,
            settings: OracleSettings::default(),
            metrics: None,
        }
    }

    /// Builds an evaluator from loaded configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidMarker`] if the prompt marker is unusable.
    pub fn from_config(config: &Config, oracle: Arc<dyn Oracle>) -> Result<Self, ConfigError> {
        let marker = PromptMarker::from_config(&config.user_prompt_marker)?;
        let trust = TrustSet::from_iter(config.trusted_tools.iter().cloned());
        Ok(Self::new(oracle, trust, marker).with_settings(OracleSettings::from(&config.oracle)))
    }

    pub fn with_settings(mut self, settings: OracleSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<IntentGateMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn trust_set(&self) -> &TrustSet {
        &self.trust
    }

    /// Do the pending tool calls serve the user's marked intent?
    ///
    /// Vacuously `true` without consulting the oracle when the context holds
    /// no pending tool calls.
    pub async fn alignment_check(&self, context: &Context) -> bool {
        match pending_calls(context) {
            Some(calls) => self.run_alignment(context, calls).await.allowed,
            None => true,
        }
    }

    /// Alignment first, then: are the pending calls' arguments derivable from
    /// the trusted view alone?
    ///
    /// Returns `false` without a second oracle query when alignment fails.
    pub async fn provenance_check(&self, context: &Context) -> bool {
        self.evaluate(context).await.allowed
    }

    /// Runs both stages and reports which stage decided and why.
    pub async fn evaluate(&self, context: &Context) -> PolicyVerdict {
        let Some(calls) = pending_calls(context) else {
            debug!("No pending tool calls, allowing");
            return PolicyVerdict {
                allowed: true,
                stage: Stage::NoToolCalls,
                reason: "no pending tool calls".to_string(),
                oracle_calls: 0,
                oracle_elapsed: Duration::ZERO,
            };
        };

        let alignment = self.run_alignment(context, calls).await;
        if !alignment.allowed {
            let reason = match &alignment.failure {
                Some(e) => format!("alignment check failed: {}", e),
                None => "tool calls do not align with user intent".to_string(),
            };
            info!(stage = "alignment", tool_calls = calls.len(), reason = %reason, "Denied");
            return PolicyVerdict {
                allowed: false,
                stage: Stage::Alignment,
                reason,
                oracle_calls: 1,
                oracle_elapsed: alignment.elapsed,
            };
        }

        let provenance = self.run_provenance(context, calls).await;
        let elapsed = alignment.elapsed + provenance.elapsed;
        if !provenance.allowed {
            let reason = match &provenance.failure {
                Some(e) => format!("provenance check failed: {}", e),
                None => "tool call arguments are not derivable from trusted context".to_string(),
            };
            info!(stage = "provenance", tool_calls = calls.len(), reason = %reason, "Denied");
            return PolicyVerdict {
                allowed: false,
                stage: Stage::Provenance,
                reason,
                oracle_calls: 2,
                oracle_elapsed: elapsed,
            };
        }

        info!(tool_calls = calls.len(), "Allowed");
        PolicyVerdict {
            allowed: true,
            stage: Stage::Provenance,
            reason: "tool calls align with user intent and trusted context".to_string(),
            oracle_calls: 2,
            oracle_elapsed: elapsed,
        }
    }

    async fn run_alignment(&self, context: &Context, calls: &[ToolCall]) -> CheckOutcome {
        let intents: Vec<&str> = context
            .user_messages()
            .flat_map(|m| self.marker.extract(m.content_str()))
            .collect();
        debug!(intents = intents.len(), "Extracted marked user intent");

        let prompt = prompts::alignment_prompt(&intents, calls);
        self.ask(CheckKind::Alignment, prompt).await
    }

    async fn run_provenance(&self, context: &Context, calls: &[ToolCall]) -> CheckOutcome {
        let view = context.trusted_view(&self.trust);
        debug!(
            trusted_messages = view.len(),
            total_messages = context.len(),
            "Built trusted view"
        );

        let prompt = prompts::provenance_prompt(&view, calls);
        self.ask(CheckKind::Provenance, prompt).await
    }

    /// One bounded oracle round trip. Failures become a not-allowed outcome.
    async fn ask(&self, check: CheckKind, prompt: String) -> CheckOutcome {
        let query = OracleQuery {
            check,
            prompt,
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
        };

        let start = Instant::now();
        let result =
            match tokio::time::timeout(self.settings.timeout, self.oracle.submit(&query)).await {
                Ok(result) => result,
                Err(_) => Err(OracleError::Timeout {
                    timeout_ms: self.settings.timeout.as_millis() as u64,
                }),
            };
        let elapsed = start.elapsed();

        let outcome = match result {
            Ok(reply) => {
                let allowed = parse_verdict(&reply);
                debug!(check = %check, allowed, oracle = self.oracle.name(), "Oracle verdict");
                CheckOutcome {
                    allowed,
                    failure: None,
                    elapsed,
                }
            }
            Err(e) => {
                warn!(
                    check = %check,
                    error = %e,
                    kind = e.kind(),
                    oracle = self.oracle.name(),
                    "Oracle query failed, failing closed"
                );
                CheckOutcome {
                    allowed: false,
                    failure: Some(e),
                    elapsed,
                }
            }
        };

        if let Some(ref metrics) = self.metrics {
            let verdict = outcome.failure.is_none().then_some(outcome.allowed);
            metrics.record_oracle_query(check.as_str(), verdict, elapsed.as_secs_f64() * 1000.0);
        }

        outcome
    }
}

/// Pending calls of the last assistant turn, if there are any.
fn pending_calls(context: &Context) -> Option<&[ToolCall]> {
    context.last_tool_calls().filter(|calls| !calls.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MarkerConfig;
    use crate::conversation::Message;
    use crate::oracle::MockOracle;

    fn evaluator(oracle: Arc<MockOracle>, trusted: &[&str]) -> PolicyEvaluator {
        PolicyEvaluator::new(
            oracle,
            TrustSet::from_iter(trusted.iter().copied()),
            PromptMarker::from_config(&MarkerConfig::default()).unwrap(),
        )
    }

    fn pending(name: &str, args: &str) -> Context {
        Context::new(vec![
            Message::user("<userPrompt>Save the text in config.txt to notes.md</userPrompt>"),
            Message::assistant_tool_calls(vec![ToolCall::new("call_1", name, args)]),
        ])
    }

    #[tokio::test]
    async fn test_no_tool_calls_is_vacuously_allowed() {
        let oracle = Arc::new(MockOracle::instant_reject());
        let eval = evaluator(oracle.clone(), &[]);
        let ctx = Context::new(vec![Message::user("hi"), Message::assistant("hello")]);

        assert!(eval.alignment_check(&ctx).await);
        let verdict = eval.evaluate(&ctx).await;
        assert!(verdict.allowed);
        assert_eq!(verdict.stage, Stage::NoToolCalls);
        assert_eq!(verdict.oracle_elapsed_ms(), None);
        assert_eq!(oracle.call_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_tool_call_list_is_vacuously_allowed() {
        let oracle = Arc::new(MockOracle::instant_reject());
        let eval = evaluator(oracle.clone(), &[]);
        let ctx = Context::new(vec![Message::assistant_tool_calls(vec![])]);
        assert!(eval.provenance_check(&ctx).await);
        assert_eq!(oracle.call_count(), 0);
    }

    #[tokio::test]
    async fn test_alignment_failure_short_circuits() {
        let oracle = Arc::new(MockOracle::scripted(
            vec![Ok("False".to_string())],
            Ok("True".to_string()),
        ));
        let eval = evaluator(oracle.clone(), &[]);

        let verdict = eval.evaluate(&pending("delete_repo", "{}")).await;
        assert!(!verdict.allowed);
        assert_eq!(verdict.stage, Stage::Alignment);
        assert_eq!(verdict.oracle_calls, 1);
        assert_eq!(oracle.call_count(), 1);
        assert_eq!(oracle.asked(), vec![CheckKind::Alignment]);
    }

    #[tokio::test]
    async fn test_provenance_check_asks_alignment_first() {
        let oracle = Arc::new(MockOracle::scripted(
            vec![Ok("True".to_string()), Ok("False".to_string())],
            Ok("True".to_string()),
        ));
        let eval = evaluator(oracle.clone(), &[]);

        assert!(!eval.provenance_check(&pending("write_file", "{}")).await);
        assert_eq!(
            oracle.asked(),
            vec![CheckKind::Alignment, CheckKind::Provenance]
        );
    }

    #[tokio::test]
    async fn test_both_stages_pass() {
        let oracle = Arc::new(MockOracle::instant_approve());
        let eval = evaluator(oracle.clone(), &[]);

        let verdict = eval.evaluate(&pending("read_file", "{}")).await;
        assert!(verdict.allowed);
        assert_eq!(verdict.stage, Stage::Provenance);
        assert_eq!(verdict.oracle_calls, 2);
        assert!(verdict.oracle_elapsed_ms().is_some());
    }

    #[tokio::test]
    async fn test_oracle_error_fails_closed_with_reason() {
        let oracle = Arc::new(MockOracle::failing(OracleError::HttpStatus { status: 500 }));
        let eval = evaluator(oracle.clone(), &[]);

        let verdict = eval.evaluate(&pending("read_file", "{}")).await;
        assert!(!verdict.allowed);
        assert_eq!(verdict.stage, Stage::Alignment);
        assert!(verdict.reason.contains("HTTP 500"));
        assert_eq!(oracle.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_oracle_timeout_fails_closed() {
        let oracle = Arc::new(MockOracle::instant_approve().with_delay(Duration::from_secs(60)));
        let eval = evaluator(oracle, &[]).with_settings(OracleSettings {
            timeout: Duration::from_secs(30),
            ..OracleSettings::default()
        });

        let verdict = eval.evaluate(&pending("read_file", "{}")).await;
        assert!(!verdict.allowed);
        assert!(verdict.reason.contains("30000ms"), "reason: {}", verdict.reason);
    }

    #[tokio::test]
    async fn test_verdict_reply_is_case_insensitive() {
        let oracle = Arc::new(MockOracle::always("TRUE."));
        let eval = evaluator(oracle, &[]);
        assert!(eval.alignment_check(&pending("read_file", "{}")).await);
    }

    #[test]
    fn test_settings_follow_oracle_config() {
        let settings = OracleSettings::default();
        assert_eq!(settings.max_tokens, 10);
        assert_eq!(settings.temperature, 0.1);
        assert_eq!(settings.timeout, Duration::from_secs(30));
    }
}
