//! Wiring: turns a validated [`Config`] into a ready pipeline.

use std::sync::Arc;

use intentgate_core::audit::{JsonDirSink, TracingSink};
use intentgate_core::config::Config;
use intentgate_core::metrics::IntentGateMetrics;
use intentgate_core::oracle::{Oracle, build_oracle};
use intentgate_core::pipeline::{InterceptScope, InterceptionPipeline};
use intentgate_core::policy::PolicyEvaluator;
use intentgate_core::state::ProxyStateHandle;
use prometheus_client::registry::Registry;
use tracing::info;

use crate::error::CliError;

/// Everything a running filter needs, shared behind `Arc`.
pub struct App {
    pub config: Config,
    pub pipeline: InterceptionPipeline,
    pub scope: InterceptScope,
    pub state: Arc<ProxyStateHandle>,
    pub registry: Registry,
}

impl App {
    /// Builds the app with the oracle selected by `config.oracle.backend`.
    ///
    /// # Errors
    ///
    /// Returns [`CliError`] if the oracle client or prompt marker cannot be
    /// constructed.
    pub fn build(config: Config) -> Result<Self, CliError> {
        let oracle = build_oracle(&config.oracle)?;
        Self::with_oracle(config, oracle)
    }

    /// Builds the app around a caller-supplied oracle.
    ///
    /// # Errors
    ///
    /// Returns [`CliError::Config`] if the prompt marker does not compile.
    pub fn with_oracle(config: Config, oracle: Arc<dyn Oracle>) -> Result<Self, CliError> {
        let mut registry = Registry::default();
        let metrics = Arc::new(IntentGateMetrics::new(&mut registry));

        let state = Arc::new(ProxyStateHandle::new());
        state.set_metrics(metrics.clone());

        info!(
            oracle = oracle.name(),
            model = %config.oracle.model,
            trusted_tools = ?config.trusted_tools,
            "Building interception pipeline"
        );

        let evaluator = PolicyEvaluator::from_config(&config, oracle)?.with_metrics(metrics.clone());
        let mut pipeline =
            InterceptionPipeline::new(evaluator, state.clone()).with_metrics(metrics);

        if let Some(ref directory) = config.audit.directory {
            info!(directory = %directory.display(), "Writing decisions to directory");
            pipeline = pipeline.with_sink(Arc::new(JsonDirSink::new(directory)));
        }
        if config.audit.log_decisions {
            pipeline = pipeline.with_sink(Arc::new(TracingSink));
        }

        Ok(Self {
            scope: InterceptScope::from_config(&config.intercept),
            config,
            pipeline,
            state,
            registry,
        })
    }
}
