//! Prometheus metrics using the prometheus-client crate.
//!
//! [`IntentGateMetrics`] registers every series the gate exports. The host
//! service encodes the registry on `GET /metrics` in OpenMetrics text format.
//!
//! | Series | Type | Labels |
//! |--------|------|--------|
//! | `intentgate_decisions_total` | counter | `outcome` |
//! | `intentgate_oracle_queries_total` | counter | `check`, `verdict` |
//! | `intentgate_oracle_duration_ms` | histogram | `check` |
//! | `intentgate_filtering_enabled` | gauge | |

use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::Histogram;
use prometheus_client::registry::Registry;

// ─────────────────────────────────────────────────────────────────────────────
// Label Sets
// ─────────────────────────────────────────────────────────────────────────────

/// Labels for decision counters.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct DecisionLabels {
    /// "allowed", "blocked" or "skipped"
    pub outcome: String,
}

/// Labels for oracle query counters.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct OracleQueryLabels {
    /// "alignment" or "provenance"
    pub check: String,
    /// "true", "false" or "error"
    pub verdict: String,
}

/// Labels for oracle latency histograms.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct OracleDurationLabels {
    pub check: String,
}

/// Oracle latency buckets in milliseconds. Model round trips are slow.
const ORACLE_BUCKETS: [f64; 10] = [
    50.0, 100.0, 250.0, 500.0, 1000.0, 2000.0, 5000.0, 10000.0, 20000.0, 30000.0,
];

// ─────────────────────────────────────────────────────────────────────────────
// Metrics
// ─────────────────────────────────────────────────────────────────────────────

pub struct IntentGateMetrics {
    pub decisions_total: Family<DecisionLabels, Counter>,
    pub oracle_queries_total: Family<OracleQueryLabels, Counter>,
    pub oracle_duration_ms: Family<OracleDurationLabels, Histogram>,
    /// 1 while filtering is enabled, 0 while the kill-switch is off.
    pub filtering_enabled: Gauge,
}

impl IntentGateMetrics {
    /// Create and register all metrics with the given registry.
    pub fn new(registry: &mut Registry) -> Self {
        let decisions_total = Family::<DecisionLabels, Counter>::default();
        registry.register(
            "intentgate_decisions",
            "Decisions recorded per evaluated response",
            decisions_total.clone(),
        );

        let oracle_queries_total = Family::<OracleQueryLabels, Counter>::default();
        registry.register(
            "intentgate_oracle_queries",
            "Oracle queries by check and verdict",
            oracle_queries_total.clone(),
        );

        let oracle_duration_ms =
            Family::<OracleDurationLabels, Histogram>::new_with_constructor(|| {
                Histogram::new(ORACLE_BUCKETS.iter().copied())
            });
        registry.register(
            "intentgate_oracle_duration_ms",
            "Oracle query latency in milliseconds",
            oracle_duration_ms.clone(),
        );

        let filtering_enabled = Gauge::default();
        registry.register(
            "intentgate_filtering_enabled",
            "Whether tool-call filtering is enabled (1) or bypassed (0)",
            filtering_enabled.clone(),
        );
        filtering_enabled.set(1);

        Self {
            decisions_total,
            oracle_queries_total,
            oracle_duration_ms,
            filtering_enabled,
        }
    }

    pub fn record_decision(&self, outcome: &str) {
        self.decisions_total
            .get_or_create(&DecisionLabels {
                outcome: outcome.to_string(),
            })
            .inc();
    }

    /// Record one oracle query. `verdict` is `None` when the query failed.
    pub fn record_oracle_query(&self, check: &str, verdict: Option<bool>, duration_ms: f64) {
        let verdict = match verdict {
            Some(true) => "true",
            Some(false) => "false",
            None => "error",
        };
        self.oracle_queries_total
            .get_or_create(&OracleQueryLabels {
                check: check.to_string(),
                verdict: verdict.to_string(),
            })
            .inc();
        self.oracle_duration_ms
            .get_or_create(&OracleDurationLabels {
                check: check.to_string(),
            })
            .observe(duration_ms);
    }

    pub fn set_filtering_enabled(&self, enabled: bool) {
        self.filtering_enabled.set(i64::from(enabled));
    }
}
