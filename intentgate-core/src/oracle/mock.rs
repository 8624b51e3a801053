//! Scripted oracle for tests and local development.
//!
//! Replies are consumed from a script in order; once the script is exhausted
//! every further query gets the fallback reply. An optional delay makes the
//! timeout path testable.
//!
//! ## Usage
//!
//! Set `oracle.backend: mock` (optionally with `oracle.mock_reply`) to run the
//! service without an external model.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use super::{CheckKind, Oracle, OracleError, OracleQuery};

/// Oracle that answers from a script.
pub struct MockOracle {
    script: Mutex<VecDeque<Result<String, OracleError>>>,
    fallback: Result<String, OracleError>,
    delay: Duration,
    /// Checks asked, in order (for testing).
    asked: Mutex<Vec<CheckKind>>,
    call_count: AtomicU32,
}

impl MockOracle {
    /// Creates an oracle that answers every query with `reply`.
    #[must_use]
    pub fn always(reply: impl Into<String>) -> Self {
        Self::scripted(Vec::new(), Ok(reply.into()))
    }

    /// Creates an oracle that approves every query instantly.
    #[must_use]
    pub fn instant_approve() -> Self {
        Self::always("True")
    }

    /// Creates an oracle that rejects every query instantly.
    #[must_use]
    pub fn instant_reject() -> Self {
        Self::always("False")
    }

    /// Creates an oracle that fails every query with `error`.
    #[must_use]
    pub fn failing(error: OracleError) -> Self {
        Self::scripted(Vec::new(), Err(error))
    }

    /// Creates an oracle that plays `script` in order, then `fallback`.
    #[must_use]
    pub fn scripted(
        script: Vec<Result<String, OracleError>>,
        fallback: Result<String, OracleError>,
    ) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback,
            delay: Duration::ZERO,
            asked: Mutex::new(Vec::new()),
            call_count: AtomicU32::new(0),
        }
    }

    /// Delays every reply by `delay`.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Get the number of queries submitted.
    #[must_use]
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }

    /// Get the checks asked so far, in order.
    #[must_use]
    pub fn asked(&self) -> Vec<CheckKind> {
        self.asked.lock().clone()
    }
}

#[async_trait]
impl Oracle for MockOracle {
    async fn submit(&self, query: &OracleQuery) -> Result<String, OracleError> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        self.asked.lock().push(query.check);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let reply = self
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        debug!(check = %query.check, ok = reply.is_ok(), "MockOracle answered");
        reply
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(check: CheckKind) -> OracleQuery {
        OracleQuery {
            check,
            prompt: "q".to_string(),
            max_tokens: 10,
            temperature: 0.1,
        }
    }

    #[tokio::test]
    async fn test_script_then_fallback() {
        let oracle = MockOracle::scripted(
            vec![Ok("True".to_string()), Ok("False".to_string())],
            Ok("fallback".to_string()),
        );
        assert_eq!(oracle.submit(&query(CheckKind::Alignment)).await.unwrap(), "True");
        assert_eq!(oracle.submit(&query(CheckKind::Provenance)).await.unwrap(), "False");
        assert_eq!(oracle.submit(&query(CheckKind::Alignment)).await.unwrap(), "fallback");
        assert_eq!(oracle.call_count(), 3);
        assert_eq!(
            oracle.asked(),
            vec![CheckKind::Alignment, CheckKind::Provenance, CheckKind::Alignment]
        );
    }

    #[tokio::test]
    async fn test_failing_oracle() {
        let oracle = MockOracle::failing(OracleError::HttpStatus { status: 503 });
        let err = oracle.submit(&query(CheckKind::Alignment)).await.unwrap_err();
        assert_eq!(err, OracleError::HttpStatus { status: 503 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_is_applied() {
        let oracle = MockOracle::instant_approve().with_delay(Duration::from_secs(5));
        let start = tokio::time::Instant::now();
        oracle.submit(&query(CheckKind::Alignment)).await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(5));
    }
}
