//! Top-level error type.
//!
//! Each concern owns its error enum; [`IntentGateError`] unifies them for
//! callers that assemble the whole gate (the service binary, the offline
//! evaluator).

use thiserror::Error;

use crate::audit::AuditError;
use crate::config::ConfigError;
use crate::oracle::OracleError;
use crate::state::StateError;

#[derive(Debug, Error)]
pub enum IntentGateError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Oracle(#[from] OracleError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Audit(#[from] AuditError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversions_preserve_message() {
        let err: IntentGateError = OracleError::Timeout { timeout_ms: 5 }.into();
        assert_eq!(err.to_string(), "oracle did not answer within 5ms");

        let err: IntentGateError = ConfigError::EmptyConfigFile.into();
        assert_eq!(
            err.to_string(),
            "configuration error: configuration file is empty"
        );
    }
}
