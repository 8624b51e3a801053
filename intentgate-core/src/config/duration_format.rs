//! Duration fields in the config file: `oracle.timeout` and
//! `state.poll_interval`.
//!
//! ```yaml
//! oracle:
//!   timeout: 30s        # or PT30S
//! state:
//!   poll_interval: 1s   # or 250ms, PT1S
//! ```

use serde::{Deserialize, Deserializer};
use std::time::Duration;

/// Parses `30s` style (humantime) first, then ISO 8601 (`PT30S`).
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    humantime::parse_duration(s)
        .ok()
        .or_else(|| {
            iso8601_duration::Duration::parse(s)
                .ok()
                .and_then(|d| d.to_std())
        })
        .ok_or_else(|| {
            format!(
                "invalid duration '{}': expected humantime (30s) or ISO 8601 (PT30S)",
                s
            )
        })
}

/// `deserialize_with` adapter for the fields above.
pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    parse_duration(&s).map_err(serde::de::Error::custom)
}

/// Formats a duration for logs and `state show` output.
pub fn format(duration: Duration) -> String {
    humantime::format_duration(duration).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oracle_timeout_forms() {
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("PT30S").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("1m 30s").unwrap(), Duration::from_secs(90));
    }

    #[test]
    fn test_poll_interval_forms() {
        assert_eq!(parse_duration("1s").unwrap(), Duration::from_secs(1));
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("PT1S").unwrap(), Duration::from_secs(1));
    }

    #[test]
    fn test_unparsable_value_names_both_formats() {
        let err = parse_duration("every second").unwrap_err();
        assert!(err.contains("'every second'"));
        assert!(err.contains("PT30S"));
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn test_watcher_log_format_parses_back() {
        let poll = Duration::from_millis(1500);
        assert_eq!(format(poll), "1s 500ms");
        assert_eq!(parse_duration(&format(poll)).unwrap(), poll);
    }
}
