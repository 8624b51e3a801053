//! Which flows are subject to gating.

use url::Url;

use crate::config::InterceptConfig;

/// Host suffixes plus a path prefix.
///
/// A host matches when it equals a configured suffix or ends with
/// `.` + suffix, so `githubcopilot.com` covers
/// `api.individual.githubcopilot.com` but not `evilgithubcopilot.com`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterceptScope {
    hosts: Vec<String>,
    path_prefix: String,
}

impl Default for InterceptScope {
    fn default() -> Self {
        Self::from_config(&InterceptConfig::default())
    }
}

impl InterceptScope {
    pub fn new(hosts: Vec<String>, path_prefix: impl Into<String>) -> Self {
        Self {
            hosts: hosts
                .into_iter()
                .map(|h| h.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            path_prefix: path_prefix.into(),
        }
    }

    pub fn from_config(config: &InterceptConfig) -> Self {
        Self::new(config.hosts.clone(), config.path_prefix.clone())
    }

    /// Whether `url` is subject to interception. Unparsable URLs are not.
    pub fn matches_url(&self, url: &str) -> bool {
        let Ok(parsed) = Url::parse(url) else {
            return false;
        };
        let Some(host) = parsed.host_str() else {
            return false;
        };
        self.matches(host, parsed.path())
    }

    pub fn matches(&self, host: &str, path: &str) -> bool {
        let host = host.to_ascii_lowercase();
        let host_ok = self.hosts.iter().any(|suffix| {
            host == *suffix
                || host
                    .strip_suffix(suffix.as_str())
                    .is_some_and(|rest| rest.ends_with('.'))
        });
        host_ok && path.starts_with(&self.path_prefix)
    }
}
