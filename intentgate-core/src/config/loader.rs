//! Configuration loading and validation.
//!
//! ```text
//!   find_config_file ──▶ read ──▶ ${VAR} substitution ──▶ YAML ──▶ validate
//! ```
//!
//! Search order: explicit path, `$INTENTGATE_CONFIG`,
//! `/etc/intentgate/config.yaml`, `./intentgate.yaml`.

use regex::Regex;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use tracing::{debug, info};

use super::error::ConfigError;
use super::schema::Config;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "INTENTGATE_CONFIG";

/// Configuration file search paths (in priority order), after the explicit
/// path.
pub fn default_config_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        paths.push(PathBuf::from(path));
    }

    paths.push(PathBuf::from("/etc/intentgate/config.yaml"));
    paths.push(PathBuf::from("./intentgate.yaml"));

    paths
}

/// Find the first existing config file from the search paths.
///
/// # Errors
///
/// Returns [`ConfigError::ConfigFileNotFound`] if an explicit path does not
/// exist, or if none of the default paths exist.
pub fn find_config_file(explicit_path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = explicit_path {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        return Err(ConfigError::ConfigFileNotFound {
            searched: vec![path.to_path_buf()],
        });
    }

    let paths = default_config_paths();
    for path in &paths {
        if path.exists() {
            return Ok(path.clone());
        }
    }

    Err(ConfigError::ConfigFileNotFound { searched: paths })
}

/// Load configuration from a file path.
///
/// # Errors
///
/// Returns [`ConfigError`] on I/O failure, an empty file, a missing required
/// environment variable or invalid YAML.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path)?;

    if contents.trim().is_empty() {
        return Err(ConfigError::EmptyConfigFile);
    }

    let contents = substitute_env_vars(&contents)?;
    let config: Config = serde_saphyr::from_str(&contents)?;

    Ok(config)
}

/// Load and validate configuration from a file path.
pub fn load_and_validate(path: &Path) -> Result<Config, ConfigError> {
    let config = load_config(path)?;
    validate(&config)?;
    info!(path = %path.display(), "Configuration loaded");
    Ok(config)
}

/// Resolves the effective configuration.
///
/// An explicit path must exist. Without one, the default search paths are
/// tried and built-in defaults are used when none exists.
///
/// # Errors
///
/// Returns [`ConfigError`] if the explicit file is missing or any located
/// file fails to load or validate.
pub fn load_or_default(explicit_path: Option<&Path>) -> Result<Config, ConfigError> {
    match find_config_file(explicit_path) {
        Ok(path) => load_and_validate(&path),
        Err(ConfigError::ConfigFileNotFound { searched }) if explicit_path.is_none() => {
            debug!(searched = ?searched, "No configuration file found, using defaults");
            let config = Config::default();
            validate(&config)?;
            Ok(config)
        }
        Err(e) => Err(e),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Environment Variable Substitution
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

// SAFETY: .expect() on LazyLock with a compile-time literal regex pattern.
// The pattern is known-valid and tested by test_env_var_pattern_compiles().
static ENV_VAR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
        .expect("BUG: ENV_VAR_PATTERN regex is invalid")
});

/// Substitute environment variables in a string.
///
/// # Syntax
/// - `${VAR}` - Required, fail if not set
/// - `${VAR:-default}` - Optional with default
pub fn substitute_env_vars(content: &str) -> Result<String, ConfigError> {
    let mut missing: Option<String> = None;

    let result = ENV_VAR_PATTERN.replace_all(content, |cap: &regex::Captures<'_>| {
        let var_name = cap.get(1).map(|m| m.as_str()).unwrap_or_default();
        match std::env::var(var_name) {
            Ok(value) => value,
            Err(_) => match cap.get(2) {
                Some(default) => default.as_str().to_string(),
                None => {
                    if missing.is_none() {
                        missing = Some(var_name.to_string());
                    }
                    String::new()
                }
            },
        }
    });

    if let Some(var) = missing {
        return Err(ConfigError::MissingEnvVar {
            var,
            field: "configuration".to_string(),
        });
    }

    Ok(result.into_owned())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Validate a configuration.
///
/// # Errors
///
/// Returns the first [`ConfigError`] found.
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.schema != 1 {
        return Err(ConfigError::UnsupportedSchemaVersion {
            version: config.schema,
        });
    }

    for (index, tool) in config.trusted_tools.iter().enumerate() {
        if tool.trim().is_empty() {
            return Err(ConfigError::EmptyTrustedTool { index });
        }
    }

    let marker = &config.user_prompt_marker;
    if marker.open.is_empty() || marker.close.is_empty() {
        return Err(ConfigError::InvalidMarker {
            message: "open and close delimiters must be non-empty".to_string(),
        });
    }

    if let Err(e) = url::Url::parse(&config.oracle.base_url) {
        return Err(ConfigError::InvalidUrl {
            url: config.oracle.base_url.clone(),
            message: e.to_string(),
        });
    }

    require_nonzero("oracle.timeout", config.oracle.timeout)?;
    require_nonzero("state.poll_interval", config.state.poll_interval)?;

    if !config.intercept.path_prefix.starts_with('/') {
        return Err(ConfigError::InvalidUrl {
            url: config.intercept.path_prefix.clone(),
            message: "intercept.path_prefix must start with '/'".to_string(),
        });
    }

    if let Err(e) = config.server.bind.parse::<SocketAddr>() {
        return Err(ConfigError::InvalidUrl {
            url: config.server.bind.clone(),
            message: format!("server.bind is not a socket address: {}", e),
        });
    }

    Ok(())
}

fn require_nonzero(field: &str, value: Duration) -> Result<(), ConfigError> {
    if value.is_zero() {
        return Err(ConfigError::InvalidTimeout {
            field: field.to_string(),
            message: "must be greater than zero".to_string(),
        });
    }
    Ok(())
}
