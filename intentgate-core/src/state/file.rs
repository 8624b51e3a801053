//! State file access.
//!
//! ```json
//! { "enabled": false, "timestamp": "2025-06-01T12:00:00Z" }
//! ```
//!
//! Writes go to a sibling temp file that is renamed into place, so a poll
//! never observes a half-written document.

use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use tracing::{debug, info};

use super::{Observation, StateError, StateRecord};

/// Reads and parses the state file.
///
/// # Errors
///
/// Returns [`StateError::Io`] if the file cannot be read and
/// [`StateError::Parse`] if it is not a valid state document.
pub fn read_state_file(path: &Path) -> Result<StateRecord, StateError> {
    let contents = std::fs::read_to_string(path).map_err(|source| io_error(path, source))?;
    parse_state(path, &contents)
}

/// Parses state file contents read from `path`.
pub fn parse_state(path: &Path, contents: &str) -> Result<StateRecord, StateError> {
    serde_json::from_str(contents).map_err(|source| StateError::Parse {
        path: path.display().to_string(),
        source,
    })
}

/// Reads the state file and folds any failure into [`Observation::Failed`].
pub fn observe(path: &Path) -> Observation {
    match read_state_file(path) {
        Ok(record) => Observation::Read(record),
        Err(e) => Observation::Failed(e.to_string()),
    }
}

/// Writes `{enabled, timestamp}` with an RFC 3339 timestamp.
///
/// # Errors
///
/// Returns [`StateError::Io`] if the directory, temp file or rename fails and
/// [`StateError::Serialize`] if the record cannot be encoded.
pub fn write_state_file(path: &Path, enabled: bool) -> Result<StateRecord, StateError> {
    let record = StateRecord {
        enabled,
        timestamp: Some(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)),
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| io_error(parent, source))?;
    }

    let json = serde_json::to_string_pretty(&record).map_err(|source| StateError::Serialize {
        path: path.display().to_string(),
        source,
    })?;

    let tmp = temp_path(path);
    std::fs::write(&tmp, json).map_err(|source| io_error(&tmp, source))?;
    std::fs::rename(&tmp, path).map_err(|source| io_error(path, source))?;

    info!(path = %path.display(), enabled, "State file written");
    Ok(record)
}

/// Creates the default `enabled: true` state file when none exists.
///
/// Returns `true` if a file was created.
///
/// # Errors
///
/// Returns [`StateError::Io`] if the file cannot be written.
pub fn ensure_state_file(path: &Path) -> Result<bool, StateError> {
    if path.exists() {
        debug!(path = %path.display(), "State file already present");
        return Ok(false);
    }
    write_state_file(path, true)?;
    Ok(true)
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "proxy_state.json".into());
    name.push(".tmp");
    path.with_file_name(name)
}

fn io_error(path: &Path, source: std::io::Error) -> StateError {
    StateError::Io {
        path: path.display().to_string(),
        source,
    }
}
