//! Background poller for the state file.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::file::parse_state;
use super::{Observation, ProxyStateHandle};

/// Polls the state file and applies changed observations to a handle.
///
/// An observation is applied when it differs from the previous one: file
/// contents changed, or the read switched between success and failure.
pub struct StateWatcher {
    path: PathBuf,
    interval: Duration,
    handle: Arc<ProxyStateHandle>,
    last: Option<Observation>,
}

impl StateWatcher {
    pub fn new(path: impl Into<PathBuf>, interval: Duration, handle: Arc<ProxyStateHandle>) -> Self {
        Self {
            path: path.into(),
            interval,
            handle,
            last: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the file once and applies the result if it changed.
    ///
    /// Returns `true` if an observation was applied.
    pub async fn poll_once(&mut self) -> bool {
        let observation = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => match parse_state(&self.path, &contents) {
                Ok(record) => Observation::Read(record),
                Err(e) => Observation::Failed(e.to_string()),
            },
            Err(e) => Observation::Failed(format!(
                "state file I/O error at {}: {}",
                self.path.display(),
                e
            )),
        };

        if self.last.as_ref() == Some(&observation) {
            return false;
        }

        debug!(path = %self.path.display(), ?observation, "State file observation changed");
        self.last = Some(observation.clone());
        self.handle.apply(observation);
        true
    }

    /// Polls until `shutdown` is cancelled. The first poll is immediate.
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!(
            path = %self.path.display(),
            interval = %crate::config::duration_format::format(self.interval),
            "State watcher started"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    self.poll_once().await;
                }
            }
        }

        info!("State watcher stopped");
    }

    /// Spawns [`run`](Self::run) on the current runtime.
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}
