//! Daily cleanup of the downloaded-artifact directory.
//!
//! The sweep runs on its own task, started and stopped by the process
//! lifecycle. A failed sweep terminates the process.

use chrono::{DateTime, Utc};
use cron::Schedule;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::SWEEP_SENTINEL;

/// Where the sweep currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepState {
    /// Waiting for the next scheduled run
    Idle,
    /// Reading the artifact directory
    Listing,
    /// Removing artifacts
    Deleting,
}

/// Errors of the cleanup sweep
#[derive(Debug, Error)]
pub enum SweepError {
    /// The cron expression does not parse
    #[error("Invalid sweep schedule '{expr}': {reason}")]
    Schedule {
        /// Offending expression
        expr: String,
        /// Parser message
        reason: String,
    },
    /// The timezone name is not in the tz database
    #[error("Unknown timezone: {0}")]
    Timezone(String),
    /// The directory could not be listed
    #[error("Failed to list {path}: {source}")]
    List {
        /// Artifact directory
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },
    /// An artifact could not be removed
    #[error("Failed to delete {path}: {source}")]
    Delete {
        /// Artifact path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

/// A cron schedule evaluated in a fixed timezone
#[derive(Debug, Clone)]
pub struct SweepSchedule {
    schedule: Schedule,
    timezone: chrono_tz::Tz,
}

impl SweepSchedule {
    /// Parse a cron expression and timezone name.
    ///
    /// Five-field expressions (`min hour dom month dow`) are accepted and
    /// padded to the seven fields the `cron` crate expects.
    ///
    /// # Errors
    ///
    /// Returns `SweepError::Schedule` or `SweepError::Timezone`.
    pub fn parse(expr: &str, timezone: &str) -> Result<Self, SweepError> {
        let schedule = expr
            .parse::<Schedule>()
            .or_else(|_| format!("0 {expr} *").parse::<Schedule>())
            .map_err(|e| SweepError::Schedule {
                expr: expr.to_string(),
                reason: e.to_string(),
            })?;

        let timezone = timezone
            .parse::<chrono_tz::Tz>()
            .map_err(|_| SweepError::Timezone(timezone.to_string()))?;

        Ok(Self { schedule, timezone })
    }

    /// Next run strictly after `now`
    #[must_use]
    pub fn next_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule
            .after(&now.with_timezone(&self.timezone))
            .next()
            .map(|next| next.with_timezone(&Utc))
    }
}

/// Delete every entry of `dir` except the sentinel.
///
/// Returns the number of removed entries.
///
/// # Errors
///
/// Returns `SweepError::List` or `SweepError::Delete` on the first I/O
/// failure.
pub async fn sweep_once(dir: &Path) -> Result<usize, SweepError> {
    sweep_with_state(dir, None).await
}

async fn sweep_with_state(
    dir: &Path,
    state: Option<&watch::Sender<SweepState>>,
) -> Result<usize, SweepError> {
    let set_state = |next: SweepState| {
        if let Some(state) = state {
            state.send_replace(next);
        }
    };

    set_state(SweepState::Listing);
    let list_error = |source| SweepError::List {
        path: dir.to_path_buf(),
        source,
    };
    let mut entries = tokio::fs::read_dir(dir).await.map_err(list_error)?;
    let mut targets = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(list_error)? {
        if entry.file_name() != SWEEP_SENTINEL {
            targets.push(entry);
        }
    }

    set_state(SweepState::Deleting);
    for entry in &targets {
        let path = entry.path();
        let is_dir = entry
            .file_type()
            .await
            .map_err(|source| SweepError::List {
                path: path.clone(),
                source,
            })?
            .is_dir();
        let removed = if is_dir {
            tokio::fs::remove_dir_all(&path).await
        } else {
            tokio::fs::remove_file(&path).await
        };
        removed.map_err(|source| SweepError::Delete {
            path: path.clone(),
            source,
        })?;
        debug!(path = %path.display(), "Removed artifact");
    }

    set_state(SweepState::Idle);
    Ok(targets.len())
}

/// Scheduled cleanup of one artifact directory
pub struct CleanupSweep {
    dir: PathBuf,
    schedule: SweepSchedule,
}

/// Handle of a running sweep task
pub struct SweepHandle {
    cancel: CancellationToken,
    state: watch::Receiver<SweepState>,
    task: JoinHandle<()>,
}

impl CleanupSweep {
    /// Sweep `dir` on `schedule`
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, schedule: SweepSchedule) -> Self {
        Self {
            dir: dir.into(),
            schedule,
        }
    }

    /// Spawn the sweep loop
    #[must_use]
    pub fn start(self) -> SweepHandle {
        let cancel = CancellationToken::new();
        let (state_tx, state_rx) = watch::channel(SweepState::Idle);
        let task = tokio::spawn(self.run(cancel.clone(), state_tx));

        SweepHandle {
            cancel,
            state: state_rx,
            task,
        }
    }

    async fn run(self, cancel: CancellationToken, state: watch::Sender<SweepState>) {
        info!(dir = %self.dir.display(), "Cleanup sweep started");
        loop {
            let now = Utc::now();
            let Some(next) = self.schedule.next_after(now) else {
                warn!("Cleanup schedule has no future runs");
                break;
            };
            let wait = (next - now).to_std().unwrap_or_default();
            debug!(next_run = %next, "Cleanup sweep scheduled");

            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(wait) => {}
            }

            match sweep_with_state(&self.dir, Some(&state)).await {
                Ok(removed) => info!(removed, "Cleanup sweep finished"),
                Err(e) => {
                    error!(error = %e, "Cleanup sweep failed, terminating");
                    std::process::exit(1);
                }
            }
        }
        info!("Cleanup sweep stopped");
    }
}

impl SweepHandle {
    /// Current state of the sweep
    #[must_use]
    pub fn state(&self) -> SweepState {
        *self.state.borrow()
    }

    /// Stop the loop and wait for the task; a running sweep finishes first
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            warn!(error = %e, "Cleanup sweep task ended abnormally");
        }
    }
}
