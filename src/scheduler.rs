//! Timed pipeline driver.
//!
//! Runs the pipeline N times a day and records the last run's outcome in a
//! small on-disk state file instead of aborting the process on failure.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::time::Duration;
use tracing::{error, info, warn};

use crate::pipeline::{Pipeline, PipelineReport};

const SECONDS_PER_DAY: u64 = 86_400;

/// Last-run bookkeeping, persisted as JSON
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchedulerState {
    pub last_run_time: Option<String>,
    /// `success` | `failed` | `error`
    pub last_run_status: Option<String>,
    pub error_message: Option<String>,
}

impl SchedulerState {
    /// Load the state file; a missing file is a fresh state
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading scheduler state {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("parsing scheduler state {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("writing scheduler state {}", path.display()))
    }

    /// Record one run's outcome.
    ///
    /// `success`: every inbox item processed. `failed`: the pass completed but
    /// some items failed. `error`: the pass itself aborted.
    pub fn record(&mut self, outcome: &Result<PipelineReport>) {
        self.last_run_time = Some(Utc::now().to_rfc3339());

        match outcome {
            Ok(report) if report.all_ok() => {
                self.last_run_status = Some("success".to_string());
                self.error_message = None;
            }
            Ok(report) => {
                self.last_run_status = Some("failed".to_string());
                let detail: Vec<String> = report
                    .failures
                    .iter()
                    .map(|(file, err)| format!("{}: {}", file, err))
                    .collect();
                self.error_message = Some(detail.join("; "));
            }
            Err(e) => {
                self.last_run_status = Some("error".to_string());
                self.error_message = Some(e.to_string());
            }
        }
    }
}

pub struct Scheduler {
    pipeline: Pipeline,
    state_path: PathBuf,
    runs_per_day: u32,
}

impl Scheduler {
    pub fn new(pipeline: Pipeline, state_path: PathBuf, runs_per_day: u32) -> Self {
        Self {
            pipeline,
            state_path,
            runs_per_day: runs_per_day.max(1),
        }
    }

    /// Run the pipeline on its timer until the process is stopped. Pass
    /// failures are recorded in the state file; the loop never aborts.
    pub async fn run(mut self) -> Result<()> {
        let interval = Duration::from_secs(SECONDS_PER_DAY / u64::from(self.runs_per_day));
        info!(
            runs_per_day = self.runs_per_day,
            interval_secs = interval.as_secs(),
            "Scheduler started"
        );

        loop {
            self.run_and_record().await;
            tokio::time::sleep(interval).await;
        }
    }

    async fn run_and_record(&mut self) {
        let outcome = self.pipeline.run_once().await;

        if let Err(e) = &outcome {
            error!(error = %e, "Pipeline pass errored");
        }

        let mut state = SchedulerState::load(&self.state_path).unwrap_or_default();
        state.record(&outcome);
        if let Err(e) = state.save(&self.state_path) {
            warn!(error = %e, "Could not save scheduler state");
        }
    }
}
