//! Runtime types.

use serde::{Deserialize, Serialize};
use tastebuds_core::{FailureReason, ModelKey};
use tastebuds_store::{Batch, Run, RunOutcome, RunStatus};
use tokio::task::JoinHandle;

/// A batch submission as received from a caller, before validation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BatchSubmission {
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub flavors: Vec<String>,
    #[serde(default)]
    pub models: Vec<String>,
}

/// Result of a successful admission.
///
/// The handles resolve when the spawned work finishes; dropping them
/// detaches the tasks.
pub struct Admitted {
    pub batch: Batch,
    pub runs: Vec<Run>,
    pub jobs: Vec<JoinHandle<RunOutcome>>,
    pub naming: JoinHandle<()>,
}

impl Admitted {
    pub fn run_ids(&self) -> Vec<String> {
        self.runs.iter().map(|r| r.id.clone()).collect()
    }
}

/// One run as seen by a polling consumer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunView {
    pub id: String,
    pub batch_id: String,
    pub flavor: Option<String>,
    pub model: Option<ModelKey>,
    pub order: i64,
    pub status: RunStatus,
    pub failure: Option<FailureReason>,
    pub error: Option<String>,
    pub created_at: i64,
    pub started_at: i64,
    pub finished_at: Option<i64>,
    pub failed_at: Option<i64>,
    /// Time since launch for a pending run, total duration for a terminal one.
    pub elapsed_ms: i64,
}

impl RunView {
    pub fn at(run: &Run, now: i64) -> Self {
        let end = run.finished_at().unwrap_or(now);
        Self {
            id: run.id.clone(),
            batch_id: run.batch_id.clone(),
            flavor: run.flavor.clone(),
            model: run.model,
            order: run.order,
            status: run.status,
            failure: run.failure,
            error: run.error.clone(),
            created_at: run.created_at,
            started_at: run.started_at,
            finished_at: run.finished_at(),
            failed_at: run.failed_at(),
            elapsed_ms: (end - run.started_at).max(0),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.finished_at.is_some()
    }
}

/// Progress snapshot of one batch.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchProgress {
    pub runs: Vec<RunView>,
    pub completed_count: usize,
    pub total_count: usize,
    pub done: bool,
}
