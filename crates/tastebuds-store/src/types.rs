//! Row types for batches, runs and profiles.

use serde::{Deserialize, Serialize};
use tastebuds_core::{FailureReason, ModelKey};

/// A batch ("project"): one prompt fanned out over flavors × models.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Batch {
    pub id: String,
    pub owner_id: String,
    pub prompt: String,
    pub flavors: Vec<String>,
    pub models: Vec<ModelKey>,
    /// Display name, assigned asynchronously by the naming job.
    pub name: Option<String>,
    pub created_at: i64,
}

impl Batch {
    pub fn cell_count(&self) -> usize {
        self.flavors.len() * self.models.len()
    }
}

/// Lifecycle of a run. `Pending` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Succeeded,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "succeeded" => Some(Self::Succeeded),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// One (flavor, model) cell of a batch and its persisted lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Run {
    pub id: String,
    pub batch_id: String,
    pub owner_id: String,
    pub flavor: Option<String>,
    /// `None` when the stored identifier is absent or no longer supported.
    pub model: Option<ModelKey>,
    pub order: i64,
    pub status: RunStatus,
    pub failure: Option<FailureReason>,
    pub error: Option<String>,
    pub created_at: i64,
    /// Latest launch time; equals `created_at` unless the run was restarted.
    pub started_at: i64,
    pub completed_at: Option<i64>,
}

impl Run {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Completion instant, set for both successful and failed runs.
    pub fn finished_at(&self) -> Option<i64> {
        self.completed_at
    }

    /// Completion instant of a failed run; always equal to `finished_at`.
    pub fn failed_at(&self) -> Option<i64> {
        match self.status {
            RunStatus::Failed => self.completed_at,
            _ => None,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.status == RunStatus::Succeeded
    }
}

/// How a job ended; written once by the first terminal writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Succeeded,
    Failed {
        reason: FailureReason,
        message: String,
    },
}

impl RunOutcome {
    pub fn failed(reason: FailureReason, message: impl Into<String>) -> Self {
        Self::Failed {
            reason,
            message: message.into(),
        }
    }

    pub fn status(&self) -> RunStatus {
        match self {
            Self::Succeeded => RunStatus::Succeeded,
            Self::Failed { .. } => RunStatus::Failed,
        }
    }
}

/// A validated batch submission, ready to persist.
#[derive(Debug, Clone)]
pub struct NewBatch {
    pub owner_id: String,
    pub prompt: String,
    pub flavors: Vec<String>,
    pub models: Vec<ModelKey>,
}

/// One planned run row, computed before anything is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedRun {
    pub flavor: String,
    pub model: ModelKey,
    pub order: i64,
}

/// Subscription tier; determines the batch cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Free,
    Pro,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Pro => "pro",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "free" => Some(Self::Free),
            "pro" => Some(Self::Pro),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub owner_id: String,
    pub credits: i64,
    pub tier: Tier,
    pub created_at: i64,
}

/// Store-level statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub batches: i64,
    pub runs: i64,
    pub pending_runs: i64,
    pub failed_runs: i64,
    pub profiles: i64,
    pub db_path: String,
}
