//! Error types for Tastebuds.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Forbidden: {0}")]
    Authz(String),

    #[error("Insufficient credits: need {needed}, have {available}")]
    InsufficientCredits { needed: i64, available: i64 },

    #[error("Projects limit reached ({limit})")]
    ProjectLimitReached { limit: i64 },

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Extraction error: {0}")]
    Extraction(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Timed out after {0} seconds")]
    Timeout(u64),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Classify an error raised inside a generation job.
    ///
    /// Admission-time variants never reach a job, so anything that is not one
    /// of the execution variants is reported as `FailureReason::Internal`.
    pub fn failure_reason(&self) -> FailureReason {
        match self {
            Error::Provider(_) => FailureReason::Provider,
            Error::Extraction(_) => FailureReason::Extraction,
            Error::Persistence(_) | Error::Storage(_) => FailureReason::Persistence,
            Error::Timeout(_) => FailureReason::Timeout,
            _ => FailureReason::Internal,
        }
    }
}

/// Why a run ended in the failed state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureReason {
    Provider,
    Extraction,
    Persistence,
    Timeout,
    /// The process that owned the job exited before the job finished.
    Interrupted,
    Internal,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Provider => "provider",
            Self::Extraction => "extraction",
            Self::Persistence => "persistence",
            Self::Timeout => "timeout",
            Self::Interrupted => "interrupted",
            Self::Internal => "internal",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "provider" => Some(Self::Provider),
            "extraction" => Some(Self::Extraction),
            "persistence" => Some(Self::Persistence),
            "timeout" => Some(Self::Timeout),
            "interrupted" => Some(Self::Interrupted),
            "internal" => Some(Self::Internal),
            _ => None,
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
