//! Shared application state.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tastebuds_compare::{PreviewHandle, PreviewRegistry, SessionRegistry};
use tastebuds_core::{Error, JobLimits, ModelKey, Result};
use tastebuds_providers::{GenerationProvider, ProviderConfig};
use tastebuds_runtime::Orchestrator;
use tastebuds_store::{ArtifactStore, Batch, SqliteStore};

/// One finished document in a comparison pool.
#[derive(Debug)]
pub struct Candidate {
    pub run_id: String,
    pub flavor: Option<String>,
    pub model: Option<ModelKey>,
    pub preview: PreviewHandle,
}

/// Public view of a candidate (document bytes are fetched separately).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateView {
    pub run_id: String,
    pub flavor: Option<String>,
    pub model: Option<ModelKey>,
    pub preview_id: u64,
}

impl From<&Candidate> for CandidateView {
    fn from(c: &Candidate) -> Self {
        Self {
            run_id: c.run_id.clone(),
            flavor: c.flavor.clone(),
            model: c.model,
            preview_id: c.preview.id(),
        }
    }
}

/// Shared application state accessible from all route handlers.
pub struct AppState {
    pub store: Arc<SqliteStore>,
    pub provider_config: ProviderConfig,
    pub orchestrator: Orchestrator,
    pub previews: PreviewRegistry,
    pub sessions: SessionRegistry<Candidate>,
}

impl AppState {
    pub fn new(
        limits: JobLimits,
        store: Arc<SqliteStore>,
        artifacts: Arc<dyn ArtifactStore>,
        provider: Arc<dyn GenerationProvider>,
        provider_config: ProviderConfig,
        session_idle: Duration,
    ) -> Self {
        let orchestrator = Orchestrator::new(store.clone(), artifacts, provider, limits);
        Self {
            store,
            provider_config,
            orchestrator,
            previews: PreviewRegistry::new(),
            sessions: SessionRegistry::with_idle_timeout(session_idle),
        }
    }

    pub fn artifacts(&self) -> &Arc<dyn ArtifactStore> {
        self.orchestrator.artifacts()
    }

    /// Load a batch, checking that `owner_id` owns it.
    pub fn owned_batch(&self, owner_id: &str, batch_id: &str) -> Result<Batch> {
        let batch = self
            .store
            .get_batch(batch_id)?
            .ok_or_else(|| Error::NotFound(format!("Batch {}", batch_id)))?;
        if batch.owner_id != owner_id {
            return Err(Error::Authz(format!(
                "Batch {} belongs to another user",
                batch_id
            )));
        }
        Ok(batch)
    }
}
