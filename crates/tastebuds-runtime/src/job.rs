//! A single (flavor, model) generation.

use tastebuds_core::{Error, ModelKey, Result};
use tastebuds_providers::prompt::system_prompt;
use tastebuds_providers::{GenerationProvider, GenerationRequest, Target};
use tastebuds_store::{ArtifactKey, ArtifactStore, Batch, Run, DOCUMENT_CONTENT_TYPE};
use tracing::{debug, info, instrument};

use crate::extract::extract_document;

/// Everything one job needs; owns no shared state besides its run id.
#[derive(Debug, Clone)]
pub struct GenerationJob {
    pub run_id: String,
    pub batch_id: String,
    pub owner_id: String,
    pub prompt: String,
    pub flavor: Option<String>,
    pub model: ModelKey,
}

impl GenerationJob {
    pub fn new(batch: &Batch, run: &Run, model: ModelKey) -> Self {
        Self {
            run_id: run.id.clone(),
            batch_id: batch.id.clone(),
            owner_id: run.owner_id.clone(),
            prompt: batch.prompt.clone(),
            flavor: run.flavor.clone(),
            model,
        }
    }

    /// Build the job for a stored run. Fails if the run has no model assigned.
    pub fn for_run(batch: &Batch, run: &Run) -> Result<Self> {
        let model = run
            .model
            .ok_or_else(|| Error::Validation(format!("Run {} has no model", run.id)))?;
        Ok(Self::new(batch, run, model))
    }

    pub fn request(&self) -> GenerationRequest {
        GenerationRequest::new(
            Target::Model(self.model),
            system_prompt(self.flavor.as_deref()),
            self.prompt.clone(),
        )
    }

    pub fn artifact_key(&self) -> ArtifactKey {
        ArtifactKey::new(&self.owner_id, &self.batch_id, &self.run_id)
    }

    /// Generate, extract and persist the document.
    ///
    /// Does not touch the run row; the caller records the outcome.
    #[instrument(skip_all, fields(run_id = %self.run_id, batch_id = %self.batch_id, model = %self.model))]
    pub async fn execute(
        &self,
        provider: &dyn GenerationProvider,
        artifacts: &dyn ArtifactStore,
    ) -> Result<()> {
        debug!("Calling provider");
        let raw = provider.generate(&self.request()).await?;

        let document = extract_document(&raw);
        if document.is_empty() {
            return Err(Error::Extraction(
                "Failed to extract HTML from response".into(),
            ));
        }

        artifacts
            .put(&self.artifact_key(), document.as_bytes(), DOCUMENT_CONTENT_TYPE)
            .await
            .map_err(|e| match e {
                Error::Persistence(_) => e,
                other => Error::Persistence(other.to_string()),
            })?;

        info!("Stored document ({} bytes)", document.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use tastebuds_store::MemoryArtifactStore;

    struct Canned {
        reply: Result<String>,
        seen: Mutex<Vec<GenerationRequest>>,
    }

    impl Canned {
        fn ok(reply: &str) -> Self {
            Self {
                reply: Ok(reply.to_string()),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl GenerationProvider for Canned {
        async fn generate(&self, request: &GenerationRequest) -> Result<String> {
            self.seen.lock().push(request.clone());
            match &self.reply {
                Ok(s) => Ok(s.clone()),
                Err(e) => Err(Error::Provider(e.to_string())),
            }
        }
    }

    fn job(flavor: Option<&str>) -> GenerationJob {
        GenerationJob {
            run_id: "r1".into(),
            batch_id: "b1".into(),
            owner_id: "o1".into(),
            prompt: "A landing page for a bakery".into(),
            flavor: flavor.map(String::from),
            model: ModelKey::Gemini,
        }
    }

    #[tokio::test]
    async fn test_execute_stores_extracted_document() {
        let provider = Canned::ok("```html\n<!DOCTYPE html><html>bread</html>\n```");
        let artifacts = MemoryArtifactStore::new();
        let job = job(Some("Bold"));

        job.execute(&provider, &artifacts).await.unwrap();

        let stored = artifacts.get(&job.artifact_key()).await.unwrap().unwrap();
        assert_eq!(stored.bytes, b"<!DOCTYPE html><html>bread</html>");
        assert_eq!(stored.content_type, DOCUMENT_CONTENT_TYPE);

        let seen = provider.seen.lock();
        assert_eq!(seen[0].target, Target::Model(ModelKey::Gemini));
        assert!(seen[0].system.contains("\"Bold\""));
        assert_eq!(seen[0].user, "A landing page for a bakery");
    }

    #[tokio::test]
    async fn test_missing_flavor_uses_default_prompt() {
        let provider = Canned::ok("<!DOCTYPE html><html></html>");
        let artifacts = MemoryArtifactStore::new();
        job(None).execute(&provider, &artifacts).await.unwrap();
        assert!(provider.seen.lock()[0].system.contains("\"default\""));
    }

    #[tokio::test]
    async fn test_empty_completion_is_extraction_error() {
        let provider = Canned::ok("  \n ");
        let artifacts = MemoryArtifactStore::new();
        let err = job(None).execute(&provider, &artifacts).await.unwrap_err();
        assert!(matches!(err, Error::Extraction(_)));
        assert!(artifacts.is_empty());
    }

    #[tokio::test]
    async fn test_provider_error_propagates() {
        let provider = Canned {
            reply: Err(Error::Provider("503".into())),
            seen: Mutex::new(Vec::new()),
        };
        let artifacts = MemoryArtifactStore::new();
        let err = job(None).execute(&provider, &artifacts).await.unwrap_err();
        assert!(matches!(err, Error::Provider(_)));
        assert!(artifacts.is_empty());
    }
}
