//! Background naming of a freshly admitted batch.

use tastebuds_core::Result;
use tastebuds_providers::prompt::{clean_name, naming_prompt, NAMING_SYSTEM_PROMPT};
use tastebuds_providers::{GenerationProvider, GenerationRequest, Target};
use tastebuds_store::SqliteStore;
use tracing::{debug, instrument};

/// Ask the provider for a short name and store it on the batch.
///
/// Returns the stored name, or `None` if the provider gave nothing usable.
#[instrument(skip(provider, store, prompt))]
pub async fn name_batch(
    provider: &dyn GenerationProvider,
    store: &SqliteStore,
    batch_id: &str,
    prompt: &str,
) -> Result<Option<String>> {
    let request = GenerationRequest::new(Target::Naming, NAMING_SYSTEM_PROMPT, naming_prompt(prompt));
    let raw = provider.generate(&request).await?;

    let Some(name) = clean_name(&raw) else {
        debug!("Provider returned no usable name");
        return Ok(None);
    };

    if !store.set_batch_name(batch_id, &name)? {
        debug!("Batch disappeared before it could be named");
        return Ok(None);
    }
    debug!("Named batch '{}'", name);
    Ok(Some(name))
}
