//! Provider configuration loading and model routing.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use tastebuds_core::ModelKey;
use tracing::warn;

pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_NAMING_MODEL: &str = "openai/gpt-5-nano";

/// Provider configuration read from provider-config.json.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Route used by the batch naming job.
    #[serde(default = "default_naming_model")]
    pub naming_model: String,
    /// Per-key route overrides, keyed by wire identifier (`"openai"`, ...).
    #[serde(default)]
    pub routes: HashMap<String, String>,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.into()
}
fn default_naming_model() -> String {
    DEFAULT_NAMING_MODEL.into()
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.into(),
            naming_model: DEFAULT_NAMING_MODEL.into(),
            routes: HashMap::new(),
        }
    }
}

impl ProviderConfig {
    /// Load config from file, falling back to env vars and defaults.
    pub fn load(config_path: &Path) -> Self {
        let mut config: ProviderConfig = match std::fs::read_to_string(config_path) {
            Ok(s) => serde_json::from_str(&s).unwrap_or_else(|e| {
                warn!(
                    "Ignoring malformed provider config {}: {}",
                    config_path.display(),
                    e
                );
                ProviderConfig::default()
            }),
            Err(_) => ProviderConfig::default(),
        };

        if config.api_key.as_deref().map_or(true, |k| k.trim().is_empty()) {
            config.api_key = std::env::var("OPENROUTER_API_KEY")
                .ok()
                .filter(|k| !k.trim().is_empty());
        }

        for key in config.routes.keys() {
            if ModelKey::parse(key).is_err() {
                warn!("Route override for unknown model key '{}' is ignored", key);
            }
        }

        config
    }

    /// Upstream route for a model key, honouring overrides.
    pub fn route_for(&self, model: ModelKey) -> &str {
        self.routes
            .get(model.as_str())
            .map(String::as_str)
            .unwrap_or_else(|| model.default_route())
    }

    pub fn chat_completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}
