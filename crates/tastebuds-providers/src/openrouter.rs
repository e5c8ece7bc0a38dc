//! OpenRouter (OpenAI-compatible) chat completion client.

use async_trait::async_trait;
use reqwest::Client;
use tastebuds_core::{Error, Result};
use tracing::{debug, error};

use crate::config::ProviderConfig;
use crate::provider::{GenerationProvider, GenerationRequest, Target};
use crate::types::{ChatCompletionRequest, ChatCompletionResponse};

pub struct OpenRouterProvider {
    client: Client,
    config: ProviderConfig,
}

impl OpenRouterProvider {
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    fn route(&self, target: Target) -> &str {
        match target {
            Target::Model(model) => self.config.route_for(model),
            Target::Naming => &self.config.naming_model,
        }
    }
}

#[async_trait]
impl GenerationProvider for OpenRouterProvider {
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or_else(|| Error::Provider("OPENROUTER_API_KEY not set".into()))?;

        let url = self.config.chat_completions_url();
        let model = self.route(request.target);
        let messages = request.messages();
        let body = ChatCompletionRequest {
            model,
            messages: &messages,
            stream: false,
        };

        debug!("Requesting completion from {} with model {}", url, model);

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Provider(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("Completion API error {} for {}: {}", status, model, body);
            return Err(Error::Provider(format!("API error {}: {}", status, body)));
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| Error::Provider(format!("Malformed completion response: {}", e)))?;

        let content = parsed.into_content().unwrap_or_default();
        if content.is_empty() {
            debug!("Empty completion content from {}", model);
        }
        Ok(content)
    }
}
