//! The generation backend seam.

use async_trait::async_trait;
use tastebuds_core::{ModelKey, Result};

use crate::types::ChatMessage;

/// What a request is for; the provider maps it to an upstream route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// A document generation for one model key.
    Model(ModelKey),
    /// The short batch-naming call.
    Naming,
}

/// One system + user exchange.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub target: Target,
    pub system: String,
    pub user: String,
}

impl GenerationRequest {
    pub fn new(target: Target, system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            target,
            system: system.into(),
            user: user.into(),
        }
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        vec![
            ChatMessage::system(self.system.clone()),
            ChatMessage::user(self.user.clone()),
        ]
    }
}

/// A backend that turns a request into raw completion text.
///
/// Implementations must be cancel-safe: the caller drops the future when the
/// job's timeout fires.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<String>;
}
