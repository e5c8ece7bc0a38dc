//! Supported generation backends.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Identifier selecting which external backend fulfills a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKey {
    OpenAI,
    Anthropic,
    Gemini,
    Glm,
    DeepSeek,
}

pub const DEFAULT_MODELS: &[ModelKey] = &[ModelKey::OpenAI, ModelKey::Anthropic, ModelKey::Gemini];

pub const DEFAULT_FLAVORS: &[&str] = &[
    "Clean and minimalistic",
    "Warm and welcoming, bright colour schemes",
    "Bold and expressive, dark colour schemes",
    "Futuristic and experimental",
];

impl ModelKey {
    pub fn all() -> &'static [ModelKey] {
        &[
            ModelKey::OpenAI,
            ModelKey::Anthropic,
            ModelKey::Gemini,
            ModelKey::Glm,
            ModelKey::DeepSeek,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAI => "openai",
            Self::Anthropic => "anthropic",
            Self::Gemini => "gemini",
            Self::Glm => "glm",
            Self::DeepSeek => "deepseek",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::OpenAI => "OpenAI",
            Self::Anthropic => "Anthropic",
            Self::Gemini => "Gemini",
            Self::Glm => "GLM",
            Self::DeepSeek => "DeepSeek",
        }
    }

    /// Human-readable name of the upstream model behind this key.
    pub fn exact_model(&self) -> &'static str {
        match self {
            Self::OpenAI => "GPT-5.1",
            Self::Anthropic => "Claude Sonnet 4.5",
            Self::Gemini => "Gemini 2.5 Pro",
            Self::Glm => "GLM 4.6",
            Self::DeepSeek => "DeepSeek R1",
        }
    }

    /// Default OpenRouter route for this key.
    pub fn default_route(&self) -> &'static str {
        match self {
            Self::OpenAI => "openai/gpt-5.1",
            Self::Anthropic => "anthropic/claude-sonnet-4.5",
            Self::Gemini => "google/gemini-2.5-pro",
            Self::Glm => "z-ai/glm-4.6",
            Self::DeepSeek => "deepseek/deepseek-r1",
        }
    }

    /// Parse a wire identifier. Unknown identifiers are a validation error.
    pub fn parse(s: &str) -> Result<Self> {
        s.parse()
    }
}

impl std::str::FromStr for ModelKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "openai" => Ok(Self::OpenAI),
            "anthropic" => Ok(Self::Anthropic),
            "gemini" => Ok(Self::Gemini),
            "glm" => Ok(Self::Glm),
            "deepseek" => Ok(Self::DeepSeek),
            other => Err(Error::Validation(format!("Unsupported model: {}", other))),
        }
    }
}

impl std::fmt::Display for ModelKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
