//! Generation backends for Tastebuds.
//!
//! Every model key is served through one OpenAI-compatible chat completion
//! endpoint (OpenRouter by default). Calls are non-streaming: a job needs the
//! whole document before it can extract anything.

pub mod config;
pub mod openrouter;
pub mod prompt;
pub mod provider;
pub mod types;

pub use config::ProviderConfig;
pub use openrouter::OpenRouterProvider;
pub use provider::{GenerationProvider, GenerationRequest, Target};
pub use types::*;
