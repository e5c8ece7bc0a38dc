//! Tastebuds Core — error taxonomy, configuration, supported models.

pub mod config;
pub mod error;
pub mod model;
pub mod time;

pub use config::{DataPaths, JobLimits, TastebudsConfig};
pub use error::{Error, FailureReason, Result};
pub use model::{ModelKey, DEFAULT_FLAVORS, DEFAULT_MODELS};
pub use time::now_millis;
