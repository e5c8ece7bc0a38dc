//! Runtime — batch admission, generation jobs, status polling.
//!
//! Admission is synchronous and fast-fail. Everything after it runs on
//! spawned tasks and is only observable through the run rows.

pub mod extract;
pub mod job;
pub mod naming;
pub mod orchestrator;
pub mod status;
pub mod types;

pub use extract::extract_document;
pub use job::GenerationJob;
pub use orchestrator::Orchestrator;
pub use status::{poll, poll_at, wait_until_done};
pub use types::*;
