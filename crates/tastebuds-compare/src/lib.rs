//! Survivor reduction over a batch's finished documents.
//!
//! A session shows two candidates at a time; the chosen one stays in place
//! and the other is eliminated for good. N candidates take N−1 choices.

pub mod preview;
pub mod reducer;
pub mod registry;

pub use preview::{PreviewHandle, PreviewRegistry};
pub use reducer::{Key, Reduction, SessionState, Side};
pub use registry::{Session, SessionRegistry, SharedSession, DEFAULT_IDLE_TIMEOUT};
