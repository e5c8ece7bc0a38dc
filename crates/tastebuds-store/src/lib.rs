//! Tastebuds Store — SQLite rows for batches/runs/profiles plus the
//! artifact object store that holds generated documents.

pub mod artifacts;
pub mod quota;
pub mod schema;
pub mod sqlite;
pub mod types;

pub use artifacts::{
    Artifact, ArtifactKey, ArtifactStore, FsArtifactStore, MemoryArtifactStore, DOCUMENT_CONTENT_TYPE,
};
pub use quota::QuotaLedger;
pub use sqlite::SqliteStore;
pub use types::*;
