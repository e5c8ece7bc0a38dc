//! Artifact object store — one generated document per run.
//!
//! Layout: `{ownerId}/{batchId}/{runId}/document`, with the content type kept
//! in a `content-type` sidecar next to it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::RwLock;
use tastebuds_core::{Error, Result};
use tracing::debug;

pub const DOCUMENT_CONTENT_TYPE: &str = "text/html; charset=utf-8";

const DOCUMENT_FILE: &str = "document";
const CONTENT_TYPE_FILE: &str = "content-type";

/// Identifies the artifact produced by one run.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactKey {
    pub owner_id: String,
    pub batch_id: String,
    pub run_id: String,
}

impl ArtifactKey {
    pub fn new(
        owner_id: impl Into<String>,
        batch_id: impl Into<String>,
        run_id: impl Into<String>,
    ) -> Self {
        Self {
            owner_id: owner_id.into(),
            batch_id: batch_id.into(),
            run_id: run_id.into(),
        }
    }

    /// Object path relative to the store root.
    pub fn path(&self) -> String {
        format!(
            "{}/{}/{}/{}",
            self.owner_id, self.batch_id, self.run_id, DOCUMENT_FILE
        )
    }

    /// Directory holding the document, rejecting segments that would escape the root.
    fn dir_under(&self, root: &Path) -> Result<PathBuf> {
        let mut dir = root.to_path_buf();
        for segment in [&self.owner_id, &self.batch_id, &self.run_id] {
            if segment.is_empty()
                || segment == "."
                || segment == ".."
                || segment.contains(&['/', '\\', '\0'][..])
            {
                return Err(Error::Persistence(format!(
                    "Invalid artifact path segment: {:?}",
                    segment
                )));
            }
            dir.push(segment);
        }
        Ok(dir)
    }
}

impl std::fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.path())
    }
}

/// A stored document and its content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// Key-value object store for artifacts. Puts are upserts.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn put(&self, key: &ArtifactKey, bytes: &[u8], content_type: &str) -> Result<()>;

    /// Returns `Ok(None)` if nothing was stored under `key`.
    async fn get(&self, key: &ArtifactKey) -> Result<Option<Artifact>>;
}

/// Filesystem-backed artifact store rooted at `data/artifacts/`.
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn put(&self, key: &ArtifactKey, bytes: &[u8], content_type: &str) -> Result<()> {
        let dir = key.dir_under(&self.root)?;
        let persist = |e: std::io::Error| Error::Persistence(format!("{}: {}", key, e));

        tokio::fs::create_dir_all(&dir).await.map_err(persist)?;
        tokio::fs::write(dir.join(DOCUMENT_FILE), bytes)
            .await
            .map_err(persist)?;
        tokio::fs::write(dir.join(CONTENT_TYPE_FILE), content_type)
            .await
            .map_err(persist)?;

        debug!("Stored artifact {} ({} bytes)", key, bytes.len());
        Ok(())
    }

    async fn get(&self, key: &ArtifactKey) -> Result<Option<Artifact>> {
        let dir = key.dir_under(&self.root)?;
        let bytes = match tokio::fs::read(dir.join(DOCUMENT_FILE)).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::Storage(format!("{}: {}", key, e))),
        };
        let content_type = tokio::fs::read_to_string(dir.join(CONTENT_TYPE_FILE))
            .await
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|_| DOCUMENT_CONTENT_TYPE.to_string());
        Ok(Some(Artifact {
            bytes,
            content_type,
        }))
    }
}

/// In-memory artifact store.
#[derive(Default)]
pub struct MemoryArtifactStore {
    objects: RwLock<HashMap<String, Artifact>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }

    pub fn contains(&self, key: &ArtifactKey) -> bool {
        self.objects.read().contains_key(&key.path())
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn put(&self, key: &ArtifactKey, bytes: &[u8], content_type: &str) -> Result<()> {
        self.objects.write().insert(
            key.path(),
            Artifact {
                bytes: bytes.to_vec(),
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    async fn get(&self, key: &ArtifactKey) -> Result<Option<Artifact>> {
        Ok(self.objects.read().get(&key.path()).cloned())
    }
}
