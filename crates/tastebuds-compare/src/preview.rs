//! Scoped handles onto documents shown during a comparison.
//!
//! A handle keeps its bytes registered for as long as it lives; dropping it
//! (session end, supersede, shutdown) releases the entry.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

#[derive(Default)]
struct Inner {
    live: Mutex<HashSet<u64>>,
    next_id: AtomicU64,
}

/// Tracks every live preview handle.
#[derive(Clone, Default)]
pub struct PreviewRegistry {
    inner: Arc<Inner>,
}

impl PreviewRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `bytes` and return the handle that owns the registration.
    pub fn acquire(&self, bytes: impl Into<Arc<[u8]>>, content_type: impl Into<String>) -> PreviewHandle {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.live.lock().insert(id);
        PreviewHandle {
            id,
            bytes: bytes.into(),
            content_type: content_type.into(),
            inner: self.inner.clone(),
        }
    }

    /// Number of handles not yet released.
    pub fn live(&self) -> usize {
        self.inner.live.lock().len()
    }
}

/// RAII registration of one displayed document.
pub struct PreviewHandle {
    id: u64,
    bytes: Arc<[u8]>,
    content_type: String,
    inner: Arc<Inner>,
}

impl PreviewHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }
}

impl std::fmt::Debug for PreviewHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreviewHandle")
            .field("id", &self.id)
            .field("len", &self.bytes.len())
            .field("content_type", &self.content_type)
            .finish()
    }
}

impl Drop for PreviewHandle {
    fn drop(&mut self) {
        self.inner.live.lock().remove(&self.id);
        debug!("Released preview {}", self.id);
    }
}
