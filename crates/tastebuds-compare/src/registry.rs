//! Live reduction sessions, at most one per (owner, batch).
//!
//! Sessions that nobody has looked at for the idle timeout are evicted, which
//! releases their preview handles.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tracing::info;

use crate::reducer::Reduction;

/// One user's reduction over one batch.
#[derive(Debug)]
pub struct Session<T> {
    pub id: String,
    pub owner_id: String,
    pub batch_id: String,
    pub reduction: Reduction<T>,
    last_seen: Instant,
}

pub type SharedSession<T> = Arc<Mutex<Session<T>>>;

pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// All open sessions.
pub struct SessionRegistry<T> {
    sessions: RwLock<HashMap<String, SharedSession<T>>>,
    idle_timeout: Duration,
}

impl<T> Default for SessionRegistry<T> {
    fn default() -> Self {
        Self::with_idle_timeout(DEFAULT_IDLE_TIMEOUT)
    }
}

impl<T> SessionRegistry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_idle_timeout(idle_timeout: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            idle_timeout,
        }
    }

    /// Open a session, superseding the owner's previous one for the batch.
    pub fn open(&self, owner_id: &str, batch_id: &str, reduction: Reduction<T>) -> SharedSession<T> {
        self.evict_idle();

        let id = uuid::Uuid::new_v4().to_string();
        let session = Arc::new(Mutex::new(Session {
            id: id.clone(),
            owner_id: owner_id.to_string(),
            batch_id: batch_id.to_string(),
            reduction,
            last_seen: Instant::now(),
        }));

        let superseded: Vec<SharedSession<T>> = {
            let mut sessions = self.sessions.write();
            let stale: Vec<String> = sessions
                .iter()
                .filter(|(_, s)| {
                    let s = s.lock();
                    s.owner_id == owner_id && s.batch_id == batch_id
                })
                .map(|(k, _)| k.clone())
                .collect();
            let removed = stale.iter().filter_map(|k| sessions.remove(k)).collect();
            sessions.insert(id.clone(), session.clone());
            removed
        };

        info!(
            session_id = %id,
            batch_id,
            superseded = superseded.len(),
            "Opened comparison session"
        );
        session
    }

    /// Look up a session and mark it as seen.
    pub fn get(&self, id: &str) -> Option<SharedSession<T>> {
        let session = self.sessions.read().get(id).cloned()?;
        session.lock().last_seen = Instant::now();
        Some(session)
    }

    /// Drop every session idle for at least the idle timeout.
    pub fn evict_idle(&self) -> usize {
        self.evict_idle_at(Instant::now())
    }

    /// Like [`evict_idle`](Self::evict_idle), measuring idleness up to `now`.
    pub fn evict_idle_at(&self, now: Instant) -> usize {
        let evicted: Vec<SharedSession<T>> = {
            let mut sessions = self.sessions.write();
            let idle: Vec<String> = sessions
                .iter()
                .filter(|(_, s)| now.saturating_duration_since(s.lock().last_seen) >= self.idle_timeout)
                .map(|(k, _)| k.clone())
                .collect();
            idle.iter().filter_map(|k| sessions.remove(k)).collect()
        };

        if !evicted.is_empty() {
            info!(count = evicted.len(), "Evicted idle comparison sessions");
        }
        evicted.len()
    }

    /// End a session. Its items are released once the last reference drops.
    pub fn close(&self, id: &str) -> bool {
        let removed = self.sessions.write().remove(id);
        if removed.is_some() {
            info!(session_id = id, "Closed comparison session");
        }
        removed.is_some()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}
