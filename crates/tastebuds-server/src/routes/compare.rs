//! Comparison sessions: pairwise reduction of a batch's finished documents.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tastebuds_compare::{Key, Reduction, Session, SessionState, SharedSession, Side};
use tastebuds_core::{Error, Result};
use tastebuds_store::ArtifactKey;
use tracing::{info, warn};

use crate::auth::Owner;
use crate::error::ApiResult;
use crate::routes::document_response;
use crate::state::{AppState, Candidate, CandidateView};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/batches/{batch_id}/compare", post(create_session))
        .route(
            "/compare/{session_id}",
            get(get_session).delete(close_session),
        )
        .route("/compare/{session_id}/select", post(select))
        .route("/compare/{session_id}/active/{slot}", get(active_document))
}

// ---------------------------------------------------------------
// Request/Response types
// ---------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SelectBody {
    side: Option<Side>,
    key: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub session_id: String,
    pub batch_id: String,
    pub state: SessionState,
    pub active: Vec<CandidateView>,
    pub remaining: usize,
    pub total: usize,
    pub comparisons: usize,
    pub winner: Option<CandidateView>,
}

impl SessionView {
    fn of(session: &Session<Candidate>) -> Self {
        let r = &session.reduction;
        Self {
            session_id: session.id.clone(),
            batch_id: session.batch_id.clone(),
            state: r.state(),
            active: r.active().iter().map(CandidateView::from).collect(),
            remaining: r.remaining(),
            total: r.total(),
            comparisons: r.comparisons(),
            winner: r.winner().map(CandidateView::from),
        }
    }
}

fn owned_session(
    state: &AppState,
    owner_id: &str,
    session_id: &str,
) -> Result<SharedSession<Candidate>> {
    let session = state
        .sessions
        .get(session_id)
        .ok_or_else(|| Error::NotFound(format!("Session {}", session_id)))?;
    if session.lock().owner_id != owner_id {
        return Err(Error::Authz(format!(
            "Session {} belongs to another user",
            session_id
        )));
    }
    Ok(session)
}

// ---------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------

/// POST /api/batches/{batch_id}/compare — start over the batch's finished runs.
async fn create_session(
    State(state): State<Arc<AppState>>,
    Owner(owner): Owner,
    Path(batch_id): Path<String>,
) -> ApiResult<(StatusCode, Json<SessionView>)> {
    let batch = state.owned_batch(&owner, &batch_id)?;
    let runs = state.store.list_runs(&batch_id)?;

    let mut pool = Vec::new();
    for run in runs.into_iter().filter(|r| r.succeeded()) {
        let key = ArtifactKey::new(&batch.owner_id, &batch.id, &run.id);
        match state.artifacts().get(&key).await? {
            Some(artifact) => pool.push(Candidate {
                preview: state.previews.acquire(artifact.bytes, artifact.content_type),
                run_id: run.id,
                flavor: run.flavor,
                model: run.model,
            }),
            None => warn!(run_id = %run.id, "Succeeded run has no document, skipping"),
        }
    }

    let session = state
        .sessions
        .open(&owner, &batch_id, Reduction::initialize(pool));
    let view = SessionView::of(&session.lock());
    Ok((StatusCode::CREATED, Json(view)))
}

/// GET /api/compare/{session_id}
async fn get_session(
    State(state): State<Arc<AppState>>,
    Owner(owner): Owner,
    Path(session_id): Path<String>,
) -> ApiResult<Json<SessionView>> {
    let session = owned_session(&state, &owner, &session_id)?;
    let view = SessionView::of(&session.lock());
    Ok(Json(view))
}

/// POST /api/compare/{session_id}/select — pointer (`side`) or keyboard (`key`) choice.
async fn select(
    State(state): State<Arc<AppState>>,
    Owner(owner): Owner,
    Path(session_id): Path<String>,
    body: std::result::Result<Json<SelectBody>, JsonRejection>,
) -> ApiResult<Json<SessionView>> {
    let Json(body) = body?;
    let session = owned_session(&state, &owner, &session_id)?;
    let mut guard = session.lock();
    let before = guard.reduction.comparisons();

    match (body.side, body.key.as_deref()) {
        (Some(side), _) => {
            guard.reduction.select(side);
        }
        (None, Some(name)) => match Key::parse(name) {
            Some(key) => {
                guard.reduction.handle_key(key);
            }
            None => info!(session_id = %session_id, "Ignoring unbound key '{}'", name),
        },
        (None, None) => {
            return Err(Error::Validation("Expected `side` or `key`".into()).into());
        }
    }

    if guard.reduction.comparisons() > before {
        info!(
            session_id = %session_id,
            remaining = guard.reduction.remaining(),
            state = ?guard.reduction.state(),
            "Selection recorded"
        );
    }
    Ok(Json(SessionView::of(&guard)))
}

/// GET /api/compare/{session_id}/active/{slot} — document shown at slot 0 or 1.
async fn active_document(
    State(state): State<Arc<AppState>>,
    Owner(owner): Owner,
    Path((session_id, slot)): Path<(String, usize)>,
) -> ApiResult<Response> {
    let side = Side::from_index(slot)
        .ok_or_else(|| Error::Validation(format!("Invalid slot {}", slot)))?;
    let session = owned_session(&state, &owner, &session_id)?;
    let guard = session.lock();
    let candidate = guard
        .reduction
        .active_at(side)
        .ok_or_else(|| Error::NotFound(format!("Nothing shown at slot {}", slot)))?;
    Ok(document_response(
        candidate.preview.bytes().to_vec(),
        candidate.preview.content_type(),
    ))
}

/// DELETE /api/compare/{session_id} — end the session and release its previews.
async fn close_session(
    State(state): State<Arc<AppState>>,
    Owner(owner): Owner,
    Path(session_id): Path<String>,
) -> ApiResult<StatusCode> {
    owned_session(&state, &owner, &session_id)?;
    state.sessions.close(&session_id);
    Ok(StatusCode::NO_CONTENT)
}
