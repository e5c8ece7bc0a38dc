//! Batch admission, listing, progress polling and run restarts.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tastebuds_core::Error;
use tastebuds_runtime::{status, BatchSubmission};
use tastebuds_store::ArtifactKey;
use tracing::info;

use crate::auth::Owner;
use crate::error::ApiResult;
use crate::routes::document_response;
use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/batches", post(create_batch).get(list_batches))
        .route("/batches/{batch_id}", get(get_batch))
        .route("/batches/{batch_id}/runs", get(poll_runs))
        .route("/batches/{batch_id}/runs/{run_id}/start", post(start_run))
        .route("/batches/{batch_id}/runs/{run_id}/document", get(get_document))
}

/// POST /api/batches — admit a batch and launch its jobs.
async fn create_batch(
    State(state): State<Arc<AppState>>,
    Owner(owner): Owner,
    body: Result<Json<BatchSubmission>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(body) = body?;
    let admitted = state.orchestrator.submit_batch(&owner, &body)?;
    let run_ids = admitted.run_ids();
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "batch": admitted.batch,
            "runIds": run_ids,
        })),
    ))
}

/// GET /api/batches — the caller's batches, newest first.
async fn list_batches(
    State(state): State<Arc<AppState>>,
    Owner(owner): Owner,
) -> ApiResult<Json<serde_json::Value>> {
    let batches = state.store.list_batches(&owner)?;
    Ok(Json(serde_json::json!({ "batches": batches })))
}

/// GET /api/batches/{batch_id}
async fn get_batch(
    State(state): State<Arc<AppState>>,
    Owner(owner): Owner,
    Path(batch_id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let batch = state.owned_batch(&owner, &batch_id)?;
    Ok(Json(serde_json::json!({ "batch": batch })))
}

/// GET /api/batches/{batch_id}/runs — progress view ordered by `order`.
async fn poll_runs(
    State(state): State<Arc<AppState>>,
    Owner(owner): Owner,
    Path(batch_id): Path<String>,
) -> ApiResult<Json<tastebuds_runtime::BatchProgress>> {
    state.owned_batch(&owner, &batch_id)?;
    Ok(Json(status::poll(&state.store, &batch_id)?))
}

/// POST /api/batches/{batch_id}/runs/{run_id}/start — re-run one cell.
async fn start_run(
    State(state): State<Arc<AppState>>,
    Owner(owner): Owner,
    Path((batch_id, run_id)): Path<(String, String)>,
) -> ApiResult<Json<serde_json::Value>> {
    let (run, _handle) = state.orchestrator.start_run(&owner, &batch_id, &run_id)?;
    info!(batch_id = %batch_id, run_id = %run.id, "Run started on request");
    Ok(Json(serde_json::json!({
        "message": "Run started",
        "runId": run.id,
    })))
}

/// GET /api/batches/{batch_id}/runs/{run_id}/document — the generated document.
async fn get_document(
    State(state): State<Arc<AppState>>,
    Owner(owner): Owner,
    Path((batch_id, run_id)): Path<(String, String)>,
) -> ApiResult<Response> {
    let batch = state.owned_batch(&owner, &batch_id)?;
    state
        .store
        .get_run(&batch_id, &run_id)?
        .ok_or_else(|| Error::NotFound(format!("Run {}", run_id)))?;

    let key = ArtifactKey::new(&batch.owner_id, &batch.id, &run_id);
    let artifact = state
        .artifacts()
        .get(&key)
        .await?
        .ok_or_else(|| Error::NotFound(format!("No document for run {}", run_id)))?;
    Ok(document_response(artifact.bytes, &artifact.content_type))
}
