//! HTTP route handlers, all nested under `/api`.

pub mod batches;
pub mod compare;
pub mod models;

use std::sync::Arc;

use axum::body::Body;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the main Axum router with all routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/api", api_routes())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health))
        .merge(models::routes())
        .merge(batches::routes())
        .merge(compare::routes())
}

/// GET /api/health
async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Raw document response with its stored content type.
pub(crate) fn document_response(bytes: Vec<u8>, content_type: &str) -> Response {
    ([(header::CONTENT_TYPE, content_type.to_string())], Body::from(bytes)).into_response()
}
