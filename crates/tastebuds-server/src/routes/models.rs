//! Supported model catalogue.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use tastebuds_core::{ModelKey, DEFAULT_FLAVORS, DEFAULT_MODELS};

use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/models", get(list_models))
}

/// GET /api/models — catalogue, defaults and upstream routes.
async fn list_models(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let models: Vec<serde_json::Value> = ModelKey::all()
        .iter()
        .map(|m| {
            serde_json::json!({
                "key": m,
                "label": m.label(),
                "exactModel": m.exact_model(),
                "route": state.provider_config.route_for(*m),
            })
        })
        .collect();

    Json(serde_json::json!({
        "models": models,
        "defaultModels": DEFAULT_MODELS,
        "defaultFlavors": DEFAULT_FLAVORS,
        "providerConfigured": state.provider_config.is_configured(),
    }))
}
