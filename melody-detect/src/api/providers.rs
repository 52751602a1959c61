//! Provider listing

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::providers::ProviderInfo;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct ProvidersResponse {
    pub providers: Vec<ProviderInfo>,
}

/// GET /api/providers
pub async fn list_providers(State(state): State<AppState>) -> Json<ProvidersResponse> {
    Json(ProvidersResponse {
        providers: state.orchestrator.registry().describe(),
    })
}

pub fn provider_routes() -> Router<AppState> {
    Router::new().route("/api/providers", get(list_providers))
}
