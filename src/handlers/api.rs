use axum::{Json, extract::State};
use serde::Serialize;
use std::sync::Arc;

use crate::state::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    /// Media streams currently bridged
    pub active_calls: usize,
}

/// Liveness probe. Reports the number of open media streams.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "OK",
        active_calls: state.ws_connection_count(),
    })
}
