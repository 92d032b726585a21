// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::error;

use super::http_server::AppState;
use crate::monitoring::METRICS_CONTENT_TYPE;
use crate::version;

pub const WELCOME_MESSAGE: &str =
    "Welcome to the Image Reconstruction API. POST an image to /reconstruct/ as the 'file' field.";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// "healthy" when a model is loaded, "degraded" otherwise
    pub status: String,
    pub model_loaded: bool,
    pub backend: Option<String>,
    pub input_size: u32,
    pub version: String,
}

/// GET /
pub async fn root_handler() -> impl IntoResponse {
    Json(json!({ "message": WELCOME_MESSAGE }))
}

/// GET /health
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let info = state.model_manager.model_info();
    Json(HealthResponse {
        status: if info.available { "healthy" } else { "degraded" }.to_string(),
        model_loaded: info.available,
        backend: info.backend.map(str::to_string),
        input_size: info.input_size,
        version: version::VERSION_NUMBER.to_string(),
    })
}

/// GET /metrics - Prometheus text exposition
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    match state.metrics.render() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, METRICS_CONTENT_TYPE)],
            body,
        )
            .into_response(),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
