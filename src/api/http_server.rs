// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::{Context, Result};
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tokio::signal;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use super::handlers::{health_handler, metrics_handler, root_handler};
use super::reconstruct::reconstruct_handler;
use crate::config::ServerConfig;
use crate::monitoring::Metrics;
use crate::vision::ReconstructionModelManager;

/// Room for multipart boundaries and part headers on top of the file limit
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub model_manager: Arc<ReconstructionModelManager>,
    pub metrics: Metrics,
    /// Largest accepted image upload in bytes
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(model_manager: ReconstructionModelManager, max_upload_bytes: usize) -> Result<Self> {
        Ok(Self {
            model_manager: Arc::new(model_manager),
            metrics: Metrics::new().context("Failed to register metrics")?,
            max_upload_bytes,
        })
    }
}

pub fn create_app(state: AppState) -> Router {
    let body_limit = state.max_upload_bytes.saturating_add(MULTIPART_OVERHEAD_BYTES);

    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/reconstruct/", post(reconstruct_handler))
        .route("/reconstruct", post(reconstruct_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn start_server(config: &ServerConfig, state: AppState) -> Result<()> {
    let app = create_app(state);

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("API server listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("API server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
