// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::Result;
use tracing::{info, warn};

use crate::api::{start_server, AppState};
use crate::config::NodeConfig;
use crate::version;
use crate::vision::ReconstructionModelManager;

pub async fn run(config: NodeConfig) -> Result<()> {
    info!("🚀 Starting {}", version::get_version_string());
    info!(
        backend = %config.model.backend,
        checkpoint = %config.model.checkpoint_path.display(),
        input_size = config.model.input_size,
        "Model configuration"
    );

    let manager = ReconstructionModelManager::new(config.model.clone()).await?;
    if !manager.is_loaded() {
        warn!("⚠️ Serving without a model; /reconstruct/ will answer 500 until a checkpoint is provided");
    }

    let state = AppState::new(manager, config.server.max_upload_bytes)?;
    start_server(&config.server, state).await
}
