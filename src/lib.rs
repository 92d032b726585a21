// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod api;
pub mod autoencoder;
pub mod cli;
pub mod config;
pub mod monitoring;
pub mod nn;
pub mod version;
pub mod vision;

// Re-export main types
pub use api::{create_app, ApiError, AppState, ReconstructResponse};
pub use autoencoder::{
    AutoencoderOutput, BackendKind, NativeBackend, OnnxBackend, ReconstructionBackend,
    UNetAutoencoder,
};
pub use config::{ModelConfig, NodeConfig, ServerConfig};
pub use monitoring::Metrics;
pub use vision::{Reconstruction, ReconstructionModelManager};
