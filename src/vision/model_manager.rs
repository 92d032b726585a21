// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Owns the loaded reconstruction backend

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use image::{DynamicImage, RgbImage};
use ndarray::Array4;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::preprocessing::{image_to_tensor, tensor_to_image};
use crate::autoencoder::{
    resolve_checkpoint, BackendKind, NativeBackend, OnnxBackend, ReconstructionBackend,
};
use crate::config::ModelConfig;

/// One reconstructed upload
#[derive(Debug, Clone)]
pub struct Reconstruction {
    /// Bottleneck tensor `[1, 1024, S/32, S/32]`
    pub latent: Array4<f32>,
    /// Decoded `S x S` image
    pub image: RgbImage,
    pub backend: &'static str,
    pub processing_time_ms: u64,
}

/// Information about the loaded model
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub available: bool,
    pub backend: Option<&'static str>,
    pub input_size: u32,
    pub checkpoint: Option<PathBuf>,
}

/// Holds at most one backend, loaded once at startup and shared read-only
pub struct ReconstructionModelManager {
    backend: Option<Arc<dyn ReconstructionBackend>>,
    checkpoint: Option<PathBuf>,
    input_size: u32,
}

impl std::fmt::Debug for ReconstructionModelManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconstructionModelManager")
            .field("backend", &self.backend_name())
            .field("checkpoint", &self.checkpoint)
            .field("input_size", &self.input_size)
            .finish()
    }
}

fn load_backend(config: &ModelConfig, path: &Path) -> Result<Arc<dyn ReconstructionBackend>> {
    let backend: Arc<dyn ReconstructionBackend> = match config.backend {
        BackendKind::Native => Arc::new(NativeBackend::from_checkpoint(path, config.input_size)?),
        BackendKind::Onnx => Arc::new(OnnxBackend::new(
            path,
            config.input_size,
            config.intra_threads,
        )?),
    };
    Ok(backend)
}

impl ReconstructionModelManager {
    /// Resolve the checkpoint and load the configured backend
    ///
    /// A checkpoint that is absent (and not fetchable from a hub repo) is
    /// logged and leaves the manager without a model; the server keeps
    /// running and reports it per request. Every other failure, such as a
    /// corrupt or incompatible checkpoint or a failed download, is returned.
    pub async fn new(config: ModelConfig) -> Result<Self> {
        let resolved =
            resolve_checkpoint(&config.checkpoint_path, config.hub_repo.as_deref()).await?;
        let Some(path) = resolved else {
            warn!(
                "⚠️ Checkpoint not found: {}",
                config.checkpoint_path.display()
            );
            return Ok(Self::unloaded(config.input_size));
        };

        let load_path = path.clone();
        let kind = config.backend;
        let input_size = config.input_size;
        let backend = tokio::task::spawn_blocking(move || load_backend(&config, &load_path))
            .await
            .context("Model loading task failed")?
            .with_context(|| format!("Failed to load {} autoencoder from {}", kind, path.display()))?;

        info!(
            "✅ {} autoencoder loaded from {} ({}x{} input)",
            kind,
            path.display(),
            input_size,
            input_size
        );
        Ok(Self {
            backend: Some(backend),
            checkpoint: Some(path),
            input_size,
        })
    }

    /// Wrap an already-built backend
    pub fn with_backend(backend: Arc<dyn ReconstructionBackend>) -> Self {
        Self {
            input_size: backend.input_size(),
            backend: Some(backend),
            checkpoint: None,
        }
    }

    /// No model; `input_size` is still reported by `/health`
    pub fn unloaded(input_size: u32) -> Self {
        Self {
            backend: None,
            checkpoint: None,
            input_size,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.backend.is_some()
    }

    pub fn backend_name(&self) -> Option<&'static str> {
        self.backend.as_ref().map(|b| b.name())
    }

    pub fn input_size(&self) -> u32 {
        self.input_size
    }

    pub fn model_info(&self) -> ModelInfo {
        ModelInfo {
            available: self.is_loaded(),
            backend: self.backend_name(),
            input_size: self.input_size(),
            checkpoint: self.checkpoint.clone(),
        }
    }

    /// Run one image through the autoencoder
    ///
    /// Blocking; callers on the async runtime should use `spawn_blocking`.
    pub fn reconstruct(&self, image: &DynamicImage) -> Result<Reconstruction> {
        let backend = self
            .backend
            .as_ref()
            .context("The model is not loaded")?;

        let start = Instant::now();
        let input = image_to_tensor(image, backend.input_size());
        let output = backend.run(&input).context("Autoencoder forward pass failed")?;
        let reconstructed = tensor_to_image(&output.reconstruction)?;
        let processing_time_ms = start.elapsed().as_millis() as u64;

        debug!(
            backend = backend.name(),
            latent_shape = ?output.latent.shape(),
            processing_time_ms,
            "Reconstruction complete"
        );

        Ok(Reconstruction {
            latent: output.latent,
            image: reconstructed,
            backend: backend.name(),
            processing_time_ms,
        })
    }
}
