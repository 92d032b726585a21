// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::{Context, Result};
use clap::Args;
use image::ImageFormat;
use serde::Serialize;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::api::reconstruct::{latent_to_nested, NestedLatent};
use crate::config::NodeConfig;
use crate::vision::{decode_image_bytes, Reconstruction, ReconstructionModelManager};

/// Arguments for the reconstruct command
#[derive(Args, Debug)]
pub struct ReconstructArgs {
    /// Image to reconstruct
    #[arg(long)]
    pub input: PathBuf,

    /// Where to write the reconstructed PNG
    #[arg(long)]
    pub output: PathBuf,

    /// Optional JSON file for the bottleneck tensor
    #[arg(long)]
    pub latent: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct LatentFile {
    shape: Vec<usize>,
    backend: String,
    data: NestedLatent,
}

fn write_latent(path: &Path, reconstruction: &Reconstruction) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    let latent = LatentFile {
        shape: reconstruction.latent.shape().to_vec(),
        backend: reconstruction.backend.to_string(),
        data: latent_to_nested(&reconstruction.latent),
    };
    serde_json::to_writer(BufWriter::new(file), &latent)?;
    Ok(())
}

pub async fn run(config: NodeConfig, args: ReconstructArgs) -> Result<()> {
    let bytes = std::fs::read(&args.input)
        .with_context(|| format!("Failed to read {}", args.input.display()))?;
    let (image, info) = decode_image_bytes(&bytes, config.server.max_upload_bytes)
        .with_context(|| format!("Could not process the image file {}", args.input.display()))?;
    info!(
        "Loaded {} ({}x{} {:?})",
        args.input.display(),
        info.width,
        info.height,
        info.format
    );

    let manager = ReconstructionModelManager::new(config.model).await?;
    if !manager.is_loaded() {
        anyhow::bail!("The model is not loaded. Check the logs above.");
    }

    let reconstruction = tokio::task::spawn_blocking(move || manager.reconstruct(&image)).await??;

    reconstruction
        .image
        .save_with_format(&args.output, ImageFormat::Png)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;
    info!(
        "Wrote {} ({}ms, {} backend)",
        args.output.display(),
        reconstruction.processing_time_ms,
        reconstruction.backend
    );

    if let Some(path) = &args.latent {
        write_latent(path, &reconstruction)?;
        info!(
            "Wrote latent {:?} to {}",
            reconstruction.latent.shape(),
            path.display()
        );
    }

    Ok(())
}
