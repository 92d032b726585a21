// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Native (ndarray) encoder/decoder

use std::path::Path;

use anyhow::{Context, Result};
use ndarray::Array4;
use tracing::info;

use super::backend::{AutoencoderOutput, ReconstructionBackend};
use super::decoder::UNetDecoder;
use super::encoder::ShuffleNetEncoder;
use crate::nn::{
    NnError, ParamSpec, SafetensorsSource, ShapeRecorder, TensorSource, WeightError, Weights,
};

/// Total downsampling factor between input and bottleneck
pub const REDUCTION: u32 = 32;

/// Default square input resolution
pub const DEFAULT_INPUT_SIZE: u32 = 64;

/// Checkpoint prefix of the encoder tensors
pub const ENCODER_PREFIX: &str = "encoder";

/// Checkpoint prefix of the decoder tensors
pub const DECODER_PREFIX: &str = "decoder";

/// Check that `size` is usable as the square model input
pub fn validate_input_size(size: u32) -> Result<(), NnError> {
    if size == 0 || size % REDUCTION != 0 {
        return Err(NnError::InvalidInput(format!(
            "input size {} must be a positive multiple of {}",
            size, REDUCTION
        )));
    }
    Ok(())
}

/// ShuffleNetV2 encoder + U-Net decoder
#[derive(Debug, Clone)]
pub struct UNetAutoencoder {
    encoder: ShuffleNetEncoder,
    decoder: UNetDecoder,
}

impl UNetAutoencoder {
    /// Build both halves from `encoder.*` and `decoder.*` tensors
    pub fn load(w: &Weights<'_>) -> Result<Self, WeightError> {
        Ok(Self {
            encoder: ShuffleNetEncoder::load(&w.pp(ENCODER_PREFIX))?,
            decoder: UNetDecoder::load(&w.pp(DECODER_PREFIX))?,
        })
    }

    pub fn forward(&self, x: &Array4<f32>) -> Result<AutoencoderOutput, NnError> {
        let (_, channels, height, width) = x.dim();
        if channels != 3 {
            return Err(NnError::ChannelMismatch {
                expected: 3,
                actual: channels,
            });
        }
        let reduction = REDUCTION as usize;
        if height == 0 || width == 0 || height % reduction != 0 || width % reduction != 0 {
            return Err(NnError::InvalidInput(format!(
                "spatial size {}x{} must be a positive multiple of {}",
                height, width, REDUCTION
            )));
        }

        let encoded = self.encoder.forward(x)?;
        let reconstruction = self.decoder.forward(&encoded)?;
        Ok(AutoencoderOutput {
            latent: encoded.bottleneck,
            reconstruction,
        })
    }
}

/// Every parameter the network reads, in load order
pub fn parameter_specs() -> Result<Vec<ParamSpec>, WeightError> {
    let recorder = ShapeRecorder::new();
    UNetAutoencoder::load(&Weights::new(&recorder))?;
    Ok(recorder.into_specs())
}

/// [`ReconstructionBackend`] over [`UNetAutoencoder`]
#[derive(Debug, Clone)]
pub struct NativeBackend {
    model: UNetAutoencoder,
    input_size: u32,
}

impl NativeBackend {
    pub fn from_source(source: &dyn TensorSource, input_size: u32) -> Result<Self> {
        validate_input_size(input_size)?;
        let model = UNetAutoencoder::load(&Weights::new(source))
            .context("Failed to build autoencoder from weights")?;
        Ok(Self { model, input_size })
    }

    pub fn from_checkpoint<P: AsRef<Path>>(path: P, input_size: u32) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            anyhow::bail!("Checkpoint not found: {}", path.display());
        }

        let source = SafetensorsSource::open(path)?;
        info!(
            tensors = source.len(),
            "Loaded checkpoint {}",
            path.display()
        );
        Self::from_source(&source, input_size)
            .with_context(|| format!("Checkpoint {} is incompatible", path.display()))
    }
}

impl ReconstructionBackend for NativeBackend {
    fn name(&self) -> &'static str {
        "native"
    }

    fn input_size(&self) -> u32 {
        self.input_size
    }

    fn run(&self, input: &Array4<f32>) -> Result<AutoencoderOutput> {
        Ok(self.model.forward(input)?)
    }
}
