// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Inference backend abstraction

use std::fmt;
use std::str::FromStr;

use anyhow::Result;
use ndarray::Array4;
use serde::{Deserialize, Serialize};

/// Latent code and decoded image for one batch
#[derive(Debug, Clone)]
pub struct AutoencoderOutput {
    /// Bottleneck tensor `[N, 1024, S/32, S/32]`
    pub latent: Array4<f32>,
    /// Reconstruction `[N, 3, S, S]`, values in `[0, 1]`
    pub reconstruction: Array4<f32>,
}

/// Something that can run the full encoder/decoder graph
pub trait ReconstructionBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Square input resolution the backend was loaded for
    fn input_size(&self) -> u32;

    /// Run one forward pass on a preprocessed `[N, 3, S, S]` tensor
    fn run(&self, input: &Array4<f32>) -> Result<AutoencoderOutput>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Built-in ndarray implementation fed from a safetensors checkpoint
    #[default]
    Native,
    /// ONNX Runtime session over an exported autoencoder graph
    Onnx,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Native => "native",
            BackendKind::Onnx => "onnx",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "native" => Ok(BackendKind::Native),
            "onnx" => Ok(BackendKind::Onnx),
            other => Err(format!(
                "unknown backend '{}', expected 'native' or 'onnx'",
                other
            )),
        }
    }
}
