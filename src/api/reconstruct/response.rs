// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Reconstruct response types

use ndarray::Array4;
use serde::{Deserialize, Serialize};

/// Bottleneck tensor as nested lists `[N][C][H][W]`
pub type NestedLatent = Vec<Vec<Vec<Vec<f32>>>>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconstructResponse {
    /// Encoder bottleneck, shape `[1, 1024, S/32, S/32]`
    pub encoder_output: NestedLatent,
    /// Reconstructed image, base64-encoded PNG
    pub reconstructed_image: String,
    pub latent_shape: Vec<usize>,
    /// Backend that ran the forward pass ("native" or "onnx")
    pub backend: String,
    pub processing_time_ms: u64,
}

pub fn latent_to_nested(latent: &Array4<f32>) -> NestedLatent {
    latent
        .outer_iter()
        .map(|item| {
            item.outer_iter()
                .map(|channel| channel.outer_iter().map(|row| row.to_vec()).collect())
                .collect()
        })
        .collect()
}
