// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! CPU tensor layers for the reconstruction network
//!
//! Everything operates on `ndarray::Array4<f32>` in NCHW layout. Batch norm
//! is only used in eval mode, so it is folded into the preceding convolution
//! at load time.

pub mod conv;
pub mod ops;
pub mod weights;

use ndarray::ShapeError;
use thiserror::Error;

pub use conv::{Activation, BatchNorm2d, Conv2d, Conv2dConfig, ConvBn, BN_EPSILON};
pub use ops::{
    channel_shuffle, concat_channels, max_pool2d, relu, sigmoid, split_channels,
    upsample_bilinear2x,
};
pub use weights::{
    ParamSpec, SafetensorsSource, SeededSource, ShapeRecorder, TensorSource, WeightError, Weights,
};

/// Errors raised while running a layer
#[derive(Debug, Error)]
pub enum NnError {
    #[error("Expected {expected} input channels, got {actual}")]
    ChannelMismatch { expected: usize, actual: usize },

    #[error("Input {height}x{width} is smaller than kernel {kernel} with padding {padding}")]
    InputTooSmall {
        height: usize,
        width: usize,
        kernel: usize,
        padding: usize,
    },

    #[error("Invalid layer configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Tensor shape error: {0}")]
    Shape(#[from] ShapeError),
}
