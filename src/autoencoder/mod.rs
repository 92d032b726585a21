// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! ShuffleNetV2 / U-Net autoencoder
//!
//! The encoder is the ShuffleNetV2 x1.0 trunk with four skip taps; the
//! decoder upsamples five times back to the input size. Two backends run it:
//! - [`NativeBackend`] - ndarray implementation loaded from safetensors
//! - [`OnnxBackend`] - ONNX Runtime session over an exported graph

pub mod backend;
pub mod checkpoint;
pub mod decoder;
pub mod encoder;
pub mod native;
pub mod onnx;

pub use backend::{AutoencoderOutput, BackendKind, ReconstructionBackend};
pub use checkpoint::{
    inspect_checkpoint, inspect_source, resolve_checkpoint, CheckpointReport, ShapeMismatch,
};
pub use decoder::{DecoderBlock, UNetDecoder};
pub use encoder::{EncoderOutput, ShuffleNetEncoder, LATENT_CHANNELS};
pub use native::{
    parameter_specs, validate_input_size, NativeBackend, UNetAutoencoder, DEFAULT_INPUT_SIZE,
    REDUCTION,
};
pub use onnx::OnnxBackend;
