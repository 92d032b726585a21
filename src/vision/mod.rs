// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Image handling around the autoencoder
//!
//! - `image_utils` - upload decoding, PNG/base64 encoding
//! - `preprocessing` - image <-> tensor conversion
//! - `model_manager` - loads and runs the configured backend

pub mod image_utils;
pub mod model_manager;
pub mod preprocessing;

pub use image_utils::{
    decode_image_bytes, detect_format, encode_png, encode_png_base64, ImageError, ImageInfo,
    DEFAULT_MAX_IMAGE_BYTES,
};
pub use model_manager::{ModelInfo, Reconstruction, ReconstructionModelManager};
pub use preprocessing::{image_to_tensor, tensor_to_image};
