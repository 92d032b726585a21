// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// tests/common/mod.rs - Shared fixtures: random checkpoints, images, multipart bodies
#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Cursor;
use std::path::Path;

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use image_shifter_node::autoencoder::parameter_specs;
use image_shifter_node::nn::{SeededSource, TensorSource};
use safetensors::tensor::TensorView;
use safetensors::Dtype;

pub const BOUNDARY: &str = "----image-shifter-test-boundary";

/// Named raw tensor: (dtype, shape, little-endian bytes)
pub type RawTensor = (Dtype, Vec<usize>, Vec<u8>);

/// Every network parameter drawn from `SeededSource::new(seed)` in load order,
/// plus a `num_batches_tracked` counter per batch norm
pub fn random_checkpoint_tensors(seed: u64) -> HashMap<String, RawTensor> {
    let source = SeededSource::new(seed);
    let mut tensors = HashMap::new();
    for spec in parameter_specs().unwrap() {
        let values = source.fetch(&spec.name, &spec.shape).unwrap();
        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        if let Some(prefix) = spec.name.strip_suffix("running_var") {
            tensors.insert(
                format!("{}num_batches_tracked", prefix),
                (Dtype::I64, vec![], 100i64.to_le_bytes().to_vec()),
            );
        }
        tensors.insert(spec.name, (Dtype::F32, spec.shape, bytes));
    }
    tensors
}

pub fn serialize_tensors(tensors: &HashMap<String, RawTensor>) -> Vec<u8> {
    let views: HashMap<String, TensorView<'_>> = tensors
        .iter()
        .map(|(name, (dtype, shape, data))| {
            (
                name.clone(),
                TensorView::new(*dtype, shape.clone(), data).unwrap(),
            )
        })
        .collect();
    safetensors::serialize(&views, &None).unwrap()
}

pub fn write_checkpoint(path: &Path, tensors: &HashMap<String, RawTensor>) {
    std::fs::write(path, serialize_tensors(tensors)).unwrap();
}

/// Complete checkpoint whose weights match `SeededSource::new(seed)`
pub fn write_random_checkpoint(path: &Path, seed: u64) {
    write_checkpoint(path, &random_checkpoint_tensors(seed));
}

/// Deterministic gradient test image
pub fn gradient_image(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        Rgb([
            (x * 255 / width.max(1)) as u8,
            (y * 255 / height.max(1)) as u8,
            ((x + y) % 256) as u8,
        ])
    }))
}

/// Pseudo-random pixels; compresses poorly so the PNG stays large
pub fn noise_image(width: u32, height: u32) -> DynamicImage {
    let mut state: u32 = 0x1234_5678;
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |_, _| {
        let mut next = || {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state & 0xFF) as u8
        };
        Rgb([next(), next(), next()])
    }))
}

pub fn encode(img: &DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), format).unwrap();
    buf
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    encode(&gradient_image(width, height), ImageFormat::Png)
}

/// Single-part `multipart/form-data` body
pub fn multipart_body(field: &str, filename: &str, content_type: &str, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
            field, filename
        )
        .as_bytes(),
    );
    body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", content_type).as_bytes());
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

/// Single-part body with a plain form field (no filename)
pub fn multipart_text_field(field: &str, value: &str) -> Vec<u8> {
    format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"{f}\"\r\n\r\n{v}\r\n--{b}--\r\n",
        b = BOUNDARY,
        f = field,
        v = value
    )
    .into_bytes()
}

pub fn multipart_content_type() -> String {
    format!("multipart/form-data; boundary={}", BOUNDARY)
}
