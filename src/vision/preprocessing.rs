// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Conversion between images and NCHW tensors

use image::imageops::FilterType;
use image::{DynamicImage, Rgb, RgbImage};
use ndarray::Array4;

use super::image_utils::ImageError;

/// Convert an image to the `[1, 3, size, size]` model input
///
/// Steps:
/// 1. Convert to RGB (drops alpha, expands grayscale)
/// 2. Resize to exactly `size x size` with a bilinear filter (aspect ratio is not kept)
/// 3. Scale pixels to `[0, 1]` (no mean/std normalisation)
pub fn image_to_tensor(image: &DynamicImage, size: u32) -> Array4<f32> {
    let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
    let resized = if rgb.width() == size && rgb.height() == size {
        rgb
    } else {
        rgb.resize_exact(size, size, FilterType::Triangle)
    };
    let pixels = resized.to_rgb8();

    let side = size as usize;
    let mut tensor = Array4::zeros((1, 3, side, side));
    for (x, y, pixel) in pixels.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = pixel[c] as f32 / 255.0;
        }
    }

    tensor
}

/// Convert the first item of a `[N, 3, H, W]` batch back to an RGB image
///
/// Values are clamped to `[0, 1]`, scaled by 255 and truncated.
pub fn tensor_to_image(tensor: &Array4<f32>) -> Result<RgbImage, ImageError> {
    let (batch, channels, height, width) = tensor.dim();
    if batch == 0 || channels != 3 || height == 0 || width == 0 {
        return Err(ImageError::InvalidTensor(tensor.shape().to_vec()));
    }

    let to_u8 = |v: f32| (v.clamp(0.0, 1.0) * 255.0) as u8;
    let image = RgbImage::from_fn(width as u32, height as u32, |x, y| {
        let (x, y) = (x as usize, y as usize);
        Rgb([
            to_u8(tensor[[0, 0, y, x]]),
            to_u8(tensor[[0, 1, y, x]]),
            to_u8(tensor[[0, 2, y, x]]),
        ])
    });

    Ok(image)
}
