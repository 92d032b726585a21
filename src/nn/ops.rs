// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Parameter-free tensor operations

use ndarray::{concatenate, s, Array4, Axis};

use super::NnError;

pub fn relu(x: &Array4<f32>) -> Array4<f32> {
    x.mapv(|v| v.max(0.0))
}

pub fn sigmoid(x: &Array4<f32>) -> Array4<f32> {
    x.mapv(|v| 1.0 / (1.0 + (-v).exp()))
}

/// Max pooling with implicit -inf padding
pub fn max_pool2d(
    x: &Array4<f32>,
    kernel: usize,
    stride: usize,
    padding: usize,
) -> Result<Array4<f32>, NnError> {
    let (batch, channels, height, width) = x.dim();
    if kernel == 0 || stride == 0 {
        return Err(NnError::InvalidConfig(
            "pool kernel and stride must be positive".to_string(),
        ));
    }
    if padding * 2 > kernel {
        return Err(NnError::InvalidConfig(format!(
            "pool padding {} exceeds half of kernel {}",
            padding, kernel
        )));
    }
    if height + 2 * padding < kernel || width + 2 * padding < kernel {
        return Err(NnError::InputTooSmall {
            height,
            width,
            kernel,
            padding,
        });
    }

    let out_h = (height + 2 * padding - kernel) / stride + 1;
    let out_w = (width + 2 * padding - kernel) / stride + 1;
    let mut out = Array4::<f32>::from_elem((batch, channels, out_h, out_w), f32::NEG_INFINITY);

    for b in 0..batch {
        for c in 0..channels {
            let plane = x.slice(s![b, c, .., ..]);
            for oy in 0..out_h {
                let y0 = (oy * stride) as isize - padding as isize;
                for ox in 0..out_w {
                    let x0 = (ox * stride) as isize - padding as isize;
                    let mut best = f32::NEG_INFINITY;
                    for ky in 0..kernel as isize {
                        let iy = y0 + ky;
                        if iy < 0 || iy >= height as isize {
                            continue;
                        }
                        for kx in 0..kernel as isize {
                            let ix = x0 + kx;
                            if ix < 0 || ix >= width as isize {
                                continue;
                            }
                            best = best.max(plane[[iy as usize, ix as usize]]);
                        }
                    }
                    out[[b, c, oy, ox]] = best;
                }
            }
        }
    }

    Ok(out)
}

/// Source sample positions for align-corners linear interpolation
fn align_corners_taps(in_len: usize, out_len: usize) -> Vec<(usize, usize, f32)> {
    (0..out_len)
        .map(|i| {
            if in_len <= 1 || out_len <= 1 {
                return (0, 0, 0.0);
            }
            let pos = i as f32 * (in_len - 1) as f32 / (out_len - 1) as f32;
            let lo = (pos.floor() as usize).min(in_len - 1);
            let hi = (lo + 1).min(in_len - 1);
            (lo, hi, pos - lo as f32)
        })
        .collect()
}

/// Bilinear upsampling by 2 with `align_corners = true`
pub fn upsample_bilinear2x(x: &Array4<f32>) -> Array4<f32> {
    let (batch, channels, height, width) = x.dim();
    let (out_h, out_w) = (height * 2, width * 2);
    let rows = align_corners_taps(height, out_h);
    let cols = align_corners_taps(width, out_w);

    let mut out = Array4::<f32>::zeros((batch, channels, out_h, out_w));
    for b in 0..batch {
        for c in 0..channels {
            let plane = x.slice(s![b, c, .., ..]);
            for (oy, &(y0, y1, fy)) in rows.iter().enumerate() {
                for (ox, &(x0, x1, fx)) in cols.iter().enumerate() {
                    let top = plane[[y0, x0]] * (1.0 - fx) + plane[[y0, x1]] * fx;
                    let bottom = plane[[y1, x0]] * (1.0 - fx) + plane[[y1, x1]] * fx;
                    out[[b, c, oy, ox]] = top * (1.0 - fy) + bottom * fy;
                }
            }
        }
    }
    out
}

/// ShuffleNet channel shuffle: `[N, g, C/g, H, W]` -> swap -> `[N, C, H, W]`
pub fn channel_shuffle(x: &Array4<f32>, groups: usize) -> Result<Array4<f32>, NnError> {
    let (batch, channels, height, width) = x.dim();
    if groups == 0 || channels % groups != 0 {
        return Err(NnError::InvalidConfig(format!(
            "{} channels cannot be shuffled in {} groups",
            channels, groups
        )));
    }

    let grouped = x
        .as_standard_layout()
        .into_shape_with_order((batch, groups, channels / groups, height, width))?;
    let shuffled = grouped
        .permuted_axes([0, 2, 1, 3, 4])
        .as_standard_layout()
        .into_owned();
    Ok(shuffled.into_shape_with_order((batch, channels, height, width))?)
}

pub fn concat_channels(a: &Array4<f32>, b: &Array4<f32>) -> Result<Array4<f32>, NnError> {
    let (an, _, ah, aw) = a.dim();
    let (bn, _, bh, bw) = b.dim();
    if (an, ah, aw) != (bn, bh, bw) {
        return Err(NnError::InvalidInput(format!(
            "cannot concatenate {:?} with {:?} along channels",
            a.shape(),
            b.shape()
        )));
    }
    Ok(concatenate(Axis(1), &[a.view(), b.view()])?)
}

/// Split into equal channel halves
pub fn split_channels(x: &Array4<f32>) -> Result<(Array4<f32>, Array4<f32>), NnError> {
    let channels = x.dim().1;
    if channels % 2 != 0 {
        return Err(NnError::InvalidInput(format!(
            "cannot split {} channels into halves",
            channels
        )));
    }
    let half = channels / 2;
    Ok((
        x.slice(s![.., ..half, .., ..]).to_owned(),
        x.slice(s![.., half.., .., ..]).to_owned(),
    ))
}
