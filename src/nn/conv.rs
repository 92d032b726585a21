// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! 2D convolution, eval-mode batch norm and the fused conv+bn unit

use ndarray::{s, Array1, Array2, Array4, ArrayView3, Axis};

use super::weights::{WeightError, Weights};
use super::NnError;

/// Epsilon used by BatchNorm2d layers in the checkpoint
pub const BN_EPSILON: f32 = 1e-5;

/// Stride, padding and grouping of a convolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Conv2dConfig {
    pub stride: usize,
    pub padding: usize,
    pub groups: usize,
}

impl Default for Conv2dConfig {
    fn default() -> Self {
        Self {
            stride: 1,
            padding: 0,
            groups: 1,
        }
    }
}

impl Conv2dConfig {
    pub fn with_stride(mut self, stride: usize) -> Self {
        self.stride = stride;
        self
    }

    pub fn with_padding(mut self, padding: usize) -> Self {
        self.padding = padding;
        self
    }

    pub fn with_groups(mut self, groups: usize) -> Self {
        self.groups = groups;
        self
    }

    /// Depthwise 3x3 convolution used throughout ShuffleNetV2
    pub fn depthwise(channels: usize, stride: usize) -> Self {
        Self {
            stride,
            padding: 1,
            groups: channels,
        }
    }
}

/// Square-kernel 2D cross-correlation, weights laid out `[out, in / groups, k, k]`
///
/// The kernel is stored flattened as `[out, in/groups * k * k]` so each group
/// reduces to a single matrix product against an im2col buffer.
#[derive(Debug, Clone)]
pub struct Conv2d {
    weight: Array2<f32>,
    bias: Option<Array1<f32>>,
    kernel: usize,
    in_per_group: usize,
    config: Conv2dConfig,
}

impl Conv2d {
    /// Build a convolution from a `[out, in/groups, k, k]` kernel
    pub fn new(
        weight: Array4<f32>,
        bias: Option<Array1<f32>>,
        config: Conv2dConfig,
    ) -> Result<Self, NnError> {
        let (out_channels, in_per_group, kh, kw) = weight.dim();
        if kh != kw {
            return Err(NnError::InvalidConfig(format!(
                "only square kernels are supported, got {}x{}",
                kh, kw
            )));
        }
        if config.stride == 0 || config.groups == 0 {
            return Err(NnError::InvalidConfig(
                "stride and groups must be positive".to_string(),
            ));
        }
        if out_channels % config.groups != 0 {
            return Err(NnError::InvalidConfig(format!(
                "{} output channels not divisible by {} groups",
                out_channels, config.groups
            )));
        }
        if let Some(ref b) = bias {
            if b.len() != out_channels {
                return Err(NnError::InvalidConfig(format!(
                    "bias has {} entries for {} output channels",
                    b.len(),
                    out_channels
                )));
            }
        }

        let weight = weight
            .as_standard_layout()
            .into_owned()
            .into_shape_with_order((out_channels, in_per_group * kh * kw))?;

        Ok(Self {
            weight,
            bias,
            kernel: kh,
            in_per_group,
            config,
        })
    }

    /// Load `weight` (and optionally `bias`) from a weight scope
    pub fn load(
        w: &Weights<'_>,
        in_channels: usize,
        out_channels: usize,
        kernel: usize,
        config: Conv2dConfig,
        bias: bool,
    ) -> Result<Self, WeightError> {
        if config.groups == 0 || in_channels % config.groups != 0 {
            return Err(WeightError::Layer(NnError::InvalidConfig(format!(
                "{} input channels not divisible by {} groups",
                in_channels, config.groups
            ))));
        }
        let weight = w.get4(
            "weight",
            [out_channels, in_channels / config.groups, kernel, kernel],
        )?;
        let bias = if bias {
            Some(w.get1("bias", out_channels)?)
        } else {
            None
        };
        Ok(Self::new(weight, bias, config)?)
    }

    pub fn in_channels(&self) -> usize {
        self.in_per_group * self.config.groups
    }

    pub fn out_channels(&self) -> usize {
        self.weight.nrows()
    }

    /// Spatial output size for an `height x width` input
    pub fn output_size(&self, height: usize, width: usize) -> (usize, usize) {
        let Conv2dConfig {
            stride, padding, ..
        } = self.config;
        (
            (height + 2 * padding - self.kernel) / stride + 1,
            (width + 2 * padding - self.kernel) / stride + 1,
        )
    }

    pub fn forward(&self, x: &Array4<f32>) -> Result<Array4<f32>, NnError> {
        let (batch, channels, height, width) = x.dim();
        if channels != self.in_channels() {
            return Err(NnError::ChannelMismatch {
                expected: self.in_channels(),
                actual: channels,
            });
        }
        let padding = self.config.padding;
        if height + 2 * padding < self.kernel || width + 2 * padding < self.kernel {
            return Err(NnError::InputTooSmall {
                height,
                width,
                kernel: self.kernel,
                padding,
            });
        }

        let (out_h, out_w) = self.output_size(height, width);
        let groups = self.config.groups;
        let out_per_group = self.out_channels() / groups;
        let pointwise = self.kernel == 1 && self.config.stride == 1 && padding == 0;

        let mut out = Array4::<f32>::zeros((batch, self.out_channels(), out_h, out_w));

        for b in 0..batch {
            let image = x.index_axis(Axis(0), b);
            for g in 0..groups {
                let in_range = g * self.in_per_group..(g + 1) * self.in_per_group;
                let out_range = g * out_per_group..(g + 1) * out_per_group;
                let group_input = image.slice(s![in_range, .., ..]);

                let columns = if pointwise {
                    group_input
                        .to_owned()
                        .into_shape_with_order((self.in_per_group, height * width))?
                } else {
                    im2col(
                        group_input,
                        self.kernel,
                        self.config.stride,
                        padding,
                        out_h,
                        out_w,
                    )
                };

                let product = self
                    .weight
                    .slice(s![out_range.clone(), ..])
                    .dot(&columns)
                    .into_shape_with_order((out_per_group, out_h, out_w))?;
                out.slice_mut(s![b, out_range, .., ..]).assign(&product);
            }

            if let Some(ref bias) = self.bias {
                for (o, &bv) in bias.iter().enumerate() {
                    out.slice_mut(s![b, o, .., ..]).mapv_inplace(|v| v + bv);
                }
            }
        }

        Ok(out)
    }

    /// Fold an eval-mode batch norm that follows this convolution
    pub fn fold_batch_norm(mut self, bn: &BatchNorm2d) -> Result<Self, NnError> {
        if bn.channels() != self.out_channels() {
            return Err(NnError::ChannelMismatch {
                expected: self.out_channels(),
                actual: bn.channels(),
            });
        }

        let scale = bn.scale();
        let mut bias = self
            .bias
            .take()
            .unwrap_or_else(|| Array1::zeros(self.out_channels()));

        for (o, mut row) in self.weight.outer_iter_mut().enumerate() {
            row.mapv_inplace(|v| v * scale[o]);
            bias[o] = (bias[o] - bn.running_mean[o]) * scale[o] + bn.beta[o];
        }
        self.bias = Some(bias);
        Ok(self)
    }
}

/// Unfold an image into `[c * k * k, out_h * out_w]` patch columns
fn im2col(
    image: ArrayView3<'_, f32>,
    kernel: usize,
    stride: usize,
    padding: usize,
    out_h: usize,
    out_w: usize,
) -> Array2<f32> {
    let (channels, height, width) = image.dim();
    let mut columns = Array2::<f32>::zeros((channels * kernel * kernel, out_h * out_w));

    for c in 0..channels {
        for ky in 0..kernel {
            for kx in 0..kernel {
                let row = (c * kernel + ky) * kernel + kx;
                for oy in 0..out_h {
                    let iy = (oy * stride + ky) as isize - padding as isize;
                    if iy < 0 || iy >= height as isize {
                        continue;
                    }
                    for ox in 0..out_w {
                        let ix = (ox * stride + kx) as isize - padding as isize;
                        if ix < 0 || ix >= width as isize {
                            continue;
                        }
                        columns[[row, oy * out_w + ox]] = image[[c, iy as usize, ix as usize]];
                    }
                }
            }
        }
    }

    columns
}

/// BatchNorm2d in eval mode (running statistics only)
#[derive(Debug, Clone)]
pub struct BatchNorm2d {
    pub gamma: Array1<f32>,
    pub beta: Array1<f32>,
    pub running_mean: Array1<f32>,
    pub running_var: Array1<f32>,
    pub eps: f32,
}

impl BatchNorm2d {
    pub fn load(w: &Weights<'_>, channels: usize) -> Result<Self, WeightError> {
        Ok(Self {
            gamma: w.get1("weight", channels)?,
            beta: w.get1("bias", channels)?,
            running_mean: w.get1("running_mean", channels)?,
            running_var: w.get1("running_var", channels)?,
            eps: BN_EPSILON,
        })
    }

    pub fn channels(&self) -> usize {
        self.gamma.len()
    }

    /// Per-channel multiplier `gamma / sqrt(var + eps)`
    fn scale(&self) -> Array1<f32> {
        let mut scale = self.gamma.clone();
        for (s, &var) in scale.iter_mut().zip(self.running_var.iter()) {
            *s /= (var + self.eps).sqrt();
        }
        scale
    }

    pub fn forward(&self, x: &Array4<f32>) -> Result<Array4<f32>, NnError> {
        let channels = x.dim().1;
        if channels != self.channels() {
            return Err(NnError::ChannelMismatch {
                expected: self.channels(),
                actual: channels,
            });
        }
        let scale = self.scale();
        let mut out = x.clone();
        for mut image in out.outer_iter_mut() {
            for (c, mut plane) in image.outer_iter_mut().enumerate() {
                let (m, s, b) = (self.running_mean[c], scale[c], self.beta[c]);
                plane.mapv_inplace(|v| (v - m) * s + b);
            }
        }
        Ok(out)
    }
}

/// Activation applied after a fused conv+bn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    None,
    Relu,
}

/// Convolution with its batch norm folded in, optionally followed by ReLU
#[derive(Debug, Clone)]
pub struct ConvBn {
    conv: Conv2d,
    activation: Activation,
}

impl ConvBn {
    /// Load a conv (no bias) from `conv_w` and the batch norm from `bn_w`
    pub fn load(
        conv_w: &Weights<'_>,
        bn_w: &Weights<'_>,
        in_channels: usize,
        out_channels: usize,
        kernel: usize,
        config: Conv2dConfig,
        activation: Activation,
    ) -> Result<Self, WeightError> {
        let conv = Conv2d::load(conv_w, in_channels, out_channels, kernel, config, false)?;
        let bn = BatchNorm2d::load(bn_w, out_channels)?;
        Ok(Self {
            conv: conv.fold_batch_norm(&bn)?,
            activation,
        })
    }

    pub fn forward(&self, x: &Array4<f32>) -> Result<Array4<f32>, NnError> {
        let mut out = self.conv.forward(x)?;
        if self.activation == Activation::Relu {
            out.mapv_inplace(|v| v.max(0.0));
        }
        Ok(out)
    }
}
