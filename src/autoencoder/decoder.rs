// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! U-Net decoder head
//!
//! Upsamples the bottleneck back to input resolution, merging one encoder
//! skip tensor per scale.

use ndarray::Array4;

use super::encoder::{EncoderOutput, LATENT_CHANNELS, SKIP_CHANNELS};
use crate::nn::{
    concat_channels, sigmoid, upsample_bilinear2x, Activation, Conv2d, Conv2dConfig, ConvBn,
    NnError, WeightError, Weights,
};

/// Channels after the 1x1 center convolution
pub const CENTER_CHANNELS: usize = 512;

/// Output channels of dec_block1..dec_block4
pub const BLOCK_OUT_CHANNELS: [usize; 4] = [256, 128, 64, 32];

/// RGB output
pub const OUTPUT_CHANNELS: usize = 3;

/// Concatenate with a skip tensor, then two 3x3 conv+bn+relu layers
#[derive(Debug, Clone)]
pub struct DecoderBlock {
    conv1: ConvBn,
    conv2: ConvBn,
}

impl DecoderBlock {
    pub fn load(
        w: &Weights<'_>,
        in_channels: usize,
        skip_channels: usize,
        out_channels: usize,
    ) -> Result<Self, WeightError> {
        let same = Conv2dConfig::default().with_padding(1);
        Ok(Self {
            conv1: ConvBn::load(
                &w.pp("conv1"),
                &w.pp("bn1"),
                in_channels + skip_channels,
                out_channels,
                3,
                same,
                Activation::Relu,
            )?,
            conv2: ConvBn::load(
                &w.pp("conv2"),
                &w.pp("bn2"),
                out_channels,
                out_channels,
                3,
                same,
                Activation::Relu,
            )?,
        })
    }

    pub fn forward(&self, x: &Array4<f32>, skip: &Array4<f32>) -> Result<Array4<f32>, NnError> {
        let merged = concat_channels(x, skip)?;
        self.conv2.forward(&self.conv1.forward(&merged)?)
    }
}

#[derive(Debug, Clone)]
pub struct UNetDecoder {
    center_conv: Conv2d,
    blocks: Vec<DecoderBlock>,
    final_conv: Conv2d,
}

impl UNetDecoder {
    pub fn load(w: &Weights<'_>) -> Result<Self, WeightError> {
        let center_conv = Conv2d::load(
            &w.pp("center_conv"),
            LATENT_CHANNELS,
            CENTER_CHANNELS,
            1,
            Conv2dConfig::default(),
            true,
        )?;

        let mut blocks = Vec::with_capacity(BLOCK_OUT_CHANNELS.len());
        let mut in_channels = CENTER_CHANNELS;
        for (i, (&skip, &out)) in SKIP_CHANNELS
            .iter()
            .zip(BLOCK_OUT_CHANNELS.iter())
            .enumerate()
        {
            blocks.push(DecoderBlock::load(
                &w.pp(format!("dec_block{}", i + 1)),
                in_channels,
                skip,
                out,
            )?);
            in_channels = out;
        }

        let final_conv = Conv2d::load(
            &w.pp("final_conv"),
            in_channels,
            OUTPUT_CHANNELS,
            1,
            Conv2dConfig::default(),
            true,
        )?;

        Ok(Self {
            center_conv,
            blocks,
            final_conv,
        })
    }

    /// Reconstruct an image in `[0, 1]` from the encoder output
    pub fn forward(&self, encoded: &EncoderOutput) -> Result<Array4<f32>, NnError> {
        let mut d = self.center_conv.forward(&encoded.bottleneck)?;
        for (block, skip) in self.blocks.iter().zip(encoded.skips.iter()) {
            d = upsample_bilinear2x(&d);
            d = block.forward(&d, skip)?;
        }
        d = upsample_bilinear2x(&d);
        Ok(sigmoid(&self.final_conv.forward(&d)?))
    }
}
