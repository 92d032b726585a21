// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! ShuffleNetV2 x1.0 feature extractor with skip taps
//!
//! Parameter names follow the torchvision module tree so a converted
//! `state_dict` loads as-is (`conv1.0.weight`, `stage2.0.branch1.0.weight`, ...).

use ndarray::Array4;

use crate::nn::{
    channel_shuffle, concat_channels, max_pool2d, split_channels, Activation, Conv2dConfig,
    ConvBn, NnError, WeightError, Weights,
};

/// Blocks per stage (stage2, stage3, stage4)
pub const STAGE_REPEATS: [usize; 3] = [4, 8, 4];

/// Output channels of conv1, stage2, stage3, stage4, conv5
pub const STAGE_OUT_CHANNELS: [usize; 5] = [24, 116, 232, 464, 1024];

/// Channels of the skip tensors, deep to shallow
pub const SKIP_CHANNELS: [usize; 4] = [
    STAGE_OUT_CHANNELS[2],
    STAGE_OUT_CHANNELS[1],
    STAGE_OUT_CHANNELS[0],
    STAGE_OUT_CHANNELS[0],
];

/// Bottleneck channels
pub const LATENT_CHANNELS: usize = STAGE_OUT_CHANNELS[4];

/// Bottleneck plus skip connections ordered deep to shallow
#[derive(Debug, Clone)]
pub struct EncoderOutput {
    pub bottleneck: Array4<f32>,
    pub skips: [Array4<f32>; 4],
}

/// ShuffleNetV2 unit: split/transform/concat followed by a channel shuffle
#[derive(Debug, Clone)]
struct InvertedResidual {
    branch1: Vec<ConvBn>,
    branch2: Vec<ConvBn>,
    stride: usize,
}

impl InvertedResidual {
    fn load(
        w: &Weights<'_>,
        in_channels: usize,
        out_channels: usize,
        stride: usize,
    ) -> Result<Self, WeightError> {
        if stride == 1 && in_channels != out_channels {
            return Err(WeightError::Layer(NnError::InvalidConfig(format!(
                "stride-1 unit needs equal channels, got {} -> {}",
                in_channels, out_channels
            ))));
        }
        let branch_features = out_channels / 2;

        let branch1 = if stride > 1 {
            let b1 = w.pp("branch1");
            vec![
                ConvBn::load(
                    &b1.pp(0),
                    &b1.pp(1),
                    in_channels,
                    in_channels,
                    3,
                    Conv2dConfig::depthwise(in_channels, stride),
                    Activation::None,
                )?,
                ConvBn::load(
                    &b1.pp(2),
                    &b1.pp(3),
                    in_channels,
                    branch_features,
                    1,
                    Conv2dConfig::default(),
                    Activation::Relu,
                )?,
            ]
        } else {
            Vec::new()
        };

        let b2 = w.pp("branch2");
        let branch2_in = if stride > 1 {
            in_channels
        } else {
            branch_features
        };
        let branch2 = vec![
            ConvBn::load(
                &b2.pp(0),
                &b2.pp(1),
                branch2_in,
                branch_features,
                1,
                Conv2dConfig::default(),
                Activation::Relu,
            )?,
            ConvBn::load(
                &b2.pp(3),
                &b2.pp(4),
                branch_features,
                branch_features,
                3,
                Conv2dConfig::depthwise(branch_features, stride),
                Activation::None,
            )?,
            ConvBn::load(
                &b2.pp(5),
                &b2.pp(6),
                branch_features,
                branch_features,
                1,
                Conv2dConfig::default(),
                Activation::Relu,
            )?,
        ];

        Ok(Self {
            branch1,
            branch2,
            stride,
        })
    }

    fn forward(&self, x: &Array4<f32>) -> Result<Array4<f32>, NnError> {
        let out = if self.stride == 1 {
            let (keep, transform) = split_channels(x)?;
            concat_channels(&keep, &run_sequence(&self.branch2, transform)?)?
        } else {
            concat_channels(
                &run_sequence(&self.branch1, x.clone())?,
                &run_sequence(&self.branch2, x.clone())?,
            )?
        };
        channel_shuffle(&out, 2)
    }
}

fn run_sequence(layers: &[ConvBn], x: Array4<f32>) -> Result<Array4<f32>, NnError> {
    layers.iter().try_fold(x, |acc, layer| layer.forward(&acc))
}

/// The convolutional trunk of ShuffleNetV2 (no classifier head)
#[derive(Debug, Clone)]
pub struct ShuffleNetEncoder {
    conv1: ConvBn,
    stages: Vec<Vec<InvertedResidual>>,
    conv5: ConvBn,
}

impl ShuffleNetEncoder {
    pub fn load(w: &Weights<'_>) -> Result<Self, WeightError> {
        let conv1 = w.pp("conv1");
        let conv1 = ConvBn::load(
            &conv1.pp(0),
            &conv1.pp(1),
            3,
            STAGE_OUT_CHANNELS[0],
            3,
            Conv2dConfig::default().with_stride(2).with_padding(1),
            Activation::Relu,
        )?;

        let mut stages = Vec::with_capacity(STAGE_REPEATS.len());
        let mut in_channels = STAGE_OUT_CHANNELS[0];
        for (i, &repeats) in STAGE_REPEATS.iter().enumerate() {
            let out_channels = STAGE_OUT_CHANNELS[i + 1];
            let stage = w.pp(format!("stage{}", i + 2));
            let mut units = Vec::with_capacity(repeats);
            units.push(InvertedResidual::load(
                &stage.pp(0),
                in_channels,
                out_channels,
                2,
            )?);
            for j in 1..repeats {
                units.push(InvertedResidual::load(
                    &stage.pp(j),
                    out_channels,
                    out_channels,
                    1,
                )?);
            }
            stages.push(units);
            in_channels = out_channels;
        }

        let conv5 = w.pp("conv5");
        let conv5 = ConvBn::load(
            &conv5.pp(0),
            &conv5.pp(1),
            in_channels,
            LATENT_CHANNELS,
            1,
            Conv2dConfig::default(),
            Activation::Relu,
        )?;

        Ok(Self {
            conv1,
            stages,
            conv5,
        })
    }

    pub fn forward(&self, x: &Array4<f32>) -> Result<EncoderOutput, NnError> {
        let s1 = self.conv1.forward(x)?;
        let s2 = max_pool2d(&s1, 3, 2, 1)?;

        let mut taps = Vec::with_capacity(self.stages.len());
        let mut features = s2.clone();
        for stage in &self.stages {
            for unit in stage {
                features = unit.forward(&features)?;
            }
            taps.push(features.clone());
        }
        let bottleneck = self.conv5.forward(&features)?;

        // taps = [stage2, stage3, stage4]; stage4 output only feeds conv5
        let mut taps = taps.into_iter();
        let (s3, s4) = match (taps.next(), taps.next()) {
            (Some(s3), Some(s4)) => (s3, s4),
            _ => {
                return Err(NnError::InvalidConfig(
                    "encoder needs at least two stages".to_string(),
                ))
            }
        };

        Ok(EncoderOutput {
            bottleneck,
            skips: [s4, s3, s2, s1],
        })
    }
}
