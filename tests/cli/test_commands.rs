// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! CLI command tests
//!
//! These tests verify that:
//! - `reconstruct` writes an S x S PNG and the optional latent JSON
//! - `reconstruct` fails when the checkpoint is absent or broken
//! - `inspect-checkpoint` passes a complete checkpoint
//! - `inspect-checkpoint` fails on an incomplete checkpoint
//! - `inspect-checkpoint` refuses the ONNX backend

use image::GenericImageView;
use image_shifter_node::autoencoder::BackendKind;
use image_shifter_node::cli::inspect::{self, InspectArgs};
use image_shifter_node::cli::reconstruct::{self, ReconstructArgs};
use image_shifter_node::config::NodeConfig;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::common::{png_bytes, random_checkpoint_tensors, write_checkpoint, write_random_checkpoint};

fn config_for(checkpoint: &Path) -> NodeConfig {
    let mut config = NodeConfig::default();
    config.model.checkpoint_path = checkpoint.to_path_buf();
    config.model.backend = BackendKind::Native;
    config.model.input_size = 64;
    config
}

fn write_input(dir: &TempDir) -> PathBuf {
    let input = dir.path().join("input.png");
    std::fs::write(&input, png_bytes(100, 70)).unwrap();
    input
}

#[cfg(test)]
mod reconstruct_command_tests {
    use super::*;

    #[tokio::test]
    async fn test_reconstruct_writes_png_and_latent() {
        let dir = TempDir::new().unwrap();
        let checkpoint = dir.path().join("autoencoder.safetensors");
        write_random_checkpoint(&checkpoint, 4);

        let output = dir.path().join("out.png");
        let latent = dir.path().join("latent.json");
        let args = ReconstructArgs {
            input: write_input(&dir),
            output: output.clone(),
            latent: Some(latent.clone()),
        };
        reconstruct::run(config_for(&checkpoint), args).await.unwrap();

        let written = image::open(&output).unwrap();
        assert_eq!(written.dimensions(), (64, 64));

        let json: Value = serde_json::from_slice(&std::fs::read(&latent).unwrap()).unwrap();
        assert_eq!(json["shape"], serde_json::json!([1, 1024, 2, 2]));
        assert_eq!(json["backend"], "native");
        let data = json["data"].as_array().unwrap();
        assert_eq!(data.len(), 1);
        assert_eq!(data[0].as_array().unwrap().len(), 1024);
        assert_eq!(data[0][0].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_reconstruct_without_latent_flag() {
        let dir = TempDir::new().unwrap();
        let checkpoint = dir.path().join("autoencoder.safetensors");
        write_random_checkpoint(&checkpoint, 4);

        let output = dir.path().join("out.png");
        let args = ReconstructArgs {
            input: write_input(&dir),
            output: output.clone(),
            latent: None,
        };
        reconstruct::run(config_for(&checkpoint), args).await.unwrap();
        assert!(output.exists());
    }

    #[tokio::test]
    async fn test_reconstruct_missing_checkpoint_fails() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("out.png");
        let args = ReconstructArgs {
            input: write_input(&dir),
            output: output.clone(),
            latent: None,
        };

        let err = reconstruct::run(config_for(&dir.path().join("absent.safetensors")), args)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not loaded"));
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn test_reconstruct_incomplete_checkpoint_fails() {
        let dir = TempDir::new().unwrap();
        let checkpoint = dir.path().join("partial.safetensors");
        let mut tensors = random_checkpoint_tensors(4);
        tensors.remove("decoder.final_conv.weight").unwrap();
        write_checkpoint(&checkpoint, &tensors);

        let args = ReconstructArgs {
            input: write_input(&dir),
            output: dir.path().join("out.png"),
            latent: None,
        };
        let err = reconstruct::run(config_for(&checkpoint), args)
            .await
            .unwrap_err();
        assert!(format!("{:#}", err).contains("decoder.final_conv.weight"));
    }
}

#[cfg(test)]
mod inspect_command_tests {
    use super::*;

    #[test]
    fn test_inspect_complete_checkpoint() {
        let dir = TempDir::new().unwrap();
        let checkpoint = dir.path().join("autoencoder.safetensors");
        write_random_checkpoint(&checkpoint, 8);

        assert!(inspect::run(config_for(&checkpoint), InspectArgs { json: false }).is_ok());
        assert!(inspect::run(config_for(&checkpoint), InspectArgs { json: true }).is_ok());
    }

    #[test]
    fn test_inspect_incomplete_checkpoint_fails() {
        let dir = TempDir::new().unwrap();
        let checkpoint = dir.path().join("partial.safetensors");
        let mut tensors = random_checkpoint_tensors(8);
        tensors.remove("encoder.conv5.1.running_var").unwrap();
        write_checkpoint(&checkpoint, &tensors);

        let err = inspect::run(config_for(&checkpoint), InspectArgs { json: false }).unwrap_err();
        assert!(err.to_string().contains("1 missing"));
    }

    #[test]
    fn test_inspect_refuses_onnx_backend() {
        let dir = TempDir::new().unwrap();
        let checkpoint = dir.path().join("autoencoder.safetensors");
        write_random_checkpoint(&checkpoint, 8);

        let mut config = config_for(&checkpoint);
        config.model.backend = BackendKind::Onnx;
        let err = inspect::run(config, InspectArgs { json: false }).unwrap_err();
        assert!(err.to_string().contains("safetensors"));
    }
}
