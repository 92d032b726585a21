// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Native backend forward-pass tests
//!
//! These tests verify that:
//! - Latent and reconstruction shapes follow the input size
//! - Reconstructions stay in [0, 1]
//! - The forward pass is deterministic
//! - Batches and non-square inputs are handled
//! - Inputs that are not multiples of 32 are rejected

use image_shifter_node::autoencoder::{
    NativeBackend, ReconstructionBackend, UNetAutoencoder, LATENT_CHANNELS,
};
use image_shifter_node::nn::{SeededSource, Weights};
use ndarray::{s, Array4};

fn backend(input_size: u32) -> NativeBackend {
    NativeBackend::from_source(&SeededSource::new(42), input_size).unwrap()
}

fn ramp(shape: (usize, usize, usize, usize)) -> Array4<f32> {
    let total = (shape.0 * shape.1 * shape.2 * shape.3) as f32;
    let mut i = 0.0f32;
    Array4::from_shape_simple_fn(shape, || {
        i += 1.0;
        i / total
    })
}

#[cfg(test)]
mod native_backend_tests {
    use super::*;

    #[test]
    fn test_shapes_follow_input_size() {
        for size in [32usize, 64, 96] {
            let out = backend(size as u32).run(&ramp((1, 3, size, size))).unwrap();
            assert_eq!(out.latent.dim(), (1, LATENT_CHANNELS, size / 32, size / 32));
            assert_eq!(out.reconstruction.dim(), (1, 3, size, size));
        }
    }

    #[test]
    fn test_reconstruction_range() {
        let out = backend(64).run(&ramp((1, 3, 64, 64))).unwrap();
        assert!(out
            .reconstruction
            .iter()
            .all(|&v| v.is_finite() && (0.0..=1.0).contains(&v)));
        assert!(out.latent.iter().all(|&v| v.is_finite() && v >= 0.0));
    }

    #[test]
    fn test_forward_is_deterministic() {
        let input = ramp((1, 3, 64, 64));
        let a = backend(64).run(&input).unwrap();
        let b = backend(64).run(&input).unwrap();
        assert_eq!(a.latent, b.latent);
        assert_eq!(a.reconstruction, b.reconstruction);
    }

    #[test]
    fn test_batch_items_are_independent() {
        let model = backend(32);
        let single = ramp((1, 3, 32, 32));
        let mut batch = Array4::zeros((2, 3, 32, 32));
        batch.slice_mut(s![0..1, .., .., ..]).assign(&single);
        batch.slice_mut(s![1..2, .., .., ..]).fill(0.5);

        let alone = model.run(&single).unwrap();
        let together = model.run(&batch).unwrap();
        assert_eq!(together.reconstruction.dim(), (2, 3, 32, 32));

        let first = together.reconstruction.slice(s![0..1, .., .., ..]);
        for (a, b) in first.iter().zip(alone.reconstruction.iter()) {
            assert!((a - b).abs() < 1e-5);
        }
    }

    #[test]
    fn test_non_square_input() {
        let source = SeededSource::new(42);
        let model = UNetAutoencoder::load(&Weights::new(&source)).unwrap();
        let out = model.forward(&ramp((1, 3, 32, 64))).unwrap();
        assert_eq!(out.latent.dim(), (1, LATENT_CHANNELS, 1, 2));
        assert_eq!(out.reconstruction.dim(), (1, 3, 32, 64));
    }

    #[test]
    fn test_rejects_bad_inputs() {
        let model = backend(64);
        assert!(model.run(&ramp((1, 3, 60, 64))).is_err());
        assert!(model.run(&ramp((1, 4, 64, 64))).is_err());
        assert!(NativeBackend::from_source(&SeededSource::new(1), 0).is_err());
    }
}
