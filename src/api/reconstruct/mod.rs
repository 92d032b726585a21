// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Reconstruct API endpoint module
//!
//! Provides POST /reconstruct/ for running an upload through the autoencoder.

pub mod handler;
pub mod response;

pub use handler::{reconstruct_handler, FILE_FIELD};
pub use response::{latent_to_nested, NestedLatent, ReconstructResponse};
