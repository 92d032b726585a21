// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! ONNX Runtime backend for an exported autoencoder graph
//!
//! The graph takes one `[N, 3, S, S]` float input and produces the latent
//! code and the reconstruction. Outputs named `latent` and `reconstruction`
//! are matched by name; otherwise the first output is the latent and the
//! second the reconstruction.

use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use ndarray::{Array4, Ix4};
use ort::execution_providers::CPUExecutionProvider;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Value;
use tracing::{debug, info};

use super::backend::{AutoencoderOutput, ReconstructionBackend};
use super::native::validate_input_size;

pub const LATENT_OUTPUT: &str = "latent";
pub const RECONSTRUCTION_OUTPUT: &str = "reconstruction";

#[derive(Clone)]
pub struct OnnxBackend {
    /// ONNX Runtime session (thread-safe)
    session: Arc<Mutex<Session>>,
    input_name: String,
    latent_index: usize,
    reconstruction_index: usize,
    input_size: u32,
}

impl std::fmt::Debug for OnnxBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxBackend")
            .field("input_name", &self.input_name)
            .field("latent_index", &self.latent_index)
            .field("reconstruction_index", &self.reconstruction_index)
            .field("input_size", &self.input_size)
            .finish_non_exhaustive()
    }
}

/// Pick (latent, reconstruction) output positions from the graph's output names
fn resolve_output_indices(names: &[String]) -> Result<(usize, usize)> {
    if names.len() < 2 {
        anyhow::bail!(
            "Autoencoder graph must have 2 outputs (latent, reconstruction), found {}",
            names.len()
        );
    }
    let latent = names.iter().position(|n| n == LATENT_OUTPUT);
    let reconstruction = names.iter().position(|n| n == RECONSTRUCTION_OUTPUT);
    match (latent, reconstruction) {
        (Some(l), Some(r)) => Ok((l, r)),
        _ => Ok((0, 1)),
    }
}

impl OnnxBackend {
    /// Load an exported autoencoder
    ///
    /// Runs on the CPU execution provider with `intra_threads` worker threads.
    pub fn new<P: AsRef<Path>>(model_path: P, input_size: u32, intra_threads: usize) -> Result<Self> {
        let model_path = model_path.as_ref();
        if !model_path.exists() {
            anyhow::bail!("ONNX autoencoder not found: {}", model_path.display());
        }
        validate_input_size(input_size)?;

        info!("Loading ONNX autoencoder from {}", model_path.display());

        let session = Session::builder()
            .context("Failed to create session builder")?
            .with_execution_providers([CPUExecutionProvider::default().build()])
            .context("Failed to set CPU execution provider")?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .context("Failed to set optimization level")?
            .with_intra_threads(intra_threads.max(1))
            .context("Failed to set intra threads")?
            .commit_from_file(model_path)
            .context(format!(
                "Failed to load ONNX autoencoder from {}",
                model_path.display()
            ))?;

        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .unwrap_or_else(|| "input".to_string());
        let output_names: Vec<String> = session.outputs.iter().map(|o| o.name.clone()).collect();
        let (latent_index, reconstruction_index) = resolve_output_indices(&output_names)?;

        debug!(
            "ONNX autoencoder loaded - input: {}, outputs: {:?}",
            input_name, output_names
        );

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            input_name,
            latent_index,
            reconstruction_index,
            input_size,
        })
    }
}

impl ReconstructionBackend for OnnxBackend {
    fn name(&self) -> &'static str {
        "onnx"
    }

    fn input_size(&self) -> u32 {
        self.input_size
    }

    fn run(&self, input: &Array4<f32>) -> Result<AutoencoderOutput> {
        let shape = input.shape();
        if shape[1] != 3 {
            anyhow::bail!("Invalid input shape: {:?}, expected [N, 3, H, W]", shape);
        }

        let mut session = self
            .session
            .lock()
            .map_err(|_| anyhow::anyhow!("ONNX session lock poisoned"))?;

        let input_value =
            Value::from_array(input.to_owned()).context("Failed to create input tensor")?;
        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => input_value])
            .context("Autoencoder inference failed")?;

        let extract = |index: usize, what: &str| -> Result<Array4<f32>> {
            outputs[index]
                .try_extract_array::<f32>()
                .with_context(|| format!("Failed to extract {} tensor", what))?
                .to_owned()
                .into_dimensionality::<Ix4>()
                .with_context(|| format!("{} tensor is not 4-D", what))
        };

        let latent = extract(self.latent_index, LATENT_OUTPUT)?;
        let reconstruction = extract(self.reconstruction_index, RECONSTRUCTION_OUTPUT)?;
        Ok(AutoencoderOutput {
            latent,
            reconstruction,
        })
    }
}
