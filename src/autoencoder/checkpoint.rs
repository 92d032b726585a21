// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Checkpoint inspection and resolution

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, warn};

use super::native::parameter_specs;
use crate::nn::{ParamSpec, SafetensorsSource, WeightError};

/// BatchNorm step counters carry no inference state
const IGNORED_SUFFIX: &str = "num_batches_tracked";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShapeMismatch {
    pub name: String,
    pub expected: Vec<usize>,
    pub actual: Vec<usize>,
}

/// Result of comparing a checkpoint against the network topology
#[derive(Debug, Clone, Default, Serialize)]
pub struct CheckpointReport {
    pub total_tensors: usize,
    pub expected: usize,
    /// Scalar parameters across all expected tensors
    pub expected_parameters: usize,
    pub missing: Vec<String>,
    pub mismatched: Vec<ShapeMismatch>,
    pub unused: Vec<String>,
}

impl CheckpointReport {
    /// True when every expected tensor is present with the right shape
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty() && self.mismatched.is_empty()
    }
}

pub fn inspect_checkpoint<P: AsRef<Path>>(path: P) -> Result<CheckpointReport, WeightError> {
    let source = SafetensorsSource::open(path)?;
    inspect_source(&source)
}

pub fn inspect_source(source: &SafetensorsSource) -> Result<CheckpointReport, WeightError> {
    let specs = parameter_specs()?;
    let mut report = CheckpointReport {
        total_tensors: source.len(),
        expected: specs.len(),
        expected_parameters: specs.iter().map(ParamSpec::numel).sum(),
        ..Default::default()
    };

    let mut wanted = HashSet::with_capacity(specs.len());
    for spec in &specs {
        wanted.insert(spec.name.as_str());
        match source.shape_of(&spec.name) {
            None => report.missing.push(spec.name.clone()),
            Some(actual) if actual != spec.shape.as_slice() => {
                report.mismatched.push(ShapeMismatch {
                    name: spec.name.clone(),
                    expected: spec.shape.clone(),
                    actual: actual.to_vec(),
                })
            }
            Some(_) => {}
        }
    }

    report.unused = source
        .names()
        .into_iter()
        .filter(|name| !wanted.contains(name) && !name.ends_with(IGNORED_SUFFIX))
        .map(str::to_string)
        .collect();

    Ok(report)
}

/// Locate the checkpoint file, downloading it from the Hugging Face Hub when
/// it is missing locally and `hub_repo` is set
///
/// Returns `Ok(None)` only when the file is absent and no hub repo is
/// configured. A failed download is an error.
pub async fn resolve_checkpoint(path: &Path, hub_repo: Option<&str>) -> Result<Option<PathBuf>> {
    if path.exists() {
        return Ok(Some(path.to_path_buf()));
    }

    let Some(repo) = hub_repo else {
        return Ok(None);
    };

    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("Invalid checkpoint path: {}", path.display()))?;

    warn!(
        "Checkpoint {} missing locally, fetching {} from hub repo {}",
        path.display(),
        filename,
        repo
    );
    let api = hf_hub::api::tokio::Api::new().context("Failed to create Hugging Face Hub client")?;
    let downloaded = api
        .model(repo.to_string())
        .get(filename)
        .await
        .with_context(|| format!("Failed to download {} from {}", filename, repo))?;

    info!("Checkpoint cached at {}", downloaded.display());
    Ok(Some(downloaded))
}
