// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::Result;
use clap::Args;

use crate::autoencoder::{inspect_checkpoint, BackendKind, CheckpointReport};
use crate::config::NodeConfig;

/// Arguments for the inspect-checkpoint command
///
/// The checkpoint comes from the global `--checkpoint` / `MODEL_PATH` setting.
#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

fn print_report(report: &CheckpointReport) {
    println!(
        "Tensors in checkpoint: {} (network expects {}, {} parameters)",
        report.total_tensors, report.expected, report.expected_parameters
    );
    println!("Missing: {}", report.missing.len());
    for name in &report.missing {
        println!("  - {}", name);
    }
    println!("Shape mismatches: {}", report.mismatched.len());
    for m in &report.mismatched {
        println!("  - {}: {:?}, expected {:?}", m.name, m.actual, m.expected);
    }
    println!("Unused: {}", report.unused.len());
    for name in &report.unused {
        println!("  - {}", name);
    }
}

pub fn run(config: NodeConfig, args: InspectArgs) -> Result<()> {
    if config.model.backend == BackendKind::Onnx {
        anyhow::bail!("inspect-checkpoint reads safetensors checkpoints of the native backend");
    }

    let path = &config.model.checkpoint_path;
    let report = inspect_checkpoint(path)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Checkpoint: {}", path.display());
        print_report(&report);
    }

    if !report.is_complete() {
        anyhow::bail!(
            "Checkpoint {} is incomplete: {} missing, {} mismatched",
            path.display(),
            report.missing.len(),
            report.mismatched.len()
        );
    }
    Ok(())
}
