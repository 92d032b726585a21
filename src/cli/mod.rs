// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod inspect;
pub mod reconstruct;
pub mod serve;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::config::{self, ConfigOverrides};

/// Image Reconstruction Node
#[derive(Parser, Debug)]
#[command(name = "image-shifter-node")]
#[command(version)]
#[command(about = "ShuffleNetV2 / U-Net autoencoder inference server", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub config: ConfigOverrides,

    /// Defaults to `serve`
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP server
    Serve,

    /// Reconstruct a single image file offline
    Reconstruct(reconstruct::ReconstructArgs),

    /// Compare a safetensors checkpoint against the network's parameters
    InspectCheckpoint(inspect::InspectArgs),
}

/// Execute CLI command
pub async fn execute(cli: Cli) -> Result<()> {
    let config = config::load(&cli.config)?;
    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve::run(config).await,
        Commands::Reconstruct(args) => reconstruct::run(config, args).await,
        Commands::InspectCheckpoint(args) => inspect::run(config, args),
    }
}
