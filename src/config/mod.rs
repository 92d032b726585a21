// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Node configuration
//!
//! Layers, lowest precedence first:
//! 1. built-in defaults
//! 2. optional TOML file (`[server]` and `[model]` tables)
//! 3. environment variables (a `.env` file is honoured)
//! 4. command-line flags
//!
//! clap merges 3 and 4 into [`ConfigOverrides`], which are applied on top of
//! the file.

use std::path::{Path, PathBuf};

use clap::Args;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::autoencoder::{validate_input_size, BackendKind, DEFAULT_INPUT_SIZE};
use crate::vision::DEFAULT_MAX_IMAGE_BYTES;

pub const DEFAULT_CHECKPOINT: &str = "autoencoder_shufflenet.safetensors";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Largest accepted request body in bytes
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            max_upload_bytes: DEFAULT_MAX_IMAGE_BYTES,
        }
    }
}

impl ServerConfig {
    /// `host:port` to bind the HTTP listener to
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// safetensors checkpoint (native) or `.onnx` graph (onnx)
    pub checkpoint_path: PathBuf,
    pub backend: BackendKind,
    /// Square model input size, a positive multiple of 32
    pub input_size: u32,
    /// Hugging Face Hub repo to fetch the checkpoint from when it is missing
    pub hub_repo: Option<String>,
    /// ONNX Runtime intra-op threads
    pub intra_threads: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            checkpoint_path: PathBuf::from(DEFAULT_CHECKPOINT),
            backend: BackendKind::default(),
            input_size: DEFAULT_INPUT_SIZE,
            hub_repo: None,
            intra_threads: 4,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub server: ServerConfig,
    pub model: ModelConfig,
}

impl NodeConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Apply env/CLI values on top of this config
    pub fn apply(&mut self, overrides: &ConfigOverrides) {
        if let Some(host) = &overrides.host {
            self.server.host = host.clone();
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(max) = overrides.max_upload_bytes {
            self.server.max_upload_bytes = max;
        }
        if let Some(path) = &overrides.checkpoint {
            self.model.checkpoint_path = path.clone();
        }
        if let Some(backend) = overrides.backend {
            self.model.backend = backend;
        }
        if let Some(size) = overrides.input_size {
            self.model.input_size = size;
        }
        if let Some(repo) = &overrides.hub_repo {
            self.model.hub_repo = Some(repo.clone());
        }
        if let Some(threads) = overrides.intra_threads {
            self.model.intra_threads = threads;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_input_size(self.model.input_size)
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        if self.server.max_upload_bytes == 0 {
            return Err(ConfigError::Invalid(
                "max_upload_bytes must be greater than 0".to_string(),
            ));
        }
        if self.model.intra_threads == 0 {
            return Err(ConfigError::Invalid(
                "intra_threads must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Settings taken from environment variables and command-line flags
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// TOML config file
    #[arg(long, env = "NODE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Address to listen on
    #[arg(long, env = "API_HOST", global = true)]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(long, env = "API_PORT", global = true)]
    pub port: Option<u16>,

    /// Largest accepted upload in bytes
    #[arg(long, env = "MAX_UPLOAD_BYTES", global = true)]
    pub max_upload_bytes: Option<usize>,

    /// Model checkpoint (safetensors, or .onnx with --backend onnx)
    #[arg(long, env = "MODEL_PATH", global = true)]
    pub checkpoint: Option<PathBuf>,

    /// Inference backend
    #[arg(long, env = "MODEL_BACKEND", value_enum, global = true)]
    pub backend: Option<BackendKind>,

    /// Square model input size (multiple of 32)
    #[arg(long, env = "MODEL_INPUT_SIZE", global = true)]
    pub input_size: Option<u32>,

    /// Hugging Face Hub repo to download a missing checkpoint from
    #[arg(long, env = "MODEL_HUB_REPO", global = true)]
    pub hub_repo: Option<String>,

    /// ONNX Runtime intra-op threads
    #[arg(long, env = "ONNX_INTRA_THREADS", global = true)]
    pub intra_threads: Option<usize>,
}

/// Build the effective configuration
pub fn load(overrides: &ConfigOverrides) -> Result<NodeConfig, ConfigError> {
    let mut config = match &overrides.config {
        Some(path) => NodeConfig::from_file(path)?,
        None => NodeConfig::default(),
    };
    config.apply(overrides);
    config.validate()?;
    Ok(config)
}
