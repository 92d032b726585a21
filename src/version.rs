// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// Version information for the Image Reconstruction Node

/// Full version string with feature description
pub const VERSION: &str = "v0.1.0-shufflenet-unet-2025-11-03";

/// Semantic version number
pub const VERSION_NUMBER: &str = env!("CARGO_PKG_VERSION");

/// Build date
pub const BUILD_DATE: &str = "2025-11-03";

/// Supported features in this version
pub const FEATURES: &[&str] = &[
    "shufflenet-v2-encoder",
    "unet-decoder",
    "native-backend",
    "onnx-backend",
    "safetensors-checkpoints",
    "hub-download",
    "prometheus-metrics",
];

/// Get formatted version string for logging
pub fn get_version_string() -> String {
    format!(
        "Image Reconstruction Node {} ({})",
        VERSION_NUMBER, BUILD_DATE
    )
}
