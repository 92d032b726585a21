// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// src/monitoring/mod.rs - Request and latency metrics

pub mod metrics;

pub use metrics::{Metrics, RequestOutcome, METRICS_CONTENT_TYPE};
