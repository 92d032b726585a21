// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Prometheus metrics for the reconstruction endpoint

use anyhow::Result;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounterVec, Opts, Registry, TextEncoder};

/// Content type of the text exposition format
pub const METRICS_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

/// How a reconstruct request ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    Success,
    InvalidImage,
    InvalidRequest,
    ModelNotLoaded,
    InferenceFailed,
}

impl RequestOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestOutcome::Success => "success",
            RequestOutcome::InvalidImage => "invalid_image",
            RequestOutcome::InvalidRequest => "invalid_request",
            RequestOutcome::ModelNotLoaded => "model_not_loaded",
            RequestOutcome::InferenceFailed => "inference_failed",
        }
    }
}

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    requests: IntCounterVec,
    inference_seconds: Histogram,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish_non_exhaustive()
    }
}

impl Metrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let requests = IntCounterVec::new(
            Opts::new(
                "reconstruct_requests_total",
                "Reconstruct requests by outcome",
            ),
            &["outcome"],
        )?;
        let inference_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "reconstruct_inference_seconds",
                "Autoencoder forward pass latency",
            )
            .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
        )?;

        registry.register(Box::new(requests.clone()))?;
        registry.register(Box::new(inference_seconds.clone()))?;

        Ok(Self {
            registry,
            requests,
            inference_seconds,
        })
    }

    pub fn record_request(&self, outcome: RequestOutcome) {
        self.requests.with_label_values(&[outcome.as_str()]).inc();
    }

    pub fn observe_inference(&self, seconds: f64) {
        self.inference_seconds.observe(seconds);
    }

    pub fn request_count(&self, outcome: RequestOutcome) -> u64 {
        self.requests.with_label_values(&[outcome.as_str()]).get()
    }

    /// Encode every registered metric in the text exposition format
    pub fn render(&self) -> Result<String> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        Ok(String::from_utf8(buf)?)
    }
}
