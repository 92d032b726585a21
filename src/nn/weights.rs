// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Named tensor sources for building layers
//!
//! Layers never read files directly. They ask a [`Weights`] scope for a tensor
//! by name and expected shape, and the scope forwards the fully-qualified name
//! (`encoder.stage2.0.branch1.0.weight`) to a [`TensorSource`].
//!
//! Sources:
//! - [`SafetensorsSource`] - trained checkpoint on disk
//! - [`ShapeRecorder`] - placeholder values, records every request
//! - [`SeededSource`] - deterministic random initialisation

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use ndarray::{Array1, Array4, ArrayD, IxDyn, Ix1, Ix4};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use safetensors::{Dtype, SafeTensors};
use thiserror::Error;
use tracing::debug;

use super::NnError;

#[derive(Debug, Error)]
pub enum WeightError {
    #[error("Failed to read checkpoint {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid safetensors data: {0}")]
    Format(String),

    #[error("Tensor '{0}' not found in checkpoint")]
    Missing(String),

    #[error("Tensor '{name}' has shape {actual:?}, expected {expected:?}")]
    ShapeMismatch {
        name: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("Tensor '{name}' has unsupported dtype {dtype}")]
    UnsupportedDtype { name: String, dtype: String },

    #[error("Invalid layer: {0}")]
    Layer(#[from] NnError),
}

/// One named parameter of a network
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: String,
    pub shape: Vec<usize>,
}

impl ParamSpec {
    pub fn numel(&self) -> usize {
        self.shape.iter().product()
    }
}

/// Anything that can hand out f32 tensors by fully-qualified name
pub trait TensorSource {
    fn fetch(&self, name: &str, shape: &[usize]) -> Result<ArrayD<f32>, WeightError>;
}

/// Prefix-scoped view over a tensor source
#[derive(Clone)]
pub struct Weights<'a> {
    source: &'a dyn TensorSource,
    prefix: String,
}

impl fmt::Debug for Weights<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Weights")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

impl<'a> Weights<'a> {
    pub fn new(source: &'a dyn TensorSource) -> Self {
        Self {
            source,
            prefix: String::new(),
        }
    }

    /// Push a path segment (`pp("stage2").pp(0)` -> `stage2.0.`)
    pub fn pp(&self, segment: impl fmt::Display) -> Weights<'a> {
        Weights {
            source: self.source,
            prefix: self.path(segment),
        }
    }

    /// Fully-qualified name of `segment` in this scope
    pub fn path(&self, segment: impl fmt::Display) -> String {
        if self.prefix.is_empty() {
            segment.to_string()
        } else {
            format!("{}.{}", self.prefix, segment)
        }
    }

    pub fn get(&self, name: &str, shape: &[usize]) -> Result<ArrayD<f32>, WeightError> {
        let full = self.path(name);
        let tensor = self.source.fetch(&full, shape)?;
        if tensor.shape() != shape {
            return Err(WeightError::ShapeMismatch {
                name: full,
                expected: shape.to_vec(),
                actual: tensor.shape().to_vec(),
            });
        }
        Ok(tensor)
    }

    pub fn get1(&self, name: &str, len: usize) -> Result<Array1<f32>, WeightError> {
        self.get(name, &[len])?
            .into_dimensionality::<Ix1>()
            .map_err(|e| WeightError::Format(e.to_string()))
    }

    pub fn get4(&self, name: &str, shape: [usize; 4]) -> Result<Array4<f32>, WeightError> {
        self.get(name, &shape)?
            .into_dimensionality::<Ix4>()
            .map_err(|e| WeightError::Format(e.to_string()))
    }
}

#[derive(Debug, Clone)]
struct StoredTensor {
    dtype: Dtype,
    shape: Vec<usize>,
    values: Option<ArrayD<f32>>,
}

/// Trained weights read from a `.safetensors` checkpoint
///
/// F32 and F64 tensors are decoded up front; other dtypes (such as the I64
/// `num_batches_tracked` counters) are indexed but cannot be fetched.
#[derive(Debug, Clone)]
pub struct SafetensorsSource {
    tensors: HashMap<String, StoredTensor>,
}

impl SafetensorsSource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, WeightError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| WeightError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(
            "Read checkpoint {} ({} bytes)",
            path.display(),
            bytes.len()
        );
        Self::from_bytes(&bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WeightError> {
        let parsed =
            SafeTensors::deserialize(bytes).map_err(|e| WeightError::Format(format!("{:?}", e)))?;

        let mut tensors = HashMap::new();
        for (name, view) in parsed.tensors() {
            let shape = view.shape().to_vec();
            let values = match view.dtype() {
                Dtype::F32 => Some(decode_le(view.data(), 4, |c| {
                    f32::from_le_bytes([c[0], c[1], c[2], c[3]])
                })),
                Dtype::F64 => Some(decode_le(view.data(), 8, |c| {
                    f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]) as f32
                })),
                _ => None,
            };
            let values = match values {
                Some(v) => Some(
                    ArrayD::from_shape_vec(IxDyn(&shape), v)
                        .map_err(|e| WeightError::Format(format!("{}: {}", name, e)))?,
                ),
                None => None,
            };
            tensors.insert(
                name,
                StoredTensor {
                    dtype: view.dtype(),
                    shape,
                    values,
                },
            );
        }

        Ok(Self { tensors })
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    /// Tensor names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tensors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn shape_of(&self, name: &str) -> Option<&[usize]> {
        self.tensors.get(name).map(|t| t.shape.as_slice())
    }
}

fn decode_le(data: &[u8], width: usize, decode: impl Fn(&[u8]) -> f32) -> Vec<f32> {
    data.chunks_exact(width).map(decode).collect()
}

impl TensorSource for SafetensorsSource {
    fn fetch(&self, name: &str, shape: &[usize]) -> Result<ArrayD<f32>, WeightError> {
        let stored = self
            .tensors
            .get(name)
            .ok_or_else(|| WeightError::Missing(name.to_string()))?;
        if stored.shape != shape {
            return Err(WeightError::ShapeMismatch {
                name: name.to_string(),
                expected: shape.to_vec(),
                actual: stored.shape.clone(),
            });
        }
        stored
            .values
            .clone()
            .ok_or_else(|| WeightError::UnsupportedDtype {
                name: name.to_string(),
                dtype: format!("{:?}", stored.dtype),
            })
    }
}

fn is_running_var(name: &str) -> bool {
    name.ends_with("running_var")
}

/// Hands out placeholder tensors and records every request
///
/// Running a network's loader against a recorder enumerates its parameters
/// without any checkpoint on disk.
#[derive(Debug, Default)]
pub struct ShapeRecorder {
    specs: RefCell<Vec<ParamSpec>>,
}

impl ShapeRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_specs(self) -> Vec<ParamSpec> {
        self.specs.into_inner()
    }
}

impl TensorSource for ShapeRecorder {
    fn fetch(&self, name: &str, shape: &[usize]) -> Result<ArrayD<f32>, WeightError> {
        self.specs.borrow_mut().push(ParamSpec {
            name: name.to_string(),
            shape: shape.to_vec(),
        });
        let fill = if is_running_var(name) { 1.0 } else { 0.0 };
        Ok(ArrayD::from_elem(IxDyn(shape), fill))
    }
}

/// Deterministic random weights
///
/// Conv kernels use a Kaiming-uniform bound of `sqrt(6 / fan_in)`; batch norm
/// statistics stay close to identity so activations keep a sane range through
/// deep stacks.
#[derive(Debug)]
pub struct SeededSource {
    rng: RefCell<StdRng>,
}

impl SeededSource {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: RefCell::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl TensorSource for SeededSource {
    fn fetch(&self, name: &str, shape: &[usize]) -> Result<ArrayD<f32>, WeightError> {
        let mut rng = self.rng.borrow_mut();
        let len: usize = shape.iter().product();

        let (low, high) = if shape.len() >= 2 {
            let fan_in: usize = shape[1..].iter().product();
            let bound = (6.0 / fan_in.max(1) as f32).sqrt();
            (-bound, bound)
        } else if is_running_var(name) {
            (0.5, 1.5)
        } else if name.ends_with("running_mean") || name.ends_with("bias") {
            (-0.1, 0.1)
        } else {
            (0.8, 1.2)
        };

        let values: Vec<f32> = (0..len).map(|_| rng.gen_range(low..high)).collect();
        ArrayD::from_shape_vec(IxDyn(shape), values).map_err(|e| WeightError::Format(e.to_string()))
    }
}
