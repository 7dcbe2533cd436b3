//! The shared model arena.
//!
//! [`ModelInfo`] owns every weight, bias, momentum and ADADELTA array of the
//! network. Worker layer chains borrow it for the duration of a pass and
//! update it in place, concurrently and without locks (see
//! [`crate::vector::HogwildF32`]). The arena outlives every chain that borrows
//! it.

use crate::error::{Error, Result};
use crate::matrix::{DenseRowMatrix, Matrix};
use crate::params::{InitialWeightDistribution, Params};
use crate::vector::DenseVector;

use rand::distributions::Uniform;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::Normal;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::{debug, warn};

/// The per-weight state kept between updates. Exactly one mode is active for
/// the whole network.
#[derive(Debug)]
pub enum UpdateState {
    /// Plain SGD, nothing beyond the weights.
    Plain,
    /// Previous update (classic) or accumulated velocity (Nesterov).
    Momentum {
        weights: Vec<DenseRowMatrix>,
        biases: Vec<DenseVector>,
    },
    /// Two accumulators per weight, interleaved: `[2w]` holds the decayed
    /// squared update, `[2w + 1]` the decayed squared gradient.
    AdaDelta { accumulators: Vec<DenseVector> },
}

#[derive(Debug)]
pub struct ModelInfo {
    params: Params,
    /// Units per layer, input first and output last.
    units: Vec<usize>,
    /// `weights[i]` connects layer `i` to layer `i + 1`; one row per unit of
    /// layer `i + 1`.
    weights: Vec<Matrix>,
    biases: Vec<DenseVector>,
    update: UpdateState,
    processed: AtomicU64,
    unstable: AtomicBool,
}

impl ModelInfo {
    /// Allocates a zero-initialized model for `params.hidden` hidden layers.
    pub fn new(params: &Params, input_units: usize, output_units: usize) -> Self {
        let mut units = Vec::with_capacity(params.hidden.len() + 2);
        units.push(input_units);
        units.extend_from_slice(&params.hidden);
        units.push(output_units);

        let shapes: Vec<(usize, usize)> = units.windows(2).map(|w| (w[1], w[0])).collect();
        let weights = shapes
            .iter()
            .map(|&(rows, cols)| Matrix::DenseRow(DenseRowMatrix::zeros(rows, cols)))
            .collect();
        let biases = shapes.iter().map(|&(rows, _)| DenseVector::zeros(rows)).collect();

        let update = if params.adaptive_rate {
            UpdateState::AdaDelta {
                accumulators: shapes
                    .iter()
                    .map(|&(rows, cols)| DenseVector::zeros(2 * rows * cols))
                    .collect(),
            }
        } else if params.has_momenta() {
            UpdateState::Momentum {
                weights: shapes
                    .iter()
                    .map(|&(rows, cols)| DenseRowMatrix::zeros(rows, cols))
                    .collect(),
                biases: shapes.iter().map(|&(rows, _)| DenseVector::zeros(rows)).collect(),
            }
        } else {
            UpdateState::Plain
        };
        debug!(?units, mode = update.name(), "allocated model");

        ModelInfo {
            params: params.clone(),
            units,
            weights,
            biases,
            update,
            processed: AtomicU64::new(0),
            unstable: AtomicBool::new(false),
        }
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn units(&self) -> &[usize] {
        &self.units
    }

    /// Number of weight matrices, one less than the number of layers.
    pub fn connections(&self) -> usize {
        self.weights.len()
    }

    pub fn weights(&self, i: usize) -> &Matrix {
        &self.weights[i]
    }

    pub fn biases(&self, i: usize) -> &DenseVector {
        &self.biases[i]
    }

    pub fn weights_momenta(&self, i: usize) -> Option<&DenseRowMatrix> {
        match &self.update {
            UpdateState::Momentum { weights, .. } => Some(&weights[i]),
            _ => None,
        }
    }

    pub fn biases_momenta(&self, i: usize) -> Option<&DenseVector> {
        match &self.update {
            UpdateState::Momentum { biases, .. } => Some(&biases[i]),
            _ => None,
        }
    }

    pub fn ada(&self, i: usize) -> Option<&DenseVector> {
        match &self.update {
            UpdateState::AdaDelta { accumulators } => Some(&accumulators[i]),
            _ => None,
        }
    }

    pub fn update_state(&self) -> &UpdateState {
        &self.update
    }

    pub fn has_momenta(&self) -> bool {
        matches!(self.update, UpdateState::Momentum { .. })
    }

    pub fn adaptive_rate(&self) -> bool {
        matches!(self.update, UpdateState::AdaDelta { .. })
    }

    /// Replaces connection `i` with a matrix of the same shape, possibly in a
    /// different layout.
    pub fn set_weights(&mut self, i: usize, weights: Matrix) -> Result<()> {
        let old = &self.weights[i];
        if (old.rows(), old.cols()) != (weights.rows(), weights.cols()) {
            return Err(Error::InvalidData(format!(
                "connection {} is {}x{}, got {}x{}",
                i,
                old.rows(),
                old.cols(),
                weights.rows(),
                weights.cols()
            )));
        }
        self.weights[i] = weights;
        Ok(())
    }

    /// Draws fresh dense row-major weights from the configured distribution.
    pub fn randomize_weights(&mut self, seed: u64) -> Result<()> {
        let mut rng = StdRng::seed_from_u64(seed);
        let distribution = self.params.initial_weight_distribution;
        for (i, w) in self.weights.iter_mut().enumerate() {
            let (rows, cols) = (w.rows(), w.cols());
            let fresh = match distribution {
                InitialWeightDistribution::UniformAdaptive => {
                    let range = (6.0 / (rows + cols) as f64).sqrt() as f32;
                    DenseRowMatrix::random(Uniform::new_inclusive(-range, range), rows, cols, &mut rng)
                }
                InitialWeightDistribution::Uniform(scale) => {
                    let scale = scale.abs() as f32;
                    DenseRowMatrix::random(Uniform::new_inclusive(-scale, scale), rows, cols, &mut rng)
                }
                InitialWeightDistribution::Normal(stddev) => {
                    let normal = Normal::new(0.0, stddev as f32).map_err(|e| {
                        Error::invalid_config(format!("normal stddev {}: {}", stddev, e))
                    })?;
                    DenseRowMatrix::random(normal, rows, cols, &mut rng)
                }
            };
            debug!(connection = i, rows, cols, "randomized weights");
            *w = Matrix::DenseRow(fresh);
        }
        Ok(())
    }

    /// Training examples processed so far, by all workers together.
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    pub fn add_processed(&self, n: u64) {
        self.processed.fetch_add(n, Ordering::Relaxed);
    }

    /// Marks the model as diverged. Sticky; checked by the outer trainer
    /// between passes.
    pub fn set_unstable(&self) {
        if !self.unstable.swap(true, Ordering::Relaxed) {
            warn!("model is numerically unstable");
        }
    }

    pub fn is_unstable(&self) -> bool {
        self.unstable.load(Ordering::Relaxed)
    }
}

impl UpdateState {
    fn name(&self) -> &'static str {
        match self {
            UpdateState::Plain => "plain",
            UpdateState::Momentum { .. } => "momentum",
            UpdateState::AdaDelta { .. } => "adadelta",
        }
    }
}
