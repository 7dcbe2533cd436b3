//! Utilities for running training passes.
//!
//! A [`Pass`] is what one worker does between two checks of the shared
//! model: it builds a private [`Chain`], walks its rows once in order and
//! reports how it went. Running several passes on scoped threads against the
//! same [`ModelInfo`] gives Hogwild training.

use crate::data::{InputInfo, Target, TrainingRow};
use crate::error::{Error, Result};
use crate::feed_forward::Chain;
use crate::model::ModelInfo;
use crate::params::Loss;

use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Smallest probability fed to the log loss.
const MIN_PROBABILITY: f32 = 1e-15;

/// A builder for one sweep over a slice of rows.
#[derive(Debug)]
pub struct Pass<'a> {
    model: &'a ModelInfo,
    info: InputInfo,
    seed: u64,
    training: bool,
}

/// Summary of a finished pass.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PassReport {
    /// Rows processed before the pass ended.
    pub rows: usize,
    pub mean_loss: f64,
    pub elapsed: Duration,
    /// Whether the model was unstable when the pass ended.
    pub unstable: bool,
}

impl<'a> Pass<'a> {
    /// Creates a new training pass.
    ///
    /// The pass is initialized with the model's seed and in training mode.
    pub fn new(model: &'a ModelInfo, info: InputInfo) -> Self {
        Pass {
            model,
            info,
            seed: model.params().seed,
            training: true,
        }
    }

    /// Sets the seed the per-row dropout seeds are derived from.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Whether to update the model, or only score the rows.
    pub fn training(mut self, training: bool) -> Self {
        self.training = training;
        self
    }

    /// Processes every row once, stopping early if the model becomes
    /// unstable. The output layer is chosen from the first row's target.
    pub fn run(self, rows: &[TrainingRow]) -> Result<PassReport> {
        let start_time = Instant::now();
        let regression = matches!(rows.first().map(|r| r.target), Some(Target::Value(_)));
        let mut chain = if regression {
            Chain::regressor(self.model, self.info, self.training)?
        } else {
            Chain::classifier(self.model, self.info, self.training)?
        };
        let loss = self.model.params().loss;

        let mut processed = 0;
        let mut total_loss = 0.0;
        for (i, row) in rows.iter().enumerate() {
            if self.model.is_unstable() {
                warn!(rows = processed, "stopping pass on an unstable model");
                break;
            }
            let output = if self.training {
                chain.train_example(self.seed.wrapping_add(i as u64), row)?;
                chain.output().to_vec()
            } else {
                chain.predict(&row.features)?
            };
            total_loss += row_loss(loss, regression, &output, row.target)?;
            processed += 1;
        }

        let report = PassReport {
            rows: processed,
            mean_loss: if processed > 0 {
                total_loss / processed as f64
            } else {
                0.0
            },
            elapsed: start_time.elapsed(),
            unstable: self.model.is_unstable(),
        };
        info!(
            rows = report.rows,
            mean_loss = report.mean_loss,
            elapsed_ms = report.elapsed.as_millis() as u64,
            training = self.training,
            "pass complete"
        );
        Ok(report)
    }
}

/// Loss of one prediction: log loss for classes under cross-entropy, squared
/// error otherwise. The target must match the kind of output layer.
fn row_loss(loss: Loss, regression: bool, output: &[f32], target: Target) -> Result<f64> {
    match target {
        Target::Class(_) if regression => Err(Error::InvalidData(
            "class target in a regression pass".to_string(),
        )),
        Target::Value(_) if !regression => Err(Error::InvalidData(
            "numeric target in a classification pass".to_string(),
        )),
        Target::Class(class) if class >= output.len() => Err(Error::InvalidData(format!(
            "class {} is out of range for {} outputs",
            class,
            output.len()
        ))),
        Target::Class(class) => Ok(match loss {
            Loss::CrossEntropy => -(output[class].max(MIN_PROBABILITY) as f64).ln(),
            Loss::MeanSquare => {
                let expected: Vec<f64> = (0..output.len())
                    .map(|u| if u == class { 1.0 } else { 0.0 })
                    .collect();
                mean_square_error(output, &expected)
            }
        }),
        Target::Value(value) => Ok(mean_square_error(output, &[value as f64])),
    }
}

/// Computes the mean squared error between `actual` and `expected`.
fn mean_square_error(actual: &[f32], expected: &[f64]) -> f64 {
    let mut error = 0.0;
    for (&a, e) in actual.iter().zip(expected) {
        error += (a as f64 - e) * (a as f64 - e);
    }
    error / (actual.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{Activation, Params};

    fn rows() -> Vec<TrainingRow> {
        (0..40)
            .map(|i| {
                let x = if i % 2 == 0 { 1.0 } else { -1.0 };
                TrainingRow::new(vec![x, 0.5 * x], Target::Class(i % 2))
            })
            .collect()
    }

    fn params() -> Params {
        Params {
            hidden: vec![5],
            activation: Activation::Tanh,
            rate: 0.1,
            ..Params::default()
        }
    }

    #[test]
    fn training_pass_counts_rows() {
        let mut model = ModelInfo::new(&params(), 2, 2);
        model.randomize_weights(2).unwrap();
        let report = Pass::new(&model, InputInfo::numeric(2)).run(&rows()).unwrap();
        assert_eq!(report.rows, 40);
        assert_eq!(model.processed(), 40);
        assert!(!report.unstable);
        assert!(report.mean_loss > 0.0);
    }

    #[test]
    fn scoring_pass_leaves_the_model_alone() {
        let mut model = ModelInfo::new(&params(), 2, 2);
        model.randomize_weights(2).unwrap();
        let before = model.weights(0).as_dense_row().unwrap().to_vec();
        let report = Pass::new(&model, InputInfo::numeric(2))
            .training(false)
            .run(&rows())
            .unwrap();
        assert_eq!(report.rows, 40);
        assert_eq!(model.processed(), 0);
        assert_eq!(before, model.weights(0).as_dense_row().unwrap().to_vec());
    }

    #[test]
    fn later_passes_score_better() {
        let mut model = ModelInfo::new(&params(), 2, 2);
        model.randomize_weights(4).unwrap();
        let first = Pass::new(&model, InputInfo::numeric(2)).run(&rows()).unwrap();
        for seed in 0..5 {
            Pass::new(&model, InputInfo::numeric(2)).seed(seed).run(&rows()).unwrap();
        }
        let last = Pass::new(&model, InputInfo::numeric(2))
            .training(false)
            .run(&rows())
            .unwrap();
        assert!(last.mean_loss < first.mean_loss);
    }

    #[test]
    fn unstable_model_stops_the_pass() {
        let model = ModelInfo::new(&params(), 2, 2);
        model.set_unstable();
        let report = Pass::new(&model, InputInfo::numeric(2)).run(&rows()).unwrap();
        assert_eq!(report.rows, 0);
        assert!(report.unstable);
        assert_eq!(report.mean_loss, 0.0);
    }

    #[test]
    fn log_loss_is_clamped() {
        let loss = row_loss(Loss::CrossEntropy, false, &[0.0, 1.0], Target::Class(0)).unwrap();
        assert!((loss - 34.538776).abs() < 1e-3);
        assert_eq!(
            row_loss(Loss::MeanSquare, true, &[3.0], Target::Value(1.0)).unwrap(),
            4.0
        );
    }

    #[test]
    fn scoring_rejects_mismatched_targets() {
        let mut model = ModelInfo::new(&params(), 2, 2);
        model.randomize_weights(2).unwrap();
        let scoring = || Pass::new(&model, InputInfo::numeric(2)).training(false);

        let past_last_output = [TrainingRow::new(vec![0.5, -0.5], Target::Class(5))];
        assert!(matches!(scoring().run(&past_last_output), Err(Error::InvalidData(_))));

        let mixed = [
            TrainingRow::new(vec![0.5, -0.5], Target::Class(0)),
            TrainingRow::new(vec![0.5, -0.5], Target::Value(0.3)),
        ];
        assert!(matches!(scoring().run(&mixed), Err(Error::InvalidData(_))));

        let p = Params {
            loss: Loss::MeanSquare,
            ..params()
        };
        let mut regression_model = ModelInfo::new(&p, 2, 1);
        regression_model.randomize_weights(2).unwrap();
        let regression = [
            TrainingRow::new(vec![0.5, -0.5], Target::Value(0.3)),
            TrainingRow::new(vec![0.5, -0.5], Target::Class(0)),
        ];
        let report = Pass::new(&regression_model, InputInfo::numeric(2))
            .training(false)
            .run(&regression);
        assert!(matches!(report, Err(Error::InvalidData(_))));
    }
}
