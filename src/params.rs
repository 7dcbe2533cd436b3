//! Training hyperparameters.
//!
//! Every layer takes its own copy of [`Params`] when it is wired, and may
//! modify it (the learning rate is decayed by depth).

use crate::activator::Activator;
use crate::error::{Error, Result};

use serde::{Deserialize, Serialize};

/// Hidden layer activation, optionally with dropout.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Activation {
    Tanh,
    TanhWithDropout,
    Rectifier,
    RectifierWithDropout,
    Maxout,
    MaxoutWithDropout,
}

impl Activation {
    pub fn activator(self) -> Activator {
        match self {
            Activation::Tanh | Activation::TanhWithDropout => Activator::Tanh,
            Activation::Rectifier | Activation::RectifierWithDropout => Activator::Rectifier,
            Activation::Maxout | Activation::MaxoutWithDropout => Activator::Maxout,
        }
    }

    pub fn has_dropout(self) -> bool {
        matches!(
            self,
            Activation::TanhWithDropout
                | Activation::RectifierWithDropout
                | Activation::MaxoutWithDropout
        )
    }
}

/// Loss function minimized by the output layer.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Loss {
    CrossEntropy,
    MeanSquare,
}

/// How [`crate::model::ModelInfo::randomize_weights`] draws initial weights.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum InitialWeightDistribution {
    /// `U(-r, r)` with `r = sqrt(6 / (fan_in + fan_out))`.
    UniformAdaptive,
    /// `U(-scale, scale)`.
    Uniform(f64),
    /// `N(0, stddev)`.
    Normal(f64),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Params {
    /// Units per hidden layer.
    pub hidden: Vec<usize>,
    pub activation: Activation,
    pub loss: Loss,
    pub initial_weight_distribution: InitialWeightDistribution,
    pub seed: u64,

    pub rate: f64,
    pub rate_annealing: f64,
    /// Per-depth learning rate multiplier: layer `i` uses `rate * rate_decay^(i-1)`.
    pub rate_decay: f64,

    pub momentum_start: f64,
    /// Number of training examples over which momentum ramps up.
    pub momentum_ramp: f64,
    pub momentum_stable: f64,
    pub nesterov_accelerated_gradient: bool,

    /// ADADELTA. Replaces the learning rate and momentum settings.
    pub adaptive_rate: bool,
    pub rho: f64,
    pub epsilon: f64,

    pub l1: f64,
    pub l2: f64,
    /// Upper bound on the sum of squared incoming weights of a unit.
    pub max_w2: Option<f64>,

    /// Fraction of input units dropped per training example.
    pub input_dropout_ratio: f64,
    /// Fraction of units dropped per hidden layer; missing entries use 0.5.
    pub hidden_dropout_ratios: Vec<f64>,

    /// Skip weight updates whose gradient contribution is exactly zero.
    pub fast_mode: bool,
    /// Hand the input activation downstream as a sparse snapshot.
    pub sparse_input: bool,
}

impl Default for Params {
    fn default() -> Self {
        Params {
            hidden: vec![200, 200],
            activation: Activation::Tanh,
            loss: Loss::CrossEntropy,
            initial_weight_distribution: InitialWeightDistribution::UniformAdaptive,
            seed: 0x2B99_2DDF_A232_49D6,
            rate: 0.005,
            rate_annealing: 1e-6,
            rate_decay: 1.0,
            momentum_start: 0.0,
            momentum_ramp: 1e6,
            momentum_stable: 0.0,
            nesterov_accelerated_gradient: true,
            adaptive_rate: false,
            rho: 0.99,
            epsilon: 1e-8,
            l1: 0.0,
            l2: 0.0,
            max_w2: None,
            input_dropout_ratio: 0.0,
            hidden_dropout_ratios: Vec::new(),
            fast_mode: true,
            sparse_input: false,
        }
    }
}

impl Params {
    /// Parses parameters from JSON. Absent fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let params: Params = serde_json::from_str(json)?;
        params.validate()?;
        Ok(params)
    }

    /// Learning rate after `n` training examples.
    pub fn rate(&self, n: u64) -> f32 {
        (self.rate / (1.0 + self.rate_annealing * n as f64)) as f32
    }

    /// Momentum after `n` training examples: a linear ramp from
    /// `momentum_start` to `momentum_stable` over `momentum_ramp` examples.
    pub fn momentum(&self, n: u64) -> f32 {
        let mut m = self.momentum_start;
        if self.momentum_ramp > 0.0 {
            let n = n as f64;
            if n >= self.momentum_ramp {
                m = self.momentum_stable;
            } else {
                m += (self.momentum_stable - self.momentum_start) * n / self.momentum_ramp;
            }
        }
        m as f32
    }

    /// Whether momentum arrays are needed at all.
    pub fn has_momenta(&self) -> bool {
        !self.adaptive_rate && (self.momentum_start != 0.0 || self.momentum_stable != 0.0)
    }

    pub fn hidden_dropout_ratio(&self, hidden_layer: usize) -> f64 {
        self.hidden_dropout_ratios
            .get(hidden_layer)
            .copied()
            .unwrap_or(0.5)
    }

    /// Rejects settings no layer could train with.
    pub fn validate(&self) -> Result<()> {
        if self.hidden.iter().any(|&units| units == 0) {
            return Err(Error::invalid_config("hidden layers must have at least one unit"));
        }
        if !(self.rate.is_finite() && self.rate >= 0.0) {
            return Err(Error::invalid_config(format!("rate must be finite and >= 0, got {}", self.rate)));
        }
        if self.rate_annealing < 0.0 || self.rate_decay <= 0.0 {
            return Err(Error::invalid_config("rate_annealing must be >= 0 and rate_decay > 0"));
        }
        for &m in &[self.momentum_start, self.momentum_stable] {
            if !(0.0..1.0).contains(&m) {
                return Err(Error::invalid_config(format!("momentum must be in [0, 1), got {}", m)));
            }
        }
        if self.adaptive_rate && !(self.rho > 0.0 && self.epsilon > 0.0) {
            return Err(Error::invalid_config("rho and epsilon must both be > 0 for adaptive rate"));
        }
        if self.l1 < 0.0 || self.l2 < 0.0 {
            return Err(Error::invalid_config("l1 and l2 must be >= 0"));
        }
        if let Some(max_w2) = self.max_w2 {
            if !(max_w2 > 0.0) {
                return Err(Error::invalid_config(format!("max_w2 must be > 0, got {}", max_w2)));
            }
        }
        let ratios = self.hidden_dropout_ratios.iter().chain(Some(&self.input_dropout_ratio));
        for &ratio in ratios {
            if !(0.0..1.0).contains(&ratio) {
                return Err(Error::invalid_config(format!("dropout ratio must be in [0, 1), got {}", ratio)));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_anneals() {
        let params = Params {
            rate: 0.1,
            rate_annealing: 0.5,
            ..Params::default()
        };
        assert_eq!(params.rate(0), 0.1);
        assert!((params.rate(2) - 0.05).abs() < 1e-7);
    }

    #[test]
    fn momentum_ramps_then_holds() {
        let params = Params {
            momentum_start: 0.5,
            momentum_stable: 0.9,
            momentum_ramp: 100.0,
            ..Params::default()
        };
        assert_eq!(params.momentum(0), 0.5);
        assert!((params.momentum(50) - 0.7).abs() < 1e-6);
        assert!((params.momentum(100) - 0.9).abs() < 1e-6);
        assert!((params.momentum(1_000_000) - 0.9).abs() < 1e-6);
    }

    #[test]
    fn momentum_without_ramp_is_start_value() {
        let params = Params {
            momentum_start: 0.3,
            momentum_stable: 0.9,
            momentum_ramp: 0.0,
            ..Params::default()
        };
        assert!((params.momentum(10) - 0.3).abs() < 1e-7);
    }

    #[test]
    fn momenta_are_disabled_by_adaptive_rate() {
        let mut params = Params {
            momentum_stable: 0.9,
            ..Params::default()
        };
        assert!(params.has_momenta());
        params.adaptive_rate = true;
        assert!(!params.has_momenta());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let params = Params::from_json(
            r#"{"hidden": [3], "activation": "RectifierWithDropout", "max_w2": 10.0}"#,
        )
        .unwrap();
        assert_eq!(params.hidden, vec![3]);
        assert_eq!(params.activation, Activation::RectifierWithDropout);
        assert_eq!(params.max_w2, Some(10.0));
        assert_eq!(params.rho, 0.99);
        assert_eq!(params.hidden_dropout_ratio(0), 0.5);
    }

    #[test]
    fn json_round_trips() {
        let params = Params {
            initial_weight_distribution: InitialWeightDistribution::Normal(0.1),
            ..Params::default()
        };
        let json = serde_json::to_string(&params).unwrap();
        assert_eq!(Params::from_json(&json).unwrap(), params);
    }

    #[test]
    fn malformed_json_is_reported() {
        assert!(matches!(Params::from_json("{\"rate\": \"fast\"}"), Err(Error::Config(_))));
    }

    #[test]
    fn adaptive_rate_needs_positive_rho_and_epsilon() {
        let params = Params {
            adaptive_rate: true,
            epsilon: 0.0,
            ..Params::default()
        };
        assert!(matches!(params.validate(), Err(Error::InvalidConfig(_))));
    }
}
