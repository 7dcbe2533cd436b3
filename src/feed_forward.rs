//! A worker's private chain of layers over a shared model.
//!
//! # Example
//!
//! Train a tiny classifier on one example and score it:
//!
//! ```
//! # use sgd_neurons::data::{InputInfo, Target, TrainingRow};
//! # use sgd_neurons::feed_forward::Chain;
//! # use sgd_neurons::model::ModelInfo;
//! # use sgd_neurons::params::Params;
//! let params = Params { hidden: vec![3], rate: 0.1, ..Params::default() };
//! let mut model = ModelInfo::new(&params, 2, 2);
//! model.randomize_weights(7).unwrap();
//!
//! let mut chain = Chain::classifier(&model, InputInfo::numeric(2), true).unwrap();
//! let row = TrainingRow::new(vec![0.5, -0.5], Target::Class(0));
//! chain.train_example(1, &row).unwrap();
//! assert_eq!(model.processed(), 1);
//!
//! let p = chain.predict(&row.features).unwrap();
//! assert!((p.iter().sum::<f32>() - 1.0).abs() < 1e-5);
//! ```

use crate::data::{InputInfo, Target, TrainingRow};
use crate::error::{Error, Result};
use crate::layers::Neurons;
use crate::model::ModelInfo;
use crate::utils::{Back, Front, ZeroOut};
use crate::vector::Vector;

/// Input layer, `params.hidden` hidden layers and one output layer, wired
/// to a shared [`ModelInfo`].
#[derive(Debug)]
pub struct Chain<'a> {
    minfo: &'a ModelInfo,
    layers: Vec<Neurons<'a>>,
    training: bool,
}

impl<'a> Chain<'a> {
    /// A chain ending in a softmax over the model's output units.
    pub fn classifier(minfo: &'a ModelInfo, info: InputInfo, training: bool) -> Result<Self> {
        let outputs = *minfo.units().back();
        Chain::new(minfo, info, Neurons::softmax(outputs), training)
    }

    /// A chain ending in a single linear unit.
    pub fn regressor(minfo: &'a ModelInfo, info: InputInfo, training: bool) -> Result<Self> {
        Chain::new(minfo, info, Neurons::linear(), training)
    }

    fn new(minfo: &'a ModelInfo, info: InputInfo, output: Neurons<'a>, training: bool) -> Result<Self> {
        let params = minfo.params();
        let mut layers = Vec::with_capacity(params.hidden.len() + 2);
        layers.push(Neurons::input(info));
        for &units in &params.hidden {
            layers.push(Neurons::hidden(params.activation, units));
        }
        layers.push(output);

        let mut chain = Chain {
            minfo,
            layers,
            training,
        };
        chain.wire()?;
        Ok(chain)
    }

    /// Initializes every layer in order, each against its predecessor.
    fn wire(&mut self) -> Result<()> {
        let minfo = self.minfo;
        let params = minfo.params();
        for i in 0..self.layers.len() {
            let (before, rest) = self.layers.split_at_mut(i);
            rest.mut_front()
                .init(before.last(), i, params, minfo, self.training)?;
        }
        Ok(())
    }

    pub fn layers(&self) -> &[Neurons<'a>] {
        &self.layers
    }

    pub fn is_training(&self) -> bool {
        self.training
    }

    /// The output layer's activation.
    pub fn output(&self) -> &Vector {
        self.layers.back().activation()
    }

    /// Sets the input layer from a raw feature row.
    pub fn set_input(&mut self, seed: u64, features: &[f64]) -> Result<()> {
        self.layers.mut_front().set_input(seed, features)
    }

    /// Forward propagation through every layer after the input.
    pub fn fprop(&mut self, seed: u64, training: bool) -> Result<()> {
        for i in 1..self.layers.len() {
            let (previous, layer) = mut_layers(&mut self.layers, i - 1);
            layer.fprop(previous, seed, training)?;
        }
        Ok(())
    }

    /// Backpropagates `target` from the output down to the first hidden
    /// layer, updating the shared model on the way.
    pub fn bprop(&self, target: Target) -> Result<()> {
        for layer in &self.layers {
            if let Some(e) = layer.error() {
                e.zero_out();
            }
        }
        let last = self.layers.len() - 1;
        let (previous, output) = io_layers(&self.layers, last - 1);
        match target {
            Target::Class(class) => output.bprop_classification(previous, class)?,
            Target::Value(value) => output.bprop_regression(previous, value)?,
        }
        for i in (1..last).rev() {
            let (previous, layer) = io_layers(&self.layers, i - 1);
            layer.bprop(previous)?;
        }
        Ok(())
    }

    /// One stochastic gradient step on `row`.
    pub fn train_example(&mut self, seed: u64, row: &TrainingRow) -> Result<()> {
        if !self.training {
            return Err(Error::invalid_config("cannot train with a scoring chain"));
        }
        self.set_input(seed, &row.features)?;
        self.fprop(seed, true)?;
        self.bprop(row.target)?;
        self.minfo.add_processed(1);
        Ok(())
    }

    /// Scores a raw feature row without dropout.
    pub fn predict(&mut self, features: &[f64]) -> Result<Vec<f32>> {
        self.layers.mut_front().set_input_with(0, features, false)?;
        self.fprop(0, false)?;
        Ok(self.output().to_vec())
    }
}

/// Gets a layer and its successor.
fn io_layers<'s, 'a>(layers: &'s [Neurons<'a>], layer: usize) -> (&'s Neurons<'a>, &'s Neurons<'a>) {
    let (before, after) = layers[layer..].split_at(1);
    (&before[0], &after[0])
}

fn mut_layers<'s, 'a>(
    layers: &'s mut [Neurons<'a>],
    layer: usize,
) -> (&'s Neurons<'a>, &'s mut Neurons<'a>) {
    let (before, after) = layers[layer..].split_at_mut(1);
    (&before[0], &mut after[0])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::LayerKind;
    use crate::params::{Activation, Loss, Params};

    fn params() -> Params {
        Params {
            hidden: vec![4, 3],
            activation: Activation::Rectifier,
            rate: 0.05,
            ..Params::default()
        }
    }

    #[test]
    fn layers_follow_the_model() {
        let p = params();
        let minfo = ModelInfo::new(&p, 2, 3);
        let chain = Chain::classifier(&minfo, InputInfo::numeric(2), false).unwrap();
        let kinds: Vec<LayerKind> = chain.layers().iter().map(Neurons::kind).collect();
        assert_eq!(kinds[0], LayerKind::Input);
        assert_eq!(kinds[1], LayerKind::hidden(Activation::Rectifier));
        assert_eq!(kinds[3], LayerKind::Softmax);
        assert_eq!(chain.output().size(), 3);
    }

    #[test]
    fn input_width_must_match() {
        let p = params();
        let minfo = ModelInfo::new(&p, 2, 3);
        assert!(Chain::classifier(&minfo, InputInfo::numeric(5), false).is_err());
    }

    #[test]
    fn scoring_chain_cannot_train() {
        let p = params();
        let minfo = ModelInfo::new(&p, 2, 3);
        let mut chain = Chain::classifier(&minfo, InputInfo::numeric(2), false).unwrap();
        let row = TrainingRow::new(vec![1.0, 2.0], Target::Class(0));
        assert!(matches!(chain.train_example(0, &row), Err(Error::InvalidConfig(_))));
        assert_eq!(minfo.processed(), 0);
    }

    #[test]
    fn training_reduces_the_loss() {
        let p = Params {
            hidden: vec![8],
            activation: Activation::Tanh,
            rate: 0.1,
            rate_annealing: 0.0,
            ..Params::default()
        };
        let mut minfo = ModelInfo::new(&p, 2, 2);
        minfo.randomize_weights(5).unwrap();
        let mut chain = Chain::classifier(&minfo, InputInfo::numeric(2), true).unwrap();
        let rows = [
            TrainingRow::new(vec![1.0, 1.0], Target::Class(0)),
            TrainingRow::new(vec![-1.0, -1.0], Target::Class(1)),
        ];
        let loss = |chain: &mut Chain| -> f32 {
            rows.iter()
                .map(|r| match r.target {
                    Target::Class(c) => -chain.predict(&r.features).unwrap()[c].ln(),
                    Target::Value(_) => unreachable!(),
                })
                .sum()
        };
        let before = loss(&mut chain);
        for step in 0..200 {
            chain.train_example(step, &rows[step as usize % 2]).unwrap();
        }
        assert!(loss(&mut chain) < before / 2.0);
        assert_eq!(minfo.processed(), 200);
    }

    #[test]
    fn regression_tracks_the_target() {
        let p = Params {
            hidden: vec![4],
            activation: Activation::Tanh,
            loss: Loss::MeanSquare,
            rate: 0.05,
            rate_annealing: 0.0,
            ..Params::default()
        };
        let mut minfo = ModelInfo::new(&p, 1, 1);
        minfo.randomize_weights(9).unwrap();
        let mut chain = Chain::regressor(&minfo, InputInfo::numeric(1), true).unwrap();
        let row = TrainingRow::new(vec![0.5], Target::Value(0.8));
        for step in 0..300 {
            chain.train_example(step, &row).unwrap();
        }
        let y = chain.predict(&row.features).unwrap()[0];
        assert!((y - 0.8).abs() < 0.05, "{}", y);
    }

    #[test]
    fn hidden_errors_are_cleared_between_examples() {
        let p = params();
        let mut minfo = ModelInfo::new(&p, 2, 3);
        minfo.randomize_weights(1).unwrap();
        let mut chain = Chain::classifier(&minfo, InputInfo::numeric(2), true).unwrap();
        chain.set_input(0, &[1.0, -1.0]).unwrap();
        chain.fprop(0, true).unwrap();
        chain.bprop(Target::Class(2)).unwrap();
        let first = chain.layers()[2].error().unwrap().to_vec();

        // Same activations, same output error: a fresh bprop must not add to
        // the previous one.
        chain.layers()[2].error().unwrap().fill(100.0);
        chain.bprop(Target::Class(2)).unwrap();
        let second = chain.layers()[2].error().unwrap().to_vec();
        assert!(second.iter().all(|v| v.abs() < 50.0));
        assert_eq!(first.len(), second.len());
    }
}
