//! Neuron layers.
//!
//! A [`Neurons`] value is one depth position of a worker's network. It is
//! cheap to build: the weights it trains belong to the shared
//! [`ModelInfo`] and are only borrowed once the layer is wired by
//! [`Neurons::init`]. The previous layer is handed to every forward and
//! backward call by the owning [`crate::feed_forward::Chain`].

mod backprop;
mod hidden;
mod input;
mod output;

use crate::activator::Activator;
use crate::data::InputInfo;
use crate::dropout::Dropout;
use crate::error::{Error, Result};
use crate::kernels::GemvKernel;
use crate::matrix::{DenseRowMatrix, Matrix};
use crate::model::ModelInfo;
use crate::params::{Activation, Params};
use crate::vector::{DenseVector, SparseVector, Vector, VectorLayout};

use std::fmt;
use tracing::debug;

/// What a layer computes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LayerKind {
    /// Feature row in, no weights.
    Input,
    Hidden { activator: Activator, dropout: bool },
    /// Classification output.
    Softmax,
    /// Regression output, a single unit.
    Linear,
}

impl LayerKind {
    pub fn hidden(activation: Activation) -> Self {
        LayerKind::Hidden {
            activator: activation.activator(),
            dropout: activation.has_dropout(),
        }
    }

    fn supports_dropout(&self) -> bool {
        match self {
            LayerKind::Input => true,
            LayerKind::Hidden { dropout, .. } => *dropout,
            LayerKind::Softmax | LayerKind::Linear => false,
        }
    }
}

/// Borrowed views into the shared model for the incoming connections.
struct Wiring<'a> {
    minfo: &'a ModelInfo,
    w: &'a Matrix,
    b: &'a DenseVector,
    wm: Option<&'a DenseRowMatrix>,
    bm: Option<&'a DenseVector>,
    ada: Option<&'a DenseVector>,
    kernel: GemvKernel,
}

pub struct Neurons<'a> {
    kind: LayerKind,
    units: usize,
    index: usize,
    /// Private copy of the global parameters, with the depth-decayed rate.
    params: Params,
    a: Vector,
    e: Option<DenseVector>,
    dropout: Option<Dropout>,
    /// Input layer only.
    info: Option<InputInfo>,
    /// Input layer only, in sparse mode: the dense values `a` is projected
    /// from.
    scratch: Option<DenseVector>,
    wiring: Option<Wiring<'a>>,
}

impl<'a> Neurons<'a> {
    fn new(kind: LayerKind, units: usize, info: Option<InputInfo>) -> Self {
        Neurons {
            kind,
            units,
            index: 0,
            params: Params::default(),
            a: Vector::Dense(DenseVector::zeros(units)),
            e: None,
            dropout: None,
            info,
            scratch: None,
            wiring: None,
        }
    }

    pub fn input(info: InputInfo) -> Self {
        let units = info.units();
        Neurons::new(LayerKind::Input, units, Some(info))
    }

    pub fn hidden(activation: Activation, units: usize) -> Self {
        Neurons::new(LayerKind::hidden(activation), units, None)
    }

    pub fn softmax(units: usize) -> Self {
        Neurons::new(LayerKind::Softmax, units, None)
    }

    pub fn linear() -> Self {
        Neurons::new(LayerKind::Linear, 1, None)
    }

    /// Wires the layer at depth `index` to its predecessor and to the shared
    /// model.
    ///
    /// Arguments:
    ///
    ///  * `previous` - the layer at `index - 1`; `None` only for the input
    ///                 layer.
    ///  * `params` - the global parameters, copied and decayed by depth.
    ///  * `minfo` - the model holding the incoming weights at `index - 1`.
    ///  * `training` - whether dropout masks are needed.
    pub fn init(
        &mut self,
        previous: Option<&Neurons<'a>>,
        index: usize,
        params: &Params,
        minfo: &'a ModelInfo,
        training: bool,
    ) -> Result<()> {
        if index > minfo.connections() {
            return Err(Error::invalid_config(format!(
                "layer {} is past the model's {} connections",
                index,
                minfo.connections()
            )));
        }
        self.index = index;
        self.params = params.clone();
        if index > 0 {
            self.params.rate *= self.params.rate_decay.powi(index as i32 - 1);
        }

        self.a = Vector::Dense(DenseVector::zeros(self.units));
        self.scratch = None;
        if self.kind == LayerKind::Input && self.params.sparse_input {
            let scratch = DenseVector::zeros(self.units);
            self.a = Vector::Sparse(SparseVector::from_dense(&scratch));
            self.scratch = Some(scratch);
        }
        self.e = match self.kind {
            LayerKind::Hidden { .. } => Some(DenseVector::zeros(self.units)),
            _ => None,
        };

        self.dropout = None;
        if training && self.kind.supports_dropout() {
            let ratio = match self.kind {
                LayerKind::Input => self.params.input_dropout_ratio,
                _ => self.params.hidden_dropout_ratio(index.saturating_sub(1)),
            };
            self.dropout = Some(Dropout::new(self.units, ratio));
        }

        self.wiring = None;
        if self.kind != LayerKind::Input {
            let previous = previous.filter(|_| index > 0).ok_or_else(|| {
                Error::invalid_config(format!("layer {} has no previous layer", index))
            })?;
            let w = minfo.weights(index - 1);
            if (w.rows(), w.cols()) != (self.units, previous.units) {
                return Err(Error::InvalidData(format!(
                    "layer {} expects {}x{} incoming weights, model has {}x{}",
                    index,
                    self.units,
                    previous.units,
                    w.rows(),
                    w.cols()
                )));
            }
            self.wiring = Some(Wiring {
                minfo,
                w,
                b: minfo.biases(index - 1),
                wm: minfo.weights_momenta(index - 1),
                bm: minfo.biases_momenta(index - 1),
                ada: minfo.ada(index - 1),
                kernel: GemvKernel::select(w.layout(), previous.activation_layout()),
            });
        }

        debug!(
            index,
            kind = ?self.kind,
            units = self.units,
            rate = self.params.rate,
            dropout = self.dropout.is_some(),
            "wired layer"
        );
        self.sanity_check(training)
    }

    /// Checks the wiring invariants: exactly one of momentum or ADADELTA state
    /// (or neither), and dropout present exactly when it will be used.
    fn sanity_check(&self, training: bool) -> Result<()> {
        match (&self.kind, &self.wiring) {
            (LayerKind::Input, None) => {
                if training && self.dropout.is_none() {
                    return Err(Error::invalid_config("training input layer without dropout mask"));
                }
                Ok(())
            }
            (LayerKind::Input, Some(_)) => Err(Error::invalid_config("input layer has incoming weights")),
            (_, None) => Err(Error::invalid_config(format!("layer {} is not wired", self.index))),
            (kind, Some(wiring)) => {
                if wiring.minfo.has_momenta()
                    && (wiring.wm.is_none() || wiring.bm.is_none() || wiring.ada.is_some())
                {
                    return Err(Error::invalid_config("momentum mode needs momenta and no ADADELTA state"));
                }
                if wiring.minfo.adaptive_rate() {
                    if self.params.rho <= 0.0 {
                        return Err(Error::invalid_config("rho must be > 0 if epsilon is > 0"));
                    }
                    if self.params.epsilon <= 0.0 {
                        return Err(Error::invalid_config("epsilon must be > 0 if rho is > 0"));
                    }
                    if wiring.ada.is_none() || wiring.wm.is_some() || wiring.bm.is_some() {
                        return Err(Error::invalid_config("ADADELTA mode needs accumulators and no momenta"));
                    }
                }
                if training && kind.supports_dropout() && self.dropout.is_none() {
                    return Err(Error::invalid_config(format!(
                        "dropout layer {} has no mask",
                        self.index
                    )));
                }
                Ok(())
            }
        }
    }

    /// Forward propagation from `previous`.
    pub fn fprop(&mut self, previous: &Neurons<'a>, seed: u64, training: bool) -> Result<()> {
        match self.kind {
            LayerKind::Input => Err(Error::unsupported("the input layer is set, not propagated")),
            LayerKind::Hidden { activator, dropout } => {
                self.fprop_hidden(previous, seed, training, activator, dropout)
            }
            LayerKind::Softmax => self.fprop_softmax(previous),
            LayerKind::Linear => self.fprop_linear(previous),
        }
    }

    /// Backpropagation for a hidden layer; reads this layer's error and
    /// deposits into `previous`'s.
    pub fn bprop(&self, previous: &Neurons<'a>) -> Result<()> {
        match self.kind {
            LayerKind::Hidden { activator, .. } => self.bprop_hidden(previous, activator),
            _ => Err(Error::unsupported(format!(
                "{:?} layers backpropagate from a target",
                self.kind
            ))),
        }
    }

    /// Learning rate after `n` training examples.
    pub fn rate(&self, n: u64) -> f32 {
        self.params.rate(n)
    }

    /// Momentum after `n` training examples.
    pub fn momentum(&self, n: u64) -> f32 {
        self.params.momentum(n)
    }

    pub fn kind(&self) -> LayerKind {
        self.kind
    }

    pub fn units(&self) -> usize {
        self.units
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn activation(&self) -> &Vector {
        &self.a
    }

    pub fn activation_layout(&self) -> VectorLayout {
        match self.kind {
            LayerKind::Input if self.params.sparse_input => VectorLayout::Sparse,
            _ => VectorLayout::Dense,
        }
    }

    pub fn error(&self) -> Option<&DenseVector> {
        self.e.as_ref()
    }

    pub fn dropout(&self) -> Option<&Dropout> {
        self.dropout.as_ref()
    }

    pub fn kernel(&self) -> Option<GemvKernel> {
        self.wiring.as_ref().map(|w| w.kernel)
    }

    fn wired(&self) -> Result<&Wiring<'a>> {
        self.wiring
            .as_ref()
            .ok_or_else(|| Error::invalid_config(format!("layer {} is not wired", self.index)))
    }

    /// The dense activation every non-input layer computes into.
    fn dense_activation(&self) -> Result<&DenseVector> {
        self.a
            .as_dense()
            .ok_or_else(|| Error::unsupported("layer activation is not dense"))
    }
}

impl<'a> fmt::Debug for Neurons<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Neurons")
            .field("kind", &self.kind)
            .field("units", &self.units)
            .field("index", &self.index)
            .field("rate", &self.params.rate)
            .field("dropout", &self.dropout)
            .finish()
    }
}
