//! Output layers and their loss-seeded gradients.

use super::{LayerKind, Neurons};
use crate::error::{Error, Result};
use crate::matrix::Matrix;
use crate::params::Loss;

use tracing::warn;

impl<'a> Neurons<'a> {
    /// `a = softmax(W * x + b)`, shifted by the largest logit before
    /// exponentiating.
    pub(super) fn fprop_softmax(&self, previous: &Neurons<'a>) -> Result<()> {
        let wiring = self.wired()?;
        let a = self.dense_activation()?;
        wiring.kernel.run(a, wiring.w, &previous.a, wiring.b, None)?;

        let max = a.max_value();
        let mut scale = 0f32;
        for cell in a.raw() {
            cell.set((cell.get() - max).exp());
            scale += cell.get();
        }
        for cell in a.raw() {
            if cell.get().is_nan() {
                warn!(layer = self.index, "softmax predicted NaN");
                return Err(Error::NumericalInstability("predicted NaN".to_string()));
            }
            cell.set(cell.get() / scale);
        }
        Ok(())
    }

    /// `a = W * x + b` over dense row-major weights.
    pub(super) fn fprop_linear(&self, previous: &Neurons<'a>) -> Result<()> {
        let wiring = self.wired()?;
        if !matches!(wiring.w, Matrix::DenseRow(_)) {
            return Err(Error::unsupported("the linear output only supports row-major weights"));
        }
        wiring
            .kernel
            .run(self.dense_activation()?, wiring.w, &previous.a, wiring.b, None)
    }

    /// Backpropagates class `target` through a softmax output.
    pub fn bprop_classification(&self, previous: &Neurons<'a>, target: usize) -> Result<()> {
        if self.kind != LayerKind::Softmax {
            return Err(Error::unsupported("class targets need a softmax output"));
        }
        let a = self.dense_activation()?;
        if target >= a.size() {
            return Err(Error::InvalidData(format!(
                "class {} is out of range for {} outputs",
                target,
                a.size()
            )));
        }
        let processed = self.wired()?.minfo.processed();
        let m = self.momentum(processed);
        let r = self.rate(processed) * (1.0 - m);
        for u in 0..a.size() {
            let t = if u == target { 1.0 } else { 0.0 };
            let y = a.get(u);
            let g = match self.params.loss {
                Loss::CrossEntropy => t - y,
                Loss::MeanSquare => (t - y) * (1.0 - y) * y,
            };
            self.bprop_unit(previous, u, g, r, m)?;
        }
        Ok(())
    }

    /// Backpropagates a real-valued `target` through the linear output.
    pub fn bprop_regression(&self, previous: &Neurons<'a>, target: f32) -> Result<()> {
        if self.kind != LayerKind::Linear {
            return Err(Error::unsupported("real targets need a linear output"));
        }
        if self.params.loss != Loss::MeanSquare {
            return Err(Error::unsupported(
                "regression is only implemented for mean square error",
            ));
        }
        let g = target - self.dense_activation()?.get(0);
        let processed = self.wired()?.minfo.processed();
        let m = self.momentum(processed);
        let r = self.rate(processed) * (1.0 - m);
        self.bprop_unit(previous, 0, g, r, m)
    }
}
