//! The per-unit weight update shared by every trainable layer.

use super::{Neurons, Wiring};
use crate::error::{Error, Result};
use crate::matrix::{DenseRowMatrix, Matrix};
use crate::utils::sum_squares;
use crate::vector::{DenseVector, HogwildF32, Vector};

/// Hyperparameters of one weight update, read once per unit.
struct Step<'w> {
    l1: f32,
    l2: f32,
    rho: f32,
    eps: f32,
    nesterov: bool,
    momentum: f32,
    wm: Option<&'w DenseRowMatrix>,
    ada: Option<&'w DenseVector>,
}

impl<'w> Step<'w> {
    /// Applies one gradient step to weight `w[row, col]`, whose flat index
    /// is `idx`.
    #[inline(always)]
    fn apply(&self, cell: &HogwildF32, row: usize, col: usize, idx: usize, grad: f32, rate: f32) {
        if let Some(ada) = self.ada {
            let acc = ada.raw();
            let (acc_dx, acc_g) = (&acc[2 * idx], &acc[2 * idx + 1]);
            let grad2 = grad * grad;
            acc_g.set(self.rho * acc_g.get() + (1.0 - self.rho) * grad2);
            let rate = (acc_dx.get() + self.eps).sqrt() / (acc_g.get() + self.eps).sqrt();
            acc_dx.set(self.rho * acc_dx.get() + (1.0 - self.rho) * rate * rate * grad2);
            cell.add(rate * grad);
        } else if !self.nesterov {
            let delta = rate * grad;
            cell.add(delta);
            if let Some(wm) = self.wm {
                cell.add(self.momentum * wm.get(row, col));
                wm.set(row, col, delta);
            }
        } else {
            let mut velocity = grad;
            if let Some(wm) = self.wm {
                let m = &wm.row(row)[col];
                m.set(m.get() * self.momentum + grad);
                velocity = m.get();
            }
            cell.add(rate * velocity);
        }
    }

    /// `grad = g * a - sign(w) * l1 - w * l2`
    #[inline(always)]
    fn gradient(&self, g: f32, prev_a: f32, weight: f32) -> f32 {
        g * prev_a - sign(weight) * self.l1 - weight * self.l2
    }
}

/// Sign with `sign(0) == 0`, so unset weights see no L1 pull.
#[inline(always)]
fn sign(x: f32) -> f32 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}

impl<'a> Neurons<'a> {
    /// Backpropagates unit `row` given `g = dE/dnet` for it: deposits the
    /// error into `previous`, updates the incoming weights and the bias.
    pub(super) fn bprop_unit(
        &self,
        previous: &Neurons<'a>,
        row: usize,
        g: f32,
        rate: f32,
        momentum: f32,
    ) -> Result<()> {
        let wiring = self.wired()?;
        let p = &self.params;
        let nothing_else_to_update = !wiring.minfo.adaptive_rate()
            && !wiring.minfo.has_momenta()
            && p.l1 == 0.0
            && p.l2 == 0.0;
        if (p.fast_mode || nothing_else_to_update) && g == 0.0 {
            return Ok(());
        }

        let w = dense_row_weights(wiring)?;
        let step = Step {
            l1: p.l1 as f32,
            l2: p.l2 as f32,
            rho: p.rho as f32,
            eps: p.epsilon as f32,
            nesterov: p.nesterov_accelerated_gradient,
            momentum,
            wm: wiring.wm,
            ada: wiring.ada,
        };
        let prev_e = previous.error();
        let cols = w.cols();
        let weights = w.row(row);

        match &previous.a {
            Vector::Dense(prev_a) => {
                for (col, cell) in weights.iter().enumerate() {
                    let weight = cell.get();
                    if let Some(e) = prev_e {
                        e.add(col, g * weight);
                    }
                    let a = prev_a.get(col);
                    if p.fast_mode && a == 0.0 {
                        continue;
                    }
                    step.apply(cell, row, col, row * cols + col, step.gradient(g, a, weight), rate);
                }
            }
            // Only the stored entries can contribute, and they are non-zero.
            Vector::Sparse(prev_a) => {
                for (col, a) in prev_a.iter() {
                    let cell = &weights[col];
                    let weight = cell.get();
                    if let Some(e) = prev_e {
                        e.add(col, g * weight);
                    }
                    step.apply(cell, row, col, row * cols + col, step.gradient(g, a, weight), rate);
                }
            }
        }

        if p.max_w2.is_some() {
            self.rescale_weights(row)?;
        }
        self.update_bias(row, g, rate, momentum)
    }

    /// Shrinks the incoming weights of unit `row` so that their sum of
    /// squares does not exceed `max_w2`. A no-op without a limit.
    pub fn rescale_weights(&self, row: usize) -> Result<()> {
        let max_w2 = match self.params.max_w2 {
            Some(max_w2) => max_w2,
            None => return Ok(()),
        };
        let weights = dense_row_weights(self.wired()?)?.row(row);
        let r2 = sum_squares(weights);
        if r2 > max_w2 {
            let scale = (max_w2 / r2).sqrt() as f32;
            for cell in weights {
                cell.scale(scale);
            }
        }
        Ok(())
    }

    /// Bias step for unit `row`, using the same classic or Nesterov momentum
    /// rule as the weights but neither ADADELTA nor regularization. An
    /// infinite result marks the shared model unstable.
    pub fn update_bias(&self, row: usize, g: f32, rate: f32, momentum: f32) -> Result<()> {
        let wiring = self.wired()?;
        let b = wiring.b;
        if !self.params.nesterov_accelerated_gradient {
            let delta = rate * g;
            b.add(row, delta);
            if let Some(bm) = wiring.bm {
                b.add(row, momentum * bm.get(row));
                bm.set(row, delta);
            }
        } else {
            let mut d = g;
            if let Some(bm) = wiring.bm {
                bm.set(row, bm.get(row) * momentum + g);
                d = bm.get(row);
            }
            b.add(row, rate * d);
        }
        if b.get(row).is_infinite() {
            wiring.minfo.set_unstable();
        }
        Ok(())
    }
}

fn dense_row_weights<'w>(wiring: &Wiring<'w>) -> Result<&'w DenseRowMatrix> {
    match wiring.w {
        Matrix::DenseRow(w) => Ok(w),
        other => Err(Error::unsupported(format!(
            "bprop for {:?} weights is not yet implemented",
            other.layout()
        ))),
    }
}
