//! Hidden layers: Tanh, Rectifier and Maxout, each with an optional dropout
//! wrapper.

use super::Neurons;
use crate::activator::Activator;
use crate::error::{Error, Result};
use crate::vector::Vector;

impl<'a> Neurons<'a> {
    pub(super) fn fprop_hidden(
        &mut self,
        previous: &Neurons<'a>,
        seed: u64,
        training: bool,
        activator: Activator,
        dropout: bool,
    ) -> Result<()> {
        if dropout && training {
            let seed = seed
                .wrapping_add(self.params.seed)
                .wrapping_add(activator.dropout_seed_salt());
            let mask = self
                .dropout
                .as_mut()
                .ok_or_else(|| Error::invalid_config("dropout layer has no mask"))?;
            mask.fill_bytes(seed);
        }

        match activator {
            Activator::Maxout => self.fprop_maxout(previous, training)?,
            _ => self.fprop_affine(previous, training, activator)?,
        }

        if dropout && !training {
            self.dense_activation()?.div(2.0);
        }
        Ok(())
    }

    /// `a = f(W * x + b)`, dropped units zero.
    fn fprop_affine(&self, previous: &Neurons<'a>, training: bool, activator: Activator) -> Result<()> {
        let wiring = self.wired()?;
        let a = self.dense_activation()?;
        let bits = match &self.dropout {
            Some(mask) if training => Some(mask.bits()),
            _ => None,
        };
        wiring.kernel.run(a, wiring.w, &previous.a, wiring.b, bits)?;
        for cell in a.raw() {
            cell.set(activator.f(cell.get()));
        }
        Ok(())
    }

    /// Per unit, the largest weighted input plus the bias. The whole vector
    /// is scaled down when some unit exceeds 1.
    fn fprop_maxout(&self, previous: &Neurons<'a>, training: bool) -> Result<()> {
        let wiring = self.wired()?;
        let a = self.dense_activation()?;
        let active = |o: usize| match &self.dropout {
            Some(mask) if training => mask.unit_active(o),
            _ => true,
        };
        let mut max = 0f32;
        match &previous.a {
            Vector::Dense(x) => {
                for o in 0..a.size() {
                    a.set(o, 0.0);
                    if !active(o) {
                        continue;
                    }
                    let best = (0..x.size())
                        .map(|i| wiring.w.get(o, i) * x.get(i))
                        .fold(f32::NEG_INFINITY, f32::max);
                    a.set(o, unit_max(best) + wiring.b.get(o));
                    max = max.max(a.get(o));
                }
            }
            // Walks only the stored entries of the input.
            Vector::Sparse(x) => {
                for o in 0..a.size() {
                    a.set(o, 0.0);
                    if !active(o) {
                        continue;
                    }
                    let mut best = f32::NEG_INFINITY;
                    let mut it = x.begin();
                    while it != x.end() {
                        if let Some((i, v)) = x.entry(it) {
                            best = best.max(wiring.w.get(o, i) * v);
                        }
                        it = it.next();
                    }
                    a.set(o, unit_max(best) + wiring.b.get(o));
                    max = max.max(a.get(o));
                }
            }
        }
        if max > 1.0 {
            a.div(max);
        }
        Ok(())
    }

    pub(super) fn bprop_hidden(&self, previous: &Neurons<'a>, activator: Activator) -> Result<()> {
        let e = self
            .e
            .as_ref()
            .ok_or_else(|| Error::invalid_config("hidden layer has no error vector"))?;
        let a = self.dense_activation()?;
        let processed = self.wired()?.minfo.processed();
        let m = self.momentum(processed);
        let r = self.rate(processed) * (1.0 - m);
        for u in 0..a.size() {
            let g = e.get(u) * activator.fprime(a.get(u));
            self.bprop_unit(previous, u, g, r, m)?;
        }
        Ok(())
    }
}

/// No contributing input at all counts as zero.
#[inline(always)]
fn unit_max(best: f32) -> f32 {
    if best == f32::NEG_INFINITY {
        0.0
    } else {
        best
    }
}

#[cfg(test)]
mod tests {
    use crate::data::InputInfo;
    use crate::layers::Neurons;
    use crate::matrix::{DenseRowMatrix, Matrix};
    use crate::model::ModelInfo;
    use crate::params::{Activation, Params};

    fn params(activation: Activation) -> Params {
        Params {
            hidden: vec![3],
            activation,
            ..Params::default()
        }
    }

    fn model(p: &Params, weights: &[f32], biases: &[f32]) -> ModelInfo {
        let mut minfo = ModelInfo::new(p, 2, 2);
        minfo
            .set_weights(0, Matrix::DenseRow(DenseRowMatrix::from_slice(3, 2, weights)))
            .unwrap();
        for (i, &b) in biases.iter().enumerate() {
            minfo.biases(0).set(i, b);
        }
        minfo
    }

    fn forward(p: &Params, minfo: &ModelInfo, input: &[f64], training: bool, seed: u64) -> Vec<f32> {
        let mut prev = Neurons::input(InputInfo::numeric(2));
        prev.init(None, 0, p, minfo, training).unwrap();
        prev.set_input_with(0, input, false).unwrap();
        let mut layer = Neurons::hidden(p.activation, 3);
        layer.init(Some(&prev), 1, p, minfo, training).unwrap();
        layer.fprop(&prev, seed, training).unwrap();
        layer.activation().to_vec()
    }

    fn assert_close(expected: &[f32], actual: &[f32]) {
        for (e, a) in expected.iter().zip(actual) {
            assert!((e - a).abs() < 1e-6, "expected {:?}, got {:?}", expected, actual);
        }
    }

    #[test]
    fn tanh_and_rectifier_apply_their_nonlinearity() {
        let weights = [1.0, 0.0, 0.0, 1.0, -1.0, -1.0];
        let biases = [0.0, 0.5, 0.0];

        let p = params(Activation::Tanh);
        let minfo = model(&p, &weights, &biases);
        let got = forward(&p, &minfo, &[0.5, -1.0], false, 0);
        assert_close(&[0.5f32.tanh(), (-0.5f32).tanh(), 0.5f32.tanh()], &got);

        let p = params(Activation::Rectifier);
        let minfo = model(&p, &weights, &biases);
        let got = forward(&p, &minfo, &[0.5, -1.0], false, 0);
        assert_close(&[0.5, 0.0, 0.5], &got);
    }

    #[test]
    fn maxout_takes_the_largest_product() {
        let p = params(Activation::Maxout);
        let minfo = model(&p, &[0.2, 0.1, -0.5, -0.5, 0.0, 0.0], &[0.0, 0.1, 0.0]);
        let got = forward(&p, &minfo, &[1.0, 2.0], false, 0);
        assert_close(&[0.2, -0.4, 0.0], &got);
    }

    #[test]
    fn maxout_scales_down_when_above_one() {
        let p = params(Activation::Maxout);
        let minfo = model(&p, &[4.0, 0.0, 1.0, 0.0, 0.0, 0.0], &[0.0; 3]);
        let got = forward(&p, &minfo, &[1.0, 0.0], false, 0);
        assert_close(&[1.0, 0.25, 0.0], &got);
    }

    #[test]
    fn maxout_sparse_input_matches_dense() {
        let weights = [0.3, -0.7, 0.9, 0.2, -0.1, -0.4];
        let dense = params(Activation::Maxout);
        let sparse = Params {
            sparse_input: true,
            ..dense.clone()
        };
        let minfo = model(&dense, &weights, &[0.1, 0.0, -0.1]);
        let expected = forward(&dense, &minfo, &[0.0, 2.0], false, 0);
        let minfo = model(&sparse, &weights, &[0.1, 0.0, -0.1]);
        let got = forward(&sparse, &minfo, &[0.0, 2.0], false, 0);
        // The dense path also sees the zero column, the sparse path does not.
        assert_close(&[0.1, 0.4, -0.1], &expected);
        assert_close(&[-1.3, 0.4, -0.9], &got);
    }

    #[test]
    fn dropout_halves_at_test_time() {
        let weights = [0.5, 0.5, -0.5, 0.5, 1.0, 1.0];
        let plain = params(Activation::Rectifier);
        let dropout = params(Activation::RectifierWithDropout);
        let minfo = model(&plain, &weights, &[0.0; 3]);
        let base = forward(&plain, &minfo, &[1.0, 1.0], false, 0);
        let halved = forward(&dropout, &minfo, &[1.0, 1.0], false, 0);
        let expected: Vec<f32> = base.iter().map(|v| v / 2.0).collect();
        assert_close(&expected, &halved);
    }

    #[test]
    fn training_dropout_zeroes_masked_units() {
        let p = Params {
            hidden: vec![64],
            activation: Activation::TanhWithDropout,
            hidden_dropout_ratios: vec![0.5],
            ..Params::default()
        };
        let minfo = ModelInfo::new(&p, 2, 2);
        for i in 0..64 {
            minfo.biases(0).set(i, 1.0);
        }
        let mut prev = Neurons::input(InputInfo::numeric(2));
        prev.init(None, 0, &p, &minfo, true).unwrap();
        prev.set_input_with(0, &[0.0, 0.0], false).unwrap();
        let mut layer = Neurons::hidden(p.activation, 64);
        layer.init(Some(&prev), 1, &p, &minfo, true).unwrap();
        layer.fprop(&prev, 5, true).unwrap();

        let mask = layer.dropout().unwrap();
        let a = layer.activation().to_vec();
        for (o, &v) in a.iter().enumerate() {
            if mask.unit_active(o) {
                assert!((v - 1f32.tanh()).abs() < 1e-6);
            } else {
                assert_eq!(v, 0.0);
            }
        }
        assert!(a.iter().any(|&v| v == 0.0));

        let first = a;
        layer.fprop(&prev, 5, true).unwrap();
        assert_eq!(first, layer.activation().to_vec());
    }

    #[test]
    fn maxout_dropout_rescales_by_active_units_only() {
        const UNITS: usize = 32;
        let weights: Vec<f32> = (0..UNITS)
            .flat_map(|o| vec![0.1 * (o + 1) as f32, -0.2])
            .collect();
        let raw: Vec<f32> = (0..UNITS).map(|o| 0.1 * (o + 1) as f32 + 0.05).collect();

        for &sparse_input in &[false, true] {
            let p = Params {
                hidden: vec![UNITS],
                activation: Activation::MaxoutWithDropout,
                hidden_dropout_ratios: vec![0.5],
                sparse_input,
                ..Params::default()
            };
            let mut minfo = ModelInfo::new(&p, 2, 2);
            minfo
                .set_weights(0, Matrix::DenseRow(DenseRowMatrix::from_slice(UNITS, 2, &weights)))
                .unwrap();
            for o in 0..UNITS {
                minfo.biases(0).set(o, 0.05);
            }
            let mut prev = Neurons::input(InputInfo::numeric(2));
            prev.init(None, 0, &p, &minfo, true).unwrap();
            prev.set_input_with(0, &[1.0, 2.0], false).unwrap();
            let mut layer = Neurons::hidden(p.activation, UNITS);
            layer.init(Some(&prev), 1, &p, &minfo, true).unwrap();

            let mut top_unit_dropped = false;
            for seed in 0..16 {
                layer.fprop(&prev, seed, true).unwrap();
                let mask = layer.dropout().unwrap();
                let scale = (0..UNITS)
                    .filter(|&o| mask.unit_active(o))
                    .map(|o| raw[o])
                    .fold(0f32, f32::max);
                let scale = if scale > 1.0 { scale } else { 1.0 };
                let a = layer.activation().to_vec();
                for (o, &v) in a.iter().enumerate() {
                    if mask.unit_active(o) {
                        assert!((v - raw[o] / scale).abs() < 1e-6, "unit {}: {}", o, v);
                    } else {
                        assert_eq!(v, 0.0);
                    }
                }
                top_unit_dropped |= !mask.unit_active(UNITS - 1);
            }
            assert!(top_unit_dropped);
        }
    }

    #[test]
    fn bprop_scales_the_error_by_the_derivative() {
        let p = Params {
            hidden: vec![3],
            activation: Activation::Rectifier,
            rate: 1.0,
            rate_annealing: 0.0,
            ..Params::default()
        };
        let minfo = model(&p, &[1.0, 0.0, -1.0, 0.0, 0.0, 1.0], &[0.0; 3]);
        let mut prev = Neurons::input(InputInfo::numeric(2));
        prev.init(None, 0, &p, &minfo, false).unwrap();
        prev.set_input(0, &[1.0, 1.0]).unwrap();
        let mut layer = Neurons::hidden(p.activation, 3);
        layer.init(Some(&prev), 1, &p, &minfo, false).unwrap();
        layer.fprop(&prev, 0, false).unwrap();
        assert_eq!(layer.activation().to_vec(), vec![1.0, 0.0, 1.0]);

        let e = layer.error().unwrap();
        e.fill(0.5);
        layer.bprop(&prev).unwrap();
        // Unit 1 is inactive, so its weights and bias stay put.
        assert_eq!(minfo.biases(0).to_vec(), vec![0.5, 0.0, 0.5]);
        let w = minfo.weights(0).as_dense_row().unwrap();
        assert_eq!(w.to_vec(), vec![1.5, 0.5, -1.0, 0.0, 0.5, 1.5]);
    }
}
