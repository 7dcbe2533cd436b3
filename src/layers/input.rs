use super::Neurons;
use crate::error::{Error, Result};
use crate::utils::ZeroOut;
use crate::vector::{DenseVector, SparseVector, Vector};

use itertools::multizip;

const INPUT_DROPOUT_SALT: u64 = 0x1337_B4BE;

impl<'a> Neurons<'a> {
    /// Maps a raw feature row onto the input units.
    ///
    /// `data` holds one level number per categorical column (0 is the
    /// reference level and activates nothing) followed by the numeric
    /// columns, which are normalized when the [`crate::data::InputInfo`]
    /// carries normalization. Input dropout, if configured, is drawn from
    /// `seed`.
    pub fn set_input(&mut self, seed: u64, data: &[f64]) -> Result<()> {
        self.set_input_with(seed, data, true)
    }

    pub(crate) fn set_input_with(&mut self, seed: u64, data: &[f64], apply_dropout: bool) -> Result<()> {
        let info = self
            .info
            .as_ref()
            .ok_or_else(|| Error::unsupported("only the input layer takes feature rows"))?;
        if data.len() != info.cats() + info.nums() {
            return Err(Error::InvalidData(format!(
                "expected {} features, got {}",
                info.cats() + info.nums(),
                data.len()
            )));
        }
        let (cat_data, num_data) = data.split_at(info.cats());
        let offsets = info.cat_offsets();

        let mut cats = Vec::with_capacity(info.cats());
        for (i, &level) in cat_data.iter().enumerate() {
            let level = level as usize;
            if level == 0 {
                continue;
            }
            if level > offsets[i + 1] - offsets[i] {
                return Err(Error::InvalidData(format!(
                    "level {} is out of range for categorical column {}",
                    level, i
                )));
            }
            cats.push(offsets[i] + level - 1);
        }

        let nums: Vec<f64> = match info.normalization() {
            Some((sub, mul)) => multizip((num_data, sub, mul))
                .map(|(d, s, m)| (d - s) * m)
                .collect(),
            None => num_data.to_vec(),
        };
        self.set_input_expanded_with(seed, &nums, &cats, apply_dropout)
    }

    /// Sets the input units from an already expanded row: `cats` lists the
    /// active one-hot units, `nums` the numeric values, NaN meaning missing.
    pub fn set_input_expanded(&mut self, seed: u64, nums: &[f64], cats: &[usize]) -> Result<()> {
        self.set_input_expanded_with(seed, nums, cats, true)
    }

    fn set_input_expanded_with(
        &mut self,
        seed: u64,
        nums: &[f64],
        cats: &[usize],
        apply_dropout: bool,
    ) -> Result<()> {
        {
            let info = self
                .info
                .as_ref()
                .ok_or_else(|| Error::unsupported("only the input layer takes feature rows"))?;
            let num_start = info.num_start();
            if nums.len() != info.nums() || cats.iter().any(|&c| c >= num_start) {
                return Err(Error::InvalidData(format!(
                    "row does not fit {} categorical and {} numeric units",
                    num_start,
                    info.nums()
                )));
            }

            let dense = self.input_target()?;
            dense.raw()[..num_start].zero_out();
            for &c in cats {
                dense.set(c, 1.0);
            }
            for (i, &d) in nums.iter().enumerate() {
                dense.set(num_start + i, if d.is_nan() { 0.0 } else { d as f32 });
            }

            if apply_dropout {
                if let Some(dropout) = &self.dropout {
                    let seed = seed
                        .wrapping_add(self.params.seed)
                        .wrapping_add(INPUT_DROPOUT_SALT);
                    dropout.randomly_sparsify_activation(dense, seed);
                }
            }
        }
        if let Some(scratch) = &self.scratch {
            self.a = Vector::Sparse(SparseVector::from_dense(scratch));
        }
        Ok(())
    }

    /// The dense vector the input row is written into.
    fn input_target(&self) -> Result<&DenseVector> {
        match (&self.scratch, &self.a) {
            (Some(scratch), _) => Ok(scratch),
            (None, Vector::Dense(a)) => Ok(a),
            (None, Vector::Sparse(_)) => Err(Error::unsupported(
                "sparse input activation without a dense buffer",
            )),
        }
    }
}
