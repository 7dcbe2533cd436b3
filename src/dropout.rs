//! Dropout masks.
//!
//! A mask keeps one bit per unit; a set bit means the unit takes part in the
//! current forward/backward pair. Masks are redrawn from a seed before every
//! training forward pass, so the same seed always yields the same mask.

use crate::utils::bit_is_set;
use crate::vector::DenseVector;

use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};

#[derive(Clone, Debug)]
pub struct Dropout {
    units: usize,
    /// Fraction of units dropped.
    ratio: f64,
    bits: Vec<u8>,
}

impl Dropout {
    pub fn new(units: usize, ratio: f64) -> Self {
        Dropout {
            units,
            ratio,
            bits: vec![0xFF; (units + 7) / 8],
        }
    }

    pub fn units(&self) -> usize {
        self.units
    }

    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    /// Redraws the mask from `seed`.
    pub fn fill_bytes(&mut self, seed: u64) {
        let mut rng = StdRng::seed_from_u64(seed);
        if self.ratio == 0.5 {
            rng.fill_bytes(&mut self.bits);
        } else {
            self.bits.iter_mut().for_each(|b| *b = 0);
            let ratio = self.ratio as f32;
            for i in 0..self.bits.len() * 8 {
                if rng.gen::<f32>() > ratio {
                    self.bits[i / 8] |= 1 << (i % 8);
                }
            }
        }
    }

    /// Zeroes each entry of `a` with probability `ratio`, drawing from `seed`.
    pub fn randomly_sparsify_activation(&self, a: &DenseVector, seed: u64) {
        if self.ratio == 0.0 {
            return;
        }
        let mut rng = StdRng::seed_from_u64(seed);
        let ratio = self.ratio as f32;
        for cell in a.raw() {
            if rng.gen::<f32>() < ratio {
                cell.set(0.0);
            }
        }
    }

    #[inline(always)]
    pub fn unit_active(&self, o: usize) -> bool {
        bit_is_set(&self.bits, o)
    }

    /// Raw bit mask, as consumed by the matrix-vector kernels.
    pub fn bits(&self) -> &[u8] {
        &self.bits
    }
}
