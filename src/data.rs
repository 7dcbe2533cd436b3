//! How raw feature rows map onto input units.

use crate::error::{Error, Result};

/// Column layout of a training frame: `cats` categorical columns, expanded
/// one-hot, followed by `nums` numeric columns.
#[derive(Clone, Debug, PartialEq)]
pub struct InputInfo {
    cats: usize,
    /// `cats + 1` entries; categorical column `i` owns units
    /// `cat_offsets[i]..cat_offsets[i + 1]`.
    cat_offsets: Vec<usize>,
    nums: usize,
    /// Per numeric column `(d - sub) * mul`, when present.
    normalization: Option<(Vec<f64>, Vec<f64>)>,
}

impl InputInfo {
    /// A frame of numeric columns only.
    pub fn numeric(nums: usize) -> Self {
        InputInfo {
            cats: 0,
            cat_offsets: vec![0],
            nums,
            normalization: None,
        }
    }

    /// `levels[i]` is the number of one-hot units of categorical column `i`
    /// (its level count minus the reference level).
    pub fn new(levels: &[usize], nums: usize) -> Self {
        let mut cat_offsets = Vec::with_capacity(levels.len() + 1);
        let mut offset = 0;
        cat_offsets.push(offset);
        for &n in levels {
            offset += n;
            cat_offsets.push(offset);
        }
        InputInfo {
            cats: levels.len(),
            cat_offsets,
            nums,
            normalization: None,
        }
    }

    pub fn with_normalization(mut self, sub: Vec<f64>, mul: Vec<f64>) -> Result<Self> {
        if sub.len() != self.nums || mul.len() != self.nums {
            return Err(Error::InvalidData(format!(
                "normalization needs {} entries, got {} and {}",
                self.nums,
                sub.len(),
                mul.len()
            )));
        }
        self.normalization = Some((sub, mul));
        Ok(self)
    }

    pub fn cats(&self) -> usize {
        self.cats
    }

    pub fn nums(&self) -> usize {
        self.nums
    }

    pub fn cat_offsets(&self) -> &[usize] {
        &self.cat_offsets
    }

    /// First numeric unit.
    pub fn num_start(&self) -> usize {
        self.cat_offsets[self.cats]
    }

    /// Input layer width.
    pub fn units(&self) -> usize {
        self.num_start() + self.nums
    }

    pub(crate) fn normalization(&self) -> Option<(&[f64], &[f64])> {
        self.normalization
            .as_ref()
            .map(|(sub, mul)| (sub.as_slice(), mul.as_slice()))
    }
}

/// The label of a training example.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Target {
    Class(usize),
    Value(f32),
}

/// One example from the row feed: raw features (categoricals as level
/// numbers, missing numerics as NaN) plus the label.
#[derive(Clone, Debug, PartialEq)]
pub struct TrainingRow {
    pub features: Vec<f64>,
    pub target: Target,
}

impl TrainingRow {
    pub fn new(features: Vec<f64>, target: Target) -> Self {
        TrainingRow { features, target }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_accumulate_levels() {
        let info = InputInfo::new(&[3, 1, 2], 4);
        assert_eq!(info.cat_offsets(), &[0, 3, 4, 6]);
        assert_eq!(info.num_start(), 6);
        assert_eq!(info.units(), 10);
    }

    #[test]
    fn normalization_length_checked() {
        assert!(InputInfo::numeric(2)
            .with_normalization(vec![0.0], vec![1.0, 1.0])
            .is_err());
        assert!(InputInfo::numeric(2)
            .with_normalization(vec![0.0, 1.0], vec![1.0, 2.0])
            .is_ok());
    }
}
