use crate::vector::{DenseVector, HogwildF32};

/// A trait that provides easy access to the first element of a slice.
pub trait Front<T> {
    fn front(&self) -> &T;
    fn mut_front(&mut self) -> &mut T;
}

/// A trait that provides easy access to the last element of a slice.
pub trait Back<T> {
    fn back(&self) -> &T;
    fn mut_back(&mut self) -> &mut T;
}

impl<T> Front<T> for [T] {
    #[inline(always)]
    fn front(&self) -> &T {
        &self[0]
    }
    #[inline(always)]
    fn mut_front(&mut self) -> &mut T {
        &mut self[0]
    }
}

impl<T> Back<T> for [T] {
    #[inline(always)]
    fn back(&self) -> &T {
        &self[self.len() - 1]
    }
    #[inline(always)]
    fn mut_back(&mut self) -> &mut T {
        let i = self.len() - 1;
        &mut self[i]
    }
}

/// A trait to replace all elements in a container with zeros.
pub trait ZeroOut {
    fn zero_out(&self);
}

impl ZeroOut for HogwildF32 {
    fn zero_out(&self) {
        self.set(0.0);
    }
}

impl<T> ZeroOut for [T]
where
    T: ZeroOut,
{
    fn zero_out(&self) {
        for elem in self {
            elem.zero_out();
        }
    }
}

impl ZeroOut for DenseVector {
    fn zero_out(&self) {
        self.raw().zero_out();
    }
}

/// Returns whether bit `i` of a little-endian bit-per-unit mask is set.
#[inline(always)]
pub fn bit_is_set(bits: &[u8], i: usize) -> bool {
    bits[i / 8] & (1 << (i % 8)) != 0
}

/// True when `row_bits` is present and switches `row` off.
#[inline(always)]
pub fn row_disabled(row_bits: Option<&[u8]>, row: usize) -> bool {
    row_bits.map_or(false, |bits| !bit_is_set(bits, row))
}

/// Sum of squares, accumulated in `f64`.
pub fn sum_squares(cells: &[HogwildF32]) -> f64 {
    cells
        .iter()
        .map(|c| {
            let v = c.get() as f64;
            v * v
        })
        .sum()
}
