//! Vector storage.
//!
//! Every numeric cell is a [`HogwildF32`], a relaxed atomic `f32`. Workers
//! share the model's weight and bias vectors through plain `&` references and
//! update them without locks. Two workers adding to the same cell at the same
//! time may lose one of the additions; that loss is the accepted price of
//! lock-free asynchronous SGD. A worker's private activation and error
//! vectors use the same cells, so one container type serves both roles.

use crate::error::{Error, Result};

use itertools::Itertools;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

/// An `f32` that can be read and written through a shared reference.
#[repr(transparent)]
#[derive(Default)]
pub struct HogwildF32(AtomicU32);

impl HogwildF32 {
    #[inline(always)]
    pub fn new(value: f32) -> Self {
        HogwildF32(AtomicU32::new(value.to_bits()))
    }

    #[inline(always)]
    pub fn get(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    #[inline(always)]
    pub fn set(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }

    /// Unsynchronized read-modify-write: a concurrent writer may be lost.
    #[inline(always)]
    pub fn add(&self, value: f32) {
        self.set(self.get() + value);
    }

    #[inline(always)]
    pub fn scale(&self, factor: f32) {
        self.set(self.get() * factor);
    }
}

impl Clone for HogwildF32 {
    fn clone(&self) -> Self {
        HogwildF32::new(self.get())
    }
}

impl fmt::Debug for HogwildF32 {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.get())
    }
}

/// Allocates `len` zeroed cells.
pub(crate) fn zeroed_cells(len: usize) -> Box<[HogwildF32]> {
    (0..len).map(|_| HogwildF32::default()).collect()
}

/// Copies plain values into fresh cells.
pub(crate) fn cells_from(values: &[f32]) -> Box<[HogwildF32]> {
    values.iter().map(|&v| HogwildF32::new(v)).collect()
}

/// Which concrete vector variant a layer emits.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum VectorLayout {
    Dense,
    Sparse,
}

/// A fixed-size contiguous vector.
#[derive(Clone, Debug)]
pub struct DenseVector {
    data: Box<[HogwildF32]>,
}

impl DenseVector {
    pub fn zeros(len: usize) -> Self {
        DenseVector {
            data: zeroed_cells(len),
        }
    }

    pub fn from_slice(values: &[f32]) -> Self {
        DenseVector {
            data: cells_from(values),
        }
    }

    #[inline(always)]
    pub fn get(&self, i: usize) -> f32 {
        self.data[i].get()
    }

    #[inline(always)]
    pub fn set(&self, i: usize, value: f32) {
        self.data[i].set(value)
    }

    #[inline(always)]
    pub fn add(&self, i: usize, value: f32) {
        self.data[i].add(value)
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Raw contiguous access for bulk kernels.
    #[inline(always)]
    pub fn raw(&self) -> &[HogwildF32] {
        &self.data
    }

    /// Overwrites every entry with `value`.
    pub fn fill(&self, value: f32) {
        for cell in self.data.iter() {
            cell.set(value);
        }
    }

    /// Divides every entry by `divisor`.
    pub fn div(&self, divisor: f32) {
        for cell in self.data.iter() {
            cell.set(cell.get() / divisor);
        }
    }

    /// Largest entry, or negative infinity for an empty vector.
    pub fn max_value(&self) -> f32 {
        self.data
            .iter()
            .map(HogwildF32::get)
            .fold(f32::NEG_INFINITY, f32::max)
    }

    /// Snapshot of the current values.
    pub fn to_vec(&self) -> Vec<f32> {
        self.data.iter().map(HogwildF32::get).collect()
    }
}

/// A read-only projection of the non-zero entries of a [`DenseVector`].
#[derive(Clone, Debug, PartialEq)]
pub struct SparseVector {
    size: usize,
    indices: Box<[usize]>,
    values: Box<[f32]>,
}

impl SparseVector {
    /// Builds the projection, allocating exactly one slot per non-zero.
    pub fn from_dense(dense: &DenseVector) -> Self {
        let nnz = dense.raw().iter().filter(|c| c.get() != 0.0).count();
        let mut indices = Vec::with_capacity(nnz);
        let mut values = Vec::with_capacity(nnz);
        for (i, cell) in dense.raw().iter().enumerate() {
            let v = cell.get();
            if v != 0.0 {
                indices.push(i);
                values.push(v);
            }
        }
        debug_assert_eq!(indices.len(), nnz);
        SparseVector {
            size: dense.size(),
            indices: indices.into_boxed_slice(),
            values: values.into_boxed_slice(),
        }
    }

    pub fn from_slice(values: &[f32]) -> Self {
        SparseVector::from_dense(&DenseVector::from_slice(values))
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of stored (non-zero) entries.
    pub fn nnz(&self) -> usize {
        self.indices.len()
    }

    /// Slow path access by binary search.
    pub fn get(&self, i: usize) -> f32 {
        match self.indices.binary_search(&i) {
            Ok(pos) => self.values[pos],
            Err(_) => 0.0,
        }
    }

    /// Cursor at the first non-zero.
    pub fn begin(&self) -> SparseCursor {
        SparseCursor { pos: 0 }
    }

    /// The one-past-last sentinel cursor.
    pub fn end(&self) -> SparseCursor {
        SparseCursor {
            pos: self.indices.len(),
        }
    }

    /// Entry under `cursor`; `None` at the end sentinel.
    pub fn entry(&self, cursor: SparseCursor) -> Option<(usize, f32)> {
        if cursor.pos < self.indices.len() {
            Some((self.indices[cursor.pos], self.values[cursor.pos]))
        } else {
            None
        }
    }

    /// Iterates `(index, value)` over the non-zeros in ascending index order.
    pub fn iter(&self) -> SparseIter<'_> {
        SparseIter {
            vector: self,
            cursor: self.begin(),
        }
    }

    /// Indices strictly increasing and in range, no stored zero.
    pub fn is_well_formed(&self) -> bool {
        self.indices.iter().tuple_windows().all(|(a, b)| a < b)
            && self.indices.last().map_or(true, |&i| i < self.size)
            && self.values.iter().all(|&v| v != 0.0)
    }
}

/// A position among the non-zeros of a [`SparseVector`] (not an index).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SparseCursor {
    pos: usize,
}

impl SparseCursor {
    pub fn next(self) -> Self {
        SparseCursor { pos: self.pos + 1 }
    }
}

pub struct SparseIter<'a> {
    vector: &'a SparseVector,
    cursor: SparseCursor,
}

impl<'a> Iterator for SparseIter<'a> {
    type Item = (usize, f32);

    fn next(&mut self) -> Option<Self::Item> {
        let entry = self.vector.entry(self.cursor)?;
        self.cursor = self.cursor.next();
        Some(entry)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.vector.nnz() - self.cursor.pos;
        (left, Some(left))
    }
}

impl<'a> ExactSizeIterator for SparseIter<'a> {}

/// A layer activation: dense, or a sparse snapshot of one.
#[derive(Clone, Debug)]
pub enum Vector {
    Dense(DenseVector),
    Sparse(SparseVector),
}

impl Vector {
    pub fn layout(&self) -> VectorLayout {
        match self {
            Vector::Dense(_) => VectorLayout::Dense,
            Vector::Sparse(_) => VectorLayout::Sparse,
        }
    }

    pub fn get(&self, i: usize) -> f32 {
        match self {
            Vector::Dense(v) => v.get(i),
            Vector::Sparse(v) => v.get(i),
        }
    }

    pub fn set(&self, i: usize, value: f32) -> Result<()> {
        match self {
            Vector::Dense(v) => {
                v.set(i, value);
                Ok(())
            }
            Vector::Sparse(_) => Err(Error::unsupported(
                "setting values in a sparse vector is not implemented",
            )),
        }
    }

    pub fn add(&self, i: usize, value: f32) -> Result<()> {
        match self {
            Vector::Dense(v) => {
                v.add(i, value);
                Ok(())
            }
            Vector::Sparse(_) => Err(Error::unsupported(
                "adding values in a sparse vector is not implemented",
            )),
        }
    }

    pub fn size(&self) -> usize {
        match self {
            Vector::Dense(v) => v.size(),
            Vector::Sparse(v) => v.size(),
        }
    }

    pub fn raw(&self) -> Result<&[HogwildF32]> {
        match self {
            Vector::Dense(v) => Ok(v.raw()),
            Vector::Sparse(_) => Err(Error::unsupported(
                "raw access to the data in a sparse vector is not implemented",
            )),
        }
    }

    pub fn as_dense(&self) -> Option<&DenseVector> {
        match self {
            Vector::Dense(v) => Some(v),
            Vector::Sparse(_) => None,
        }
    }

    pub fn to_vec(&self) -> Vec<f32> {
        (0..self.size()).map(|i| self.get(i)).collect()
    }
}
