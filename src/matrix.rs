//! Matrix storage layouts.

use crate::error::{Error, Result};
use crate::vector::{cells_from, zeroed_cells, HogwildF32};

use rand::Rng;
use rand_distr::Distribution;
use std::collections::BTreeMap;

/// The four supported storage layouts.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Layout {
    DenseRow,
    DenseCol,
    SparseRow,
    SparseCol,
}

/// Row-major contiguous matrix. Each row holds one unit's incoming weights.
#[derive(Clone, Debug)]
pub struct DenseRowMatrix {
    rows: usize,
    cols: usize,
    data: Box<[HogwildF32]>,
}

impl DenseRowMatrix {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        DenseRowMatrix {
            rows,
            cols,
            data: zeroed_cells(rows * cols),
        }
    }

    pub fn from_slice(rows: usize, cols: usize, values: &[f32]) -> Self {
        assert_eq!(values.len(), rows * cols);
        DenseRowMatrix {
            rows,
            cols,
            data: cells_from(values),
        }
    }

    /// Fills a new matrix with independent samples of `distribution`.
    pub fn random<D, R>(distribution: D, rows: usize, cols: usize, rng: &mut R) -> Self
    where
        D: Distribution<f32>,
        R: Rng,
    {
        DenseRowMatrix {
            rows,
            cols,
            data: (0..rows * cols)
                .map(|_| HogwildF32::new(distribution.sample(&mut *rng)))
                .collect(),
        }
    }

    #[inline(always)]
    pub fn get(&self, row: usize, col: usize) -> f32 {
        debug_assert!(row < self.rows && col < self.cols);
        self.data[row * self.cols + col].get()
    }

    #[inline(always)]
    pub fn set(&self, row: usize, col: usize, value: f32) {
        debug_assert!(row < self.rows && col < self.cols);
        self.data[row * self.cols + col].set(value)
    }

    #[inline(always)]
    pub fn add(&self, row: usize, col: usize, value: f32) {
        debug_assert!(row < self.rows && col < self.cols);
        self.data[row * self.cols + col].add(value)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline(always)]
    pub fn raw(&self) -> &[HogwildF32] {
        &self.data
    }

    /// The contiguous cells of a single row.
    #[inline(always)]
    pub fn row(&self, row: usize) -> &[HogwildF32] {
        &self.data[row * self.cols..(row + 1) * self.cols]
    }

    pub fn to_vec(&self) -> Vec<f32> {
        self.data.iter().map(HogwildF32::get).collect()
    }
}

/// Column-major contiguous matrix.
#[derive(Clone, Debug)]
pub struct DenseColMatrix {
    rows: usize,
    cols: usize,
    data: Box<[HogwildF32]>,
}

impl DenseColMatrix {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        DenseColMatrix {
            rows,
            cols,
            data: zeroed_cells(rows * cols),
        }
    }

    /// Transposes the storage order of `m` without changing its values.
    pub fn from_row_major(m: &DenseRowMatrix) -> Self {
        let out = DenseColMatrix::zeros(m.rows(), m.cols());
        for row in 0..m.rows() {
            for col in 0..m.cols() {
                out.set(row, col, m.get(row, col));
            }
        }
        out
    }

    #[inline(always)]
    pub fn get(&self, row: usize, col: usize) -> f32 {
        debug_assert!(row < self.rows && col < self.cols);
        self.data[col * self.rows + row].get()
    }

    #[inline(always)]
    pub fn set(&self, row: usize, col: usize, value: f32) {
        debug_assert!(row < self.rows && col < self.cols);
        self.data[col * self.rows + row].set(value)
    }

    #[inline(always)]
    pub fn add(&self, row: usize, col: usize, value: f32) {
        debug_assert!(row < self.rows && col < self.cols);
        self.data[col * self.rows + row].add(value)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn raw(&self) -> &[HogwildF32] {
        &self.data
    }
}

/// One ordered map per row, from column index to value.
#[derive(Clone, Debug)]
pub struct SparseRowMatrix {
    cols: usize,
    rows: Vec<BTreeMap<usize, f32>>,
}

impl SparseRowMatrix {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        SparseRowMatrix {
            cols,
            rows: vec![BTreeMap::new(); rows],
        }
    }

    /// Copies the non-zero entries of `m`.
    pub fn from_matrix(m: &Matrix) -> Self {
        let mut out = SparseRowMatrix::zeros(m.rows(), m.cols());
        for row in 0..m.rows() {
            for col in 0..m.cols() {
                let v = m.get(row, col);
                if v != 0.0 {
                    out.add(row, col, v);
                }
            }
        }
        out
    }

    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.rows[row].get(&col).copied().unwrap_or(0.0)
    }

    pub fn set(&mut self, row: usize, col: usize, value: f32) {
        self.rows[row].insert(col, value);
    }

    pub fn add(&mut self, row: usize, col: usize, value: f32) {
        *self.rows[row].entry(col).or_insert(0.0) += value;
    }

    pub fn rows(&self) -> usize {
        self.rows.len()
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn row(&self, row: usize) -> &BTreeMap<usize, f32> {
        &self.rows[row]
    }
}

/// One ordered map per column, from row index to value.
#[derive(Clone, Debug)]
pub struct SparseColMatrix {
    rows: usize,
    cols: Vec<BTreeMap<usize, f32>>,
}

impl SparseColMatrix {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        SparseColMatrix {
            rows,
            cols: vec![BTreeMap::new(); cols],
        }
    }

    /// Copies the non-zero entries of `m`.
    pub fn from_matrix(m: &Matrix) -> Self {
        let mut out = SparseColMatrix::zeros(m.rows(), m.cols());
        for row in 0..m.rows() {
            for col in 0..m.cols() {
                let v = m.get(row, col);
                if v != 0.0 {
                    out.add(row, col, v);
                }
            }
        }
        out
    }

    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.cols[col].get(&row).copied().unwrap_or(0.0)
    }

    pub fn set(&mut self, row: usize, col: usize, value: f32) {
        self.cols[col].insert(row, value);
    }

    pub fn add(&mut self, row: usize, col: usize, value: f32) {
        *self.cols[col].entry(row).or_insert(0.0) += value;
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols.len()
    }

    pub fn col(&self, col: usize) -> &BTreeMap<usize, f32> {
        &self.cols[col]
    }
}

/// A weight matrix in any of the four layouts. Absent entries are zero.
#[derive(Clone, Debug)]
pub enum Matrix {
    DenseRow(DenseRowMatrix),
    DenseCol(DenseColMatrix),
    SparseRow(SparseRowMatrix),
    SparseCol(SparseColMatrix),
}

impl Matrix {
    pub fn layout(&self) -> Layout {
        match self {
            Matrix::DenseRow(_) => Layout::DenseRow,
            Matrix::DenseCol(_) => Layout::DenseCol,
            Matrix::SparseRow(_) => Layout::SparseRow,
            Matrix::SparseCol(_) => Layout::SparseCol,
        }
    }

    /// Re-stores `m` in the requested layout.
    pub fn with_layout(m: &DenseRowMatrix, layout: Layout) -> Matrix {
        let dense = Matrix::DenseRow(m.clone());
        match layout {
            Layout::DenseRow => dense,
            Layout::DenseCol => Matrix::DenseCol(DenseColMatrix::from_row_major(m)),
            Layout::SparseRow => Matrix::SparseRow(SparseRowMatrix::from_matrix(&dense)),
            Layout::SparseCol => Matrix::SparseCol(SparseColMatrix::from_matrix(&dense)),
        }
    }

    pub fn get(&self, row: usize, col: usize) -> f32 {
        match self {
            Matrix::DenseRow(m) => m.get(row, col),
            Matrix::DenseCol(m) => m.get(row, col),
            Matrix::SparseRow(m) => m.get(row, col),
            Matrix::SparseCol(m) => m.get(row, col),
        }
    }

    pub fn set(&mut self, row: usize, col: usize, value: f32) {
        match self {
            Matrix::DenseRow(m) => m.set(row, col, value),
            Matrix::DenseCol(m) => m.set(row, col, value),
            Matrix::SparseRow(m) => m.set(row, col, value),
            Matrix::SparseCol(m) => m.set(row, col, value),
        }
    }

    pub fn add(&mut self, row: usize, col: usize, value: f32) {
        match self {
            Matrix::DenseRow(m) => m.add(row, col, value),
            Matrix::DenseCol(m) => m.add(row, col, value),
            Matrix::SparseRow(m) => m.add(row, col, value),
            Matrix::SparseCol(m) => m.add(row, col, value),
        }
    }

    pub fn rows(&self) -> usize {
        match self {
            Matrix::DenseRow(m) => m.rows(),
            Matrix::DenseCol(m) => m.rows(),
            Matrix::SparseRow(m) => m.rows(),
            Matrix::SparseCol(m) => m.rows(),
        }
    }

    pub fn cols(&self) -> usize {
        match self {
            Matrix::DenseRow(m) => m.cols(),
            Matrix::DenseCol(m) => m.cols(),
            Matrix::SparseRow(m) => m.cols(),
            Matrix::SparseCol(m) => m.cols(),
        }
    }

    /// Nominal element count, `rows * cols`.
    pub fn size(&self) -> u64 {
        self.rows() as u64 * self.cols() as u64
    }

    pub fn raw(&self) -> Result<&[HogwildF32]> {
        match self {
            Matrix::DenseRow(m) => Ok(m.raw()),
            Matrix::DenseCol(m) => Ok(m.raw()),
            Matrix::SparseRow(_) | Matrix::SparseCol(_) => Err(Error::unsupported(
                "raw access to the data in a sparse matrix is not implemented",
            )),
        }
    }

    pub fn as_dense_row(&self) -> Option<&DenseRowMatrix> {
        match self {
            Matrix::DenseRow(m) => Some(m),
            _ => None,
        }
    }
}
