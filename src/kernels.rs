//! Matrix-vector plus bias kernels, `res = W * x + b`, with optional row
//! dropout.
//!
//! A row whose bit is unset in `row_bits` is skipped and its output set to
//! zero. Which kernel runs is decided once, when a layer is wired, from the
//! storage layout of the weights and of the previous layer's activation.

use crate::error::{Error, Result};
use crate::matrix::{DenseColMatrix, DenseRowMatrix, Layout, Matrix, SparseColMatrix, SparseRowMatrix};
use crate::utils::row_disabled;
use crate::vector::{DenseVector, HogwildF32, SparseVector, Vector, VectorLayout};

use itertools::multizip;

/// A resolved matrix-vector kernel.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum GemvKernel {
    /// Dense row-major weights times a dense vector, 8-way unrolled.
    RowOptimized,
    DenseRowSparse,
    DenseColDense,
    DenseColSparse,
    /// Sparse row weights; reads the input through `get`.
    SparseRow,
    /// Sparse column weights; reads the input through `get`.
    SparseCol,
}

impl GemvKernel {
    /// The kernel table, keyed by (weight layout, input layout).
    pub fn select(weights: Layout, input: VectorLayout) -> GemvKernel {
        use self::GemvKernel::*;
        match (weights, input) {
            (Layout::DenseRow, VectorLayout::Dense) => RowOptimized,
            (Layout::DenseRow, VectorLayout::Sparse) => DenseRowSparse,
            (Layout::DenseCol, VectorLayout::Dense) => DenseColDense,
            (Layout::DenseCol, VectorLayout::Sparse) => DenseColSparse,
            (Layout::SparseRow, _) => SparseRow,
            (Layout::SparseCol, _) => SparseCol,
        }
    }

    /// Runs the kernel. Fails if `w` or `x` is not the variant the kernel was
    /// selected for.
    pub fn run(
        self,
        res: &DenseVector,
        w: &Matrix,
        x: &Vector,
        b: &DenseVector,
        row_bits: Option<&[u8]>,
    ) -> Result<()> {
        use self::GemvKernel::*;
        match (self, w, x) {
            (RowOptimized, Matrix::DenseRow(a), Vector::Dense(x)) => {
                gemv_row_optimized(res.raw(), a.raw(), x.raw(), b.raw(), row_bits)
            }
            (DenseRowSparse, Matrix::DenseRow(a), Vector::Sparse(x)) => {
                gemv_dense_row_sparse(res, a, x, b, row_bits)
            }
            (DenseColDense, Matrix::DenseCol(a), Vector::Dense(x)) => {
                gemv_dense_col_dense(res, a, x, b, row_bits)
            }
            (DenseColSparse, Matrix::DenseCol(a), Vector::Sparse(x)) => {
                gemv_dense_col_sparse(res, a, x, b, row_bits)
            }
            (SparseRow, Matrix::SparseRow(a), x) => gemv_sparse_row(res, a, x, b, row_bits),
            (SparseCol, Matrix::SparseCol(a), x) => gemv_sparse_col(res, a, x, b, row_bits),
            (kernel, w, x) => {
                return Err(Error::unsupported(format!(
                    "{:?} kernel cannot multiply {:?} weights with a {:?} vector",
                    kernel,
                    w.layout(),
                    x.layout()
                )))
            }
        }
        Ok(())
    }
}

/// Reference row-major kernel, one multiply-add at a time.
pub fn gemv_naive(
    res: &[HogwildF32],
    a: &[HogwildF32],
    x: &[HogwildF32],
    y: &[HogwildF32],
    row_bits: Option<&[u8]>,
) {
    let cols = x.len();
    let rows = y.len();
    debug_assert_eq!(res.len(), rows);
    debug_assert_eq!(a.len(), rows * cols);
    for (row, out, bias) in multizip((0..rows, res, y)) {
        out.set(0.0);
        if row_disabled(row_bits, row) {
            continue;
        }
        for col in 0..cols {
            out.add(a[row * cols + col].get() * x[col].get());
        }
        out.add(bias.get());
    }
}

/// Row-major kernel whose partial sums are independent, so the eight
/// accumulators can be evaluated in parallel by the CPU.
pub fn gemv_row_optimized(
    res: &[HogwildF32],
    a: &[HogwildF32],
    x: &[HogwildF32],
    y: &[HogwildF32],
    row_bits: Option<&[u8]>,
) {
    let cols = x.len();
    let rows = y.len();
    debug_assert_eq!(res.len(), rows);
    debug_assert_eq!(a.len(), rows * cols);
    let extra = cols - cols % 8;
    let x_head = &x[..extra];
    for (row, out, bias) in multizip((0..rows, res, y)) {
        if row_disabled(row_bits, row) {
            out.set(0.0);
            continue;
        }
        let w = &a[row * cols..(row + 1) * cols];
        let mut psum = [0f32; 8];
        for (wc, xc) in w[..extra].chunks_exact(8).zip(x_head.chunks_exact(8)) {
            psum[0] += wc[0].get() * xc[0].get();
            psum[1] += wc[1].get() * xc[1].get();
            psum[2] += wc[2].get() * xc[2].get();
            psum[3] += wc[3].get() * xc[3].get();
            psum[4] += wc[4].get() * xc[4].get();
            psum[5] += wc[5].get() * xc[5].get();
            psum[6] += wc[6].get() * xc[6].get();
            psum[7] += wc[7].get() * xc[7].get();
        }
        let mut sum = psum[0] + psum[1] + psum[2] + psum[3];
        sum += psum[4] + psum[5] + psum[6] + psum[7];
        for col in extra..cols {
            sum += w[col].get() * x[col].get();
        }
        out.set(sum + bias.get());
    }
}

fn gemv_dense_row_sparse(
    res: &DenseVector,
    a: &DenseRowMatrix,
    x: &SparseVector,
    y: &DenseVector,
    row_bits: Option<&[u8]>,
) {
    debug_assert_eq!(res.size(), y.size());
    for row in 0..y.size() {
        res.set(row, 0.0);
        if row_disabled(row_bits, row) {
            continue;
        }
        for (col, val) in x.iter() {
            res.add(row, a.get(row, col) * val);
        }
        res.add(row, y.get(row));
    }
}

// TODO: column-major kernels could accumulate a whole column slice at once
// instead of going through `get`.
fn gemv_dense_col_dense(
    res: &DenseVector,
    a: &DenseColMatrix,
    x: &DenseVector,
    y: &DenseVector,
    row_bits: Option<&[u8]>,
) {
    let rows = y.size();
    debug_assert_eq!(res.size(), rows);
    res.fill(0.0);
    for col in 0..x.size() {
        let val = x.get(col);
        for row in 0..rows {
            if row_disabled(row_bits, row) {
                continue;
            }
            res.add(row, a.get(row, col) * val);
        }
    }
    add_bias(res, y, row_bits);
}

fn gemv_dense_col_sparse(
    res: &DenseVector,
    a: &DenseColMatrix,
    x: &SparseVector,
    y: &DenseVector,
    row_bits: Option<&[u8]>,
) {
    let rows = y.size();
    debug_assert_eq!(res.size(), rows);
    res.fill(0.0);
    for (col, val) in x.iter() {
        for row in 0..rows {
            if row_disabled(row_bits, row) {
                continue;
            }
            res.add(row, a.get(row, col) * val);
        }
    }
    add_bias(res, y, row_bits);
}

fn gemv_sparse_row(
    res: &DenseVector,
    a: &SparseRowMatrix,
    x: &Vector,
    y: &DenseVector,
    row_bits: Option<&[u8]>,
) {
    debug_assert_eq!(res.size(), y.size());
    for row in 0..y.size() {
        res.set(row, 0.0);
        if row_disabled(row_bits, row) {
            continue;
        }
        // Only the stored columns of this row can contribute.
        for (&col, &w) in a.row(row) {
            let val = x.get(col);
            if val != 0.0 {
                res.add(row, w * val);
            }
        }
        res.add(row, y.get(row));
    }
}

fn gemv_sparse_col(
    res: &DenseVector,
    a: &SparseColMatrix,
    x: &Vector,
    y: &DenseVector,
    row_bits: Option<&[u8]>,
) {
    debug_assert_eq!(res.size(), y.size());
    res.fill(0.0);
    for col in 0..a.cols() {
        let val = x.get(col);
        if val == 0.0 {
            continue;
        }
        for (&row, &w) in a.col(col) {
            if row_disabled(row_bits, row) {
                continue;
            }
            res.add(row, w * val);
        }
    }
    add_bias(res, y, row_bits);
}

fn add_bias(res: &DenseVector, y: &DenseVector, row_bits: Option<&[u8]>) {
    for row in 0..y.size() {
        if row_disabled(row_bits, row) {
            continue;
        }
        res.add(row, y.get(row));
    }
}
