//! Dense row-major matrices and the handful of kernels the network needs.
//!
//! Every operation validates shapes up front and returns
//! [`Error::DimensionMismatch`] before touching any output, so a failed call never
//! leaves a half-written result behind.
//!
//! Matrix products go through one strided kernel (`gemm`) so that transposed
//! operands (`Aᵀ·B`, `A·Bᵀ`) are read in place instead of being materialized.

use std::ops::{Index, IndexMut};

use crate::{Error, Result};

/// Added to the softmax denominator so an all-underflow row cannot divide by zero.
pub const SOFTMAX_EPS: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    /// Row-major storage, `rows * cols` scalars.
    data: Vec<f64>,
}

impl Matrix {
    #[inline]
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    /// Wrap a flat row-major buffer with shape `(rows, cols)`.
    pub fn from_vec(rows: usize, cols: usize, data: Vec<f64>) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(Error::DimensionMismatch(format!(
                "buffer length {} does not match rows * cols ({rows} * {cols})",
                data.len()
            )));
        }
        Ok(Self { rows, cols, data })
    }

    /// Build from per-row vectors; every row must have the same length.
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self> {
        let cols = rows.first().map_or(0, Vec::len);
        let mut data = Vec::with_capacity(rows.len() * cols);
        for (i, row) in rows.iter().enumerate() {
            if row.len() != cols {
                return Err(Error::DimensionMismatch(format!(
                    "row {i} has len {}, expected {cols}",
                    row.len()
                )));
            }
            data.extend_from_slice(row);
        }
        Ok(Self {
            rows: rows.len(),
            cols,
            data,
        })
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    #[inline]
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }

    /// Returns row `i`. Panics if `i >= rows`.
    #[inline]
    pub fn row(&self, i: usize) -> &[f64] {
        let start = i * self.cols;
        &self.data[start..start + self.cols]
    }

    #[inline]
    pub fn row_mut(&mut self, i: usize) -> &mut [f64] {
        let start = i * self.cols;
        &mut self.data[start..start + self.cols]
    }

    pub fn iter_rows(&self) -> impl Iterator<Item = &[f64]> {
        // `chunks_exact(0)` panics, and a zero-width matrix still has `rows` (empty) rows.
        (0..self.rows).map(move |i| self.row(i))
    }

    pub fn transpose(&self) -> Matrix {
        let mut t = Matrix::zeros(self.cols, self.rows);
        for i in 0..self.rows {
            for j in 0..self.cols {
                t.data[j * self.rows + i] = self.data[i * self.cols + j];
            }
        }
        t
    }

    /// Multiply every element by `s`, in place.
    pub fn scale_mut(&mut self, s: f64) {
        for v in &mut self.data {
            *v *= s;
        }
    }

    fn ensure_same_shape(&self, other: &Matrix, what: &str) -> Result<()> {
        if self.shape() != other.shape() {
            return Err(Error::DimensionMismatch(format!(
                "{what}: shape {:?} does not match {:?}",
                self.shape(),
                other.shape()
            )));
        }
        Ok(())
    }
}

impl Index<(usize, usize)> for Matrix {
    type Output = f64;

    #[inline]
    fn index(&self, (i, j): (usize, usize)) -> &f64 {
        debug_assert!(i < self.rows && j < self.cols);
        &self.data[i * self.cols + j]
    }
}

impl IndexMut<(usize, usize)> for Matrix {
    #[inline]
    fn index_mut(&mut self, (i, j): (usize, usize)) -> &mut f64 {
        debug_assert!(i < self.rows && j < self.cols);
        &mut self.data[i * self.cols + j]
    }
}

/// `C = alpha * op(A) * op(B) + beta * C` over arbitrary strides.
///
/// `op(A)` is `m x k`, `op(B)` is `k x n`. The loop order is `i, p, j` so the
/// innermost loop walks a row of `B` and a row of `C` when both are row-major.
#[allow(clippy::too_many_arguments)]
#[inline]
fn gemm(
    m: usize,
    n: usize,
    k: usize,
    alpha: f64,
    a: &[f64],
    rsa: usize,
    csa: usize,
    b: &[f64],
    rsb: usize,
    csb: usize,
    beta: f64,
    c: &mut [f64],
    rsc: usize,
    csc: usize,
) {
    if beta != 1.0 {
        for i in 0..m {
            for j in 0..n {
                let idx = i * rsc + j * csc;
                c[idx] = if beta == 0.0 { 0.0 } else { beta * c[idx] };
            }
        }
    }

    for i in 0..m {
        let a0 = i * rsa;
        let c0 = i * rsc;
        for p in 0..k {
            let av = alpha * a[a0 + p * csa];
            let b0 = p * rsb;
            for j in 0..n {
                c[c0 + j * csc] += av * b[b0 + j * csb];
            }
        }
    }
}

/// Standard matrix product `A · B`. Requires `A.cols == B.rows`.
pub fn dot(a: &Matrix, b: &Matrix) -> Result<Matrix> {
    if a.cols != b.rows {
        return Err(Error::DimensionMismatch(format!(
            "dot: A is {}x{}, B is {}x{} (A.cols must equal B.rows)",
            a.rows, a.cols, b.rows, b.cols
        )));
    }
    let mut c = Matrix::zeros(a.rows, b.cols);
    gemm(
        a.rows, b.cols, a.cols, 1.0, &a.data, a.cols, 1, &b.data, b.cols, 1, 0.0, &mut c.data,
        b.cols, 1,
    );
    Ok(c)
}

/// `Aᵀ · B` without materializing `Aᵀ`. Requires `A.rows == B.rows`.
pub fn dot_transpose_a(a: &Matrix, b: &Matrix) -> Result<Matrix> {
    if a.rows != b.rows {
        return Err(Error::DimensionMismatch(format!(
            "dot(Aᵀ, B): A is {}x{}, B is {}x{} (A.rows must equal B.rows)",
            a.rows, a.cols, b.rows, b.cols
        )));
    }
    let mut c = Matrix::zeros(a.cols, b.cols);
    gemm(
        a.cols, b.cols, a.rows, 1.0, &a.data, 1, a.cols, &b.data, b.cols, 1, 0.0, &mut c.data,
        b.cols, 1,
    );
    Ok(c)
}

/// `A · Bᵀ` without materializing `Bᵀ`. Requires `A.cols == B.cols`.
pub fn dot_transpose_b(a: &Matrix, b: &Matrix) -> Result<Matrix> {
    if a.cols != b.cols {
        return Err(Error::DimensionMismatch(format!(
            "dot(A, Bᵀ): A is {}x{}, B is {}x{} (A.cols must equal B.cols)",
            a.rows, a.cols, b.rows, b.cols
        )));
    }
    let mut c = Matrix::zeros(a.rows, b.rows);
    gemm(
        a.rows, b.rows, a.cols, 1.0, &a.data, a.cols, 1, &b.data, 1, b.cols, 0.0, &mut c.data,
        b.rows, 1,
    );
    Ok(c)
}

/// Broadcast `b` across every row of `A`. Requires `b.len() == A.cols`.
pub fn add_row_vector(a: &Matrix, b: &[f64]) -> Result<Matrix> {
    let mut out = a.clone();
    add_row_vector_mut(&mut out, b)?;
    Ok(out)
}

pub(crate) fn add_row_vector_mut(a: &mut Matrix, b: &[f64]) -> Result<()> {
    if b.len() != a.cols {
        return Err(Error::DimensionMismatch(format!(
            "add_row_vector: vector len {} does not match matrix cols {}",
            b.len(),
            a.cols
        )));
    }
    for i in 0..a.rows {
        for (v, &bj) in a.row_mut(i).iter_mut().zip(b) {
            *v += bj;
        }
    }
    Ok(())
}

/// Element-wise `max(0, x)`.
pub fn relu(x: &Matrix) -> Matrix {
    let mut y = Matrix::zeros(x.rows, x.cols);
    relu_kernel(x, &mut y);
    y
}

/// Element-wise `max(0, x)` into a caller-owned buffer of the same shape.
pub fn relu_into(x: &Matrix, out: &mut Matrix) -> Result<()> {
    x.ensure_same_shape(out, "relu_into")?;
    relu_kernel(x, out);
    Ok(())
}

#[inline]
fn relu_kernel(x: &Matrix, out: &mut Matrix) {
    for (y, &v) in out.data.iter_mut().zip(&x.data) {
        *y = v.max(0.0);
    }
}

/// Row-wise softmax.
///
/// Each row is shifted by its maximum before exponentiating and normalized by
/// `sum + SOFTMAX_EPS`.
pub fn softmax(x: &Matrix) -> Matrix {
    let mut y = x.clone();
    softmax_mut(&mut y);
    y
}

pub(crate) fn softmax_mut(x: &mut Matrix) {
    for i in 0..x.rows {
        let row = x.row_mut(i);
        let max = row.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mut sum = 0.0;
        for v in row.iter_mut() {
            *v = (*v - max).exp();
            sum += *v;
        }
        let denom = sum + SOFTMAX_EPS;
        for v in row.iter_mut() {
            *v /= denom;
        }
    }
}

/// Per-row index of the greatest value. Ties go to the lowest index.
pub fn argmax(x: &Matrix) -> Vec<usize> {
    x.iter_rows().map(argmax_row).collect()
}

#[inline]
pub(crate) fn argmax_row(row: &[f64]) -> usize {
    let mut best = f64::NEG_INFINITY;
    let mut arg = 0;
    for (j, &v) in row.iter().enumerate() {
        if v > best {
            best = v;
            arg = j;
        }
    }
    arg
}

/// Column-wise mean. A matrix with no rows yields zeros.
pub fn mean_cols(x: &Matrix) -> Vec<f64> {
    let mut out = vec![0.0; x.cols];
    if x.rows == 0 {
        return out;
    }
    for row in x.iter_rows() {
        for (acc, &v) in out.iter_mut().zip(row) {
            *acc += v;
        }
    }
    let inv_n = 1.0 / x.rows as f64;
    for v in &mut out {
        *v *= inv_n;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_abs_diff_eq;

    fn m(rows: &[&[f64]]) -> Matrix {
        Matrix::from_rows(&rows.iter().map(|r| r.to_vec()).collect::<Vec<_>>()).unwrap()
    }

    #[test]
    fn dot_computes_standard_product() {
        let a = m(&[&[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0]]);
        let b = m(&[&[7.0, 8.0], &[9.0, 10.0], &[11.0, 12.0]]);
        let c = dot(&a, &b).unwrap();
        assert_eq!(c, m(&[&[58.0, 64.0], &[139.0, 154.0]]));
    }

    #[test]
    fn dot_rejects_mismatched_inner_dims() {
        let a = Matrix::zeros(2, 3);
        let b = Matrix::zeros(2, 2);
        assert!(matches!(dot(&a, &b), Err(Error::DimensionMismatch(_))));
    }

    #[test]
    fn transposed_products_match_explicit_transpose() {
        let a = m(&[&[1.0, -2.0], &[0.5, 3.0], &[2.0, 1.0]]);
        let b = m(&[&[4.0, 1.0, 0.0], &[-1.0, 2.0, 5.0], &[3.0, 3.0, -2.0]]);

        let tn = dot_transpose_a(&a, &b).unwrap();
        assert_eq!(tn, dot(&a.transpose(), &b).unwrap());

        let c = m(&[&[1.0, 0.0], &[2.0, -1.0]]);
        let nt = dot_transpose_b(&a, &c).unwrap();
        assert_eq!(nt, dot(&a, &c.transpose()).unwrap());

        assert!(dot_transpose_a(&a, &c).is_err());
        assert!(dot_transpose_b(&a, &b).is_err());
    }

    #[test]
    fn add_row_vector_broadcasts_and_validates() {
        let a = m(&[&[1.0, 2.0], &[3.0, 4.0]]);
        let out = add_row_vector(&a, &[10.0, 20.0]).unwrap();
        assert_eq!(out, m(&[&[11.0, 22.0], &[13.0, 24.0]]));

        assert!(matches!(
            add_row_vector(&a, &[1.0, 2.0, 3.0]),
            Err(Error::DimensionMismatch(_))
        ));
    }

    #[test]
    fn relu_clamps_negatives() {
        let x = m(&[&[-1.0, 0.0, 2.5]]);
        assert_eq!(relu(&x), m(&[&[0.0, 0.0, 2.5]]));

        let mut out = Matrix::zeros(1, 3);
        relu_into(&x, &mut out).unwrap();
        assert_eq!(out, relu(&x));
        assert!(relu_into(&x, &mut Matrix::zeros(3, 1)).is_err());
    }

    #[test]
    fn softmax_rows_sum_to_one() {
        let x = m(&[
            &[1.0, 2.0, 3.0],
            &[1000.0, 1000.0, -1000.0],
            &[-745.0, -746.0, -750.0],
            &[0.0, 0.0, 0.0],
        ]);
        let p = softmax(&x);
        for row in p.iter_rows() {
            assert_abs_diff_eq!(row.iter().sum::<f64>(), 1.0, epsilon = 1e-9);
            assert!(row.iter().all(|v| v.is_finite() && *v >= 0.0));
        }
        assert_abs_diff_eq!(p[(3, 0)], 1.0 / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn argmax_of_softmax_matches_argmax_of_scores() {
        let x = m(&[
            &[0.1, 0.9, 0.3],
            &[-5.0, -1.0, -3.0],
            &[2.0, 2.0, 1.0],
            &[4.0, -1.0, 4.0],
        ]);
        assert_eq!(argmax(&x), vec![1, 1, 0, 0]);
        assert_eq!(argmax(&softmax(&x)), argmax(&x));
    }

    #[test]
    fn mean_cols_averages_each_column() {
        let x = m(&[&[1.0, 2.0], &[3.0, 6.0]]);
        assert_eq!(mean_cols(&x), vec![2.0, 4.0]);
        assert_eq!(mean_cols(&Matrix::zeros(0, 3)), vec![0.0; 3]);
    }

    #[test]
    fn from_rows_rejects_ragged_input() {
        let rows = vec![vec![1.0, 2.0], vec![3.0]];
        assert!(Matrix::from_rows(&rows).is_err());
        assert!(Matrix::from_vec(2, 2, vec![0.0; 3]).is_err());
    }
}
