#![allow(clippy::needless_range_loop)]
//! Dense matrix type backed by faer.
//!
//! Wraps faer's `Mat<f64>` with the handful of operations the EM engine
//! needs: products, symmetric rank-1 accumulation, elementwise arithmetic,
//! and the shape/symmetry checks used when committing a new state.

use faer::Mat;

/// A dense matrix wrapper around faer's `Mat<f64>`.
#[derive(Debug, Clone)]
pub struct DenseMatrix {
    inner: Mat<f64>,
}

impl DenseMatrix {
    /// Create a new dense matrix filled with zeros.
    pub fn zeros(nrows: usize, ncols: usize) -> Self {
        Self {
            inner: Mat::zeros(nrows, ncols),
        }
    }

    /// Create an identity matrix of size n x n.
    pub fn identity(n: usize) -> Self {
        Self::from_diag(&vec![1.0; n])
    }

    /// Create a diagonal matrix from a vector.
    pub fn from_diag(diag: &[f64]) -> Self {
        let n = diag.len();
        let inner = Mat::from_fn(n, n, |i, j| if i == j { diag[i] } else { 0.0 });
        Self { inner }
    }

    /// Create a dense matrix from a row-major slice.
    pub fn from_row_major(nrows: usize, ncols: usize, data: &[f64]) -> Self {
        assert_eq!(data.len(), nrows * ncols);
        let inner = Mat::from_fn(nrows, ncols, |i, j| data[i * ncols + j]);
        Self { inner }
    }

    /// Create a dense matrix from nested rows. All rows must have equal length.
    pub fn from_rows(rows: &[Vec<f64>]) -> Self {
        let nrows = rows.len();
        let ncols = rows.first().map_or(0, Vec::len);
        assert!(rows.iter().all(|r| r.len() == ncols), "ragged rows");
        let inner = Mat::from_fn(nrows, ncols, |i, j| rows[i][j]);
        Self { inner }
    }

    /// Number of rows.
    pub fn nrows(&self) -> usize {
        self.inner.nrows()
    }

    /// Number of columns.
    pub fn ncols(&self) -> usize {
        self.inner.ncols()
    }

    /// True when the matrix is square.
    pub fn is_square(&self) -> bool {
        self.nrows() == self.ncols()
    }

    /// Get element at (row, col).
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.inner.read(row, col)
    }

    /// Set element at (row, col).
    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        self.inner.write(row, col, value);
    }

    /// Get a reference to the underlying faer matrix.
    pub fn as_faer(&self) -> &Mat<f64> {
        &self.inner
    }

    /// Matrix-vector product: self * v.
    pub fn mat_vec(&self, v: &[f64]) -> Vec<f64> {
        assert_eq!(self.ncols(), v.len());
        let n = self.nrows();
        let mut result = vec![0.0; n];
        for j in 0..self.ncols() {
            let vj = v[j];
            if vj == 0.0 {
                continue;
            }
            for i in 0..n {
                result[i] += self.inner.read(i, j) * vj;
            }
        }
        result
    }

    /// Transposed matrix-vector product: self' * v, without forming self'.
    pub fn transpose_mat_vec(&self, v: &[f64]) -> Vec<f64> {
        assert_eq!(self.nrows(), v.len());
        let mut result = vec![0.0; self.ncols()];
        for j in 0..self.ncols() {
            let mut s = 0.0;
            for i in 0..self.nrows() {
                s += self.inner.read(i, j) * v[i];
            }
            result[j] = s;
        }
        result
    }

    /// Quadratic form v' * self * v.
    pub fn quadratic_form(&self, v: &[f64]) -> f64 {
        let mv = self.mat_vec(v);
        mv.iter().zip(v.iter()).map(|(a, b)| a * b).sum()
    }

    /// Matrix-matrix product: self * other.
    pub fn mat_mul(&self, other: &DenseMatrix) -> DenseMatrix {
        assert_eq!(self.ncols(), other.nrows());
        let result = &self.inner * &other.inner;
        DenseMatrix { inner: result }
    }

    /// Transpose.
    pub fn transpose(&self) -> DenseMatrix {
        let inner = self.inner.transpose().to_owned();
        DenseMatrix { inner }
    }

    /// Element-wise addition: self + other.
    pub fn add(&self, other: &DenseMatrix) -> DenseMatrix {
        self.assert_same_shape(other);
        let inner = Mat::from_fn(self.nrows(), self.ncols(), |i, j| {
            self.inner.read(i, j) + other.inner.read(i, j)
        });
        DenseMatrix { inner }
    }

    /// Element-wise subtraction: self - other.
    pub fn sub(&self, other: &DenseMatrix) -> DenseMatrix {
        self.assert_same_shape(other);
        let inner = Mat::from_fn(self.nrows(), self.ncols(), |i, j| {
            self.inner.read(i, j) - other.inner.read(i, j)
        });
        DenseMatrix { inner }
    }

    /// Scalar multiplication.
    pub fn scale(&self, s: f64) -> DenseMatrix {
        let inner = Mat::from_fn(self.nrows(), self.ncols(), |i, j| {
            self.inner.read(i, j) * s
        });
        DenseMatrix { inner }
    }

    /// In-place accumulation: self += other.
    pub fn add_assign(&mut self, other: &DenseMatrix) {
        self.assert_same_shape(other);
        for j in 0..self.ncols() {
            for i in 0..self.nrows() {
                let v = self.inner.read(i, j) + other.inner.read(i, j);
                self.inner.write(i, j, v);
            }
        }
    }

    /// In-place symmetric rank-1 update: self += v * v'.
    ///
    /// Only the upper triangle is computed; the lower one is mirrored so the
    /// result is exactly symmetric.
    pub fn add_outer_sym(&mut self, v: &[f64]) {
        let n = v.len();
        assert_eq!(self.nrows(), n);
        assert_eq!(self.ncols(), n);
        for i in 0..n {
            let vi = v[i];
            if vi == 0.0 {
                continue;
            }
            for j in i..n {
                let upd = vi * v[j];
                let cur = self.inner.read(i, j) + upd;
                self.inner.write(i, j, cur);
                if i != j {
                    self.inner.write(j, i, cur);
                }
            }
        }
    }

    /// In-place rank-1 update: self += a * b'.
    pub fn add_outer(&mut self, a: &[f64], b: &[f64]) {
        assert_eq!(self.nrows(), a.len());
        assert_eq!(self.ncols(), b.len());
        for i in 0..a.len() {
            let ai = a[i];
            if ai == 0.0 {
                continue;
            }
            for j in 0..b.len() {
                let cur = self.inner.read(i, j) + ai * b[j];
                self.inner.write(i, j, cur);
            }
        }
    }

    /// Sum of the diagonal.
    pub fn trace(&self) -> f64 {
        self.diag().iter().sum()
    }

    /// Diagonal of a square matrix.
    pub fn diag(&self) -> Vec<f64> {
        let n = self.nrows().min(self.ncols());
        (0..n).map(|i| self.inner.read(i, i)).collect()
    }

    /// Largest absolute entry (0 for an empty matrix).
    pub fn max_abs(&self) -> f64 {
        let mut m = 0.0f64;
        for j in 0..self.ncols() {
            for i in 0..self.nrows() {
                m = m.max(self.inner.read(i, j).abs());
            }
        }
        m
    }

    /// True when the matrix is square and `|a_ij - a_ji| <= tol * max(1, max_abs)`.
    pub fn is_symmetric(&self, tol: f64) -> bool {
        if !self.is_square() {
            return false;
        }
        let bound = tol * self.max_abs().max(1.0);
        for i in 0..self.nrows() {
            for j in (i + 1)..self.ncols() {
                if (self.inner.read(i, j) - self.inner.read(j, i)).abs() > bound {
                    return false;
                }
            }
        }
        true
    }

    /// Replace the matrix with (A + A') / 2.
    pub fn symmetrize(&mut self) {
        assert!(self.is_square());
        let n = self.nrows();
        for i in 0..n {
            for j in (i + 1)..n {
                let avg = 0.5 * (self.inner.read(i, j) + self.inner.read(j, i));
                self.inner.write(i, j, avg);
                self.inner.write(j, i, avg);
            }
        }
    }

    /// True if every entry is finite.
    pub fn is_finite(&self) -> bool {
        (0..self.ncols()).all(|j| (0..self.nrows()).all(|i| self.inner.read(i, j).is_finite()))
    }

    /// Extract row as a Vec<f64>.
    pub fn row(&self, i: usize) -> Vec<f64> {
        (0..self.ncols()).map(|j| self.inner.read(i, j)).collect()
    }

    /// Copy out as nested rows.
    pub fn to_rows(&self) -> Vec<Vec<f64>> {
        (0..self.nrows()).map(|i| self.row(i)).collect()
    }

    fn assert_same_shape(&self, other: &DenseMatrix) {
        assert_eq!(self.nrows(), other.nrows());
        assert_eq!(self.ncols(), other.ncols());
    }
}

impl PartialEq for DenseMatrix {
    fn eq(&self, other: &Self) -> bool {
        self.nrows() == other.nrows()
            && self.ncols() == other.ncols()
            && (0..self.ncols())
                .all(|j| (0..self.nrows()).all(|i| self.get(i, j) == other.get(i, j)))
    }
}

impl std::fmt::Display for DenseMatrix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for i in 0..self.nrows() {
            for j in 0..self.ncols() {
                if j > 0 {
                    write!(f, "\t")?;
                }
                write!(f, "{:.6}", self.inner.read(i, j))?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
