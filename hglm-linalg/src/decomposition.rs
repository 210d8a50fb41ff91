#![allow(clippy::needless_range_loop)]
//! Matrix decompositions, inverses and determinants.
//!
//! LU with partial pivoting handles general square matrices (the global
//! fixed-effect cross-product and the random-effect covariance T);
//! Cholesky handles the per-group systems that are symmetric positive
//! definite by construction. Both refuse to produce a result when a pivot
//! collapses, so callers can tell "singular" apart from "solved".

use crate::dense::DenseMatrix;
use thiserror::Error;

/// Relative pivot tolerance below which a matrix is declared singular.
pub const SINGULAR_RTOL: f64 = 1e-12;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LinalgError {
    #[error("Matrix is not positive definite")]
    NotPositiveDefinite,

    #[error("Singular matrix encountered (pivot {pivot:.3e} at column {column})")]
    SingularMatrix { column: usize, pivot: f64 },

    #[error("Expected a square matrix, got {nrows}x{ncols}")]
    NotSquare { nrows: usize, ncols: usize },

    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Matrix contains non-finite entries")]
    NonFinite,
}

fn check_square(a: &DenseMatrix) -> Result<usize, LinalgError> {
    if !a.is_square() {
        return Err(LinalgError::NotSquare {
            nrows: a.nrows(),
            ncols: a.ncols(),
        });
    }
    if !a.is_finite() {
        return Err(LinalgError::NonFinite);
    }
    Ok(a.nrows())
}

/// Result of a Cholesky decomposition.
pub struct CholeskyDecomp {
    /// Lower triangular factor L such that A = L * L'.
    pub l: DenseMatrix,
}

impl CholeskyDecomp {
    /// Compute the Cholesky decomposition of a symmetric positive definite matrix.
    pub fn new(a: &DenseMatrix) -> Result<Self, LinalgError> {
        let n = check_square(a)?;
        let mut l = DenseMatrix::zeros(n, n);

        for j in 0..n {
            let mut sum = 0.0;
            for k in 0..j {
                sum += l.get(j, k) * l.get(j, k);
            }
            let diag = a.get(j, j) - sum;
            if diag <= 0.0 || !diag.is_finite() {
                return Err(LinalgError::NotPositiveDefinite);
            }
            l.set(j, j, diag.sqrt());

            for i in (j + 1)..n {
                let mut sum = 0.0;
                for k in 0..j {
                    sum += l.get(i, k) * l.get(j, k);
                }
                l.set(i, j, (a.get(i, j) - sum) / l.get(j, j));
            }
        }

        Ok(CholeskyDecomp { l })
    }

    /// Solve L * L' * x = b.
    pub fn solve(&self, b: &[f64]) -> Vec<f64> {
        let n = self.l.nrows();
        assert_eq!(b.len(), n);

        // Forward substitution: L * y = b
        let mut y = vec![0.0; n];
        for i in 0..n {
            let mut sum = 0.0;
            for j in 0..i {
                sum += self.l.get(i, j) * y[j];
            }
            y[i] = (b[i] - sum) / self.l.get(i, i);
        }

        // Backward substitution: L' * x = y
        let mut x = vec![0.0; n];
        for i in (0..n).rev() {
            let mut sum = 0.0;
            for j in (i + 1)..n {
                sum += self.l.get(j, i) * x[j];
            }
            x[i] = (y[i] - sum) / self.l.get(i, i);
        }

        x
    }

    /// Inverse of the original matrix, symmetrized.
    pub fn inverse(&self) -> DenseMatrix {
        let n = self.l.nrows();
        let mut inv = DenseMatrix::zeros(n, n);
        let mut e = vec![0.0; n];
        for j in 0..n {
            e.iter_mut().for_each(|v| *v = 0.0);
            e[j] = 1.0;
            let col = self.solve(&e);
            for i in 0..n {
                inv.set(i, j, col[i]);
            }
        }
        inv.symmetrize();
        inv
    }

    /// log det(A) = 2 * sum(log L_ii).
    pub fn ln_det(&self) -> f64 {
        2.0 * self.l.diag().iter().map(|d| d.ln()).sum::<f64>()
    }
}

/// LU decomposition with partial pivoting: P * A = L * U.
///
/// L (unit lower) and U are packed into a single matrix.
pub struct LuDecomp {
    lu: DenseMatrix,
    perm: Vec<usize>,
    /// +1 or -1 depending on the parity of the row permutation.
    sign: f64,
}

impl LuDecomp {
    /// Factorize a square matrix. Fails with `SingularMatrix` when a pivot is
    /// below `SINGULAR_RTOL` relative to the largest entry of `a`.
    pub fn new(a: &DenseMatrix) -> Result<Self, LinalgError> {
        let n = check_square(a)?;
        let scale = a.max_abs();
        let tol = SINGULAR_RTOL * scale;
        let mut lu = a.clone();
        let mut perm: Vec<usize> = (0..n).collect();
        let mut sign = 1.0;

        for k in 0..n {
            let mut pivot_row = k;
            let mut pivot_abs = lu.get(k, k).abs();
            for i in (k + 1)..n {
                let v = lu.get(i, k).abs();
                if v > pivot_abs {
                    pivot_abs = v;
                    pivot_row = i;
                }
            }
            if pivot_abs <= tol || scale == 0.0 {
                return Err(LinalgError::SingularMatrix {
                    column: k,
                    pivot: pivot_abs,
                });
            }
            if pivot_row != k {
                for j in 0..n {
                    let tmp = lu.get(k, j);
                    lu.set(k, j, lu.get(pivot_row, j));
                    lu.set(pivot_row, j, tmp);
                }
                perm.swap(k, pivot_row);
                sign = -sign;
            }
            let pivot = lu.get(k, k);
            for i in (k + 1)..n {
                let factor = lu.get(i, k) / pivot;
                lu.set(i, k, factor);
                if factor == 0.0 {
                    continue;
                }
                for j in (k + 1)..n {
                    let v = lu.get(i, j) - factor * lu.get(k, j);
                    lu.set(i, j, v);
                }
            }
        }

        Ok(LuDecomp { lu, perm, sign })
    }

    /// Solve A * x = b.
    pub fn solve(&self, b: &[f64]) -> Vec<f64> {
        let n = self.lu.nrows();
        assert_eq!(b.len(), n);

        let mut y: Vec<f64> = self.perm.iter().map(|&p| b[p]).collect();
        for i in 0..n {
            let mut sum = y[i];
            for j in 0..i {
                sum -= self.lu.get(i, j) * y[j];
            }
            y[i] = sum;
        }
        for i in (0..n).rev() {
            let mut sum = y[i];
            for j in (i + 1)..n {
                sum -= self.lu.get(i, j) * y[j];
            }
            y[i] = sum / self.lu.get(i, i);
        }
        y
    }

    /// A^{-1}, one column at a time.
    pub fn inverse(&self) -> DenseMatrix {
        let n = self.lu.nrows();
        let mut inv = DenseMatrix::zeros(n, n);
        let mut e = vec![0.0; n];
        for j in 0..n {
            e.iter_mut().for_each(|v| *v = 0.0);
            e[j] = 1.0;
            let col = self.solve(&e);
            for i in 0..n {
                inv.set(i, j, col[i]);
            }
        }
        inv
    }

    /// det(A).
    pub fn determinant(&self) -> f64 {
        self.lu.diag().iter().fold(self.sign, |acc, d| acc * d)
    }

    /// (sign, log|det(A)|), robust to under/overflow of the product.
    pub fn ln_abs_det(&self) -> (f64, f64) {
        let mut sign = self.sign;
        let mut ln = 0.0;
        for d in self.lu.diag() {
            if d < 0.0 {
                sign = -sign;
            }
            ln += d.abs().ln();
        }
        (sign, ln)
    }
}

/// Compute the inverse of a general square matrix.
pub fn inverse(a: &DenseMatrix) -> Result<DenseMatrix, LinalgError> {
    Ok(LuDecomp::new(a)?.inverse())
}

/// Compute the inverse of a symmetric positive definite matrix.
pub fn inverse_spd(a: &DenseMatrix) -> Result<DenseMatrix, LinalgError> {
    let chol = CholeskyDecomp::new(a)?;
    Ok(chol.inverse())
}

/// Determinant of a square matrix; 0 for a singular one.
pub fn determinant(a: &DenseMatrix) -> Result<f64, LinalgError> {
    match LuDecomp::new(a) {
        Ok(lu) => Ok(lu.determinant()),
        Err(LinalgError::SingularMatrix { .. }) => Ok(0.0),
        Err(e) => Err(e),
    }
}

/// Compute eigenvalues of a symmetric matrix.
/// Returns eigenvalues sorted in descending order.
pub fn symmetric_eigenvalues(a: &DenseMatrix) -> Result<Vec<f64>, LinalgError> {
    let n = check_square(a)?;

    let mat = a.as_faer();
    let eigen = mat.selfadjoint_eigendecomposition(faer::Side::Lower);
    let s = eigen.s();
    let mut evals: Vec<f64> = (0..n).map(|i| s.column_vector().read(i)).collect();
    evals.sort_by(|a, b| b.total_cmp(a));
    Ok(evals)
}

/// True when the symmetric matrix has no eigenvalue below
/// `-tol * max(1, largest |eigenvalue|)`.
pub fn is_positive_semidefinite(a: &DenseMatrix, tol: f64) -> Result<bool, LinalgError> {
    let evals = symmetric_eigenvalues(a)?;
    let scale = evals.iter().fold(1.0f64, |m, v| m.max(v.abs()));
    Ok(evals.iter().all(|&v| v >= -tol * scale))
}
