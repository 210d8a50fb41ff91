//! hglm-linalg: Linear algebra kernels for HGLM-RS
//!
//! Provides the dense matrix type, vector kernels, and the decompositions
//! (LU, Cholesky, symmetric eigenvalues) behind every matrix inverse,
//! determinant and definiteness check in the EM engine. Singular input is
//! always reported as an error rather than a garbage result.

pub mod decomposition;
pub mod dense;
pub mod vector;

pub use decomposition::LinalgError;
pub use dense::DenseMatrix;
