//! Gaussian log-likelihood of the fitted model.
//!
//! Both evaluators work from the q x q per-group statistics only. With
//! `r_j = Z_jᵗ(y_j − offset_j − X_j β)` and
//! `M_j = (T⁻¹ + Z_jᵗZ_j / τ)⁻¹`, the scoring log-likelihood is
//!
//! ```text
//! −0.5 · ( Σ_j [ log(τ · det M_j · det T) + r_jᵗ M_j r_j / τ² ]
//!          + n log 2π + RSS_fixed / τ )
//! ```
//!
//! [`marginal_log_likelihood`] is the exact density of
//! `y_j ~ N(X_j β, τ I + Z_j T Z_jᵗ)`, from the determinant lemma
//! `log det V_j = n_j log τ + log det T − log det M_j` and the Woodbury
//! identity `r_jᵗ V_j⁻¹ r_j = RSS_j / τ − r_jᵗ M_j r_j / τ²`.

use std::f64::consts::PI;

use hglm_linalg::decomposition::{CholeskyDecomp, LuDecomp};
use hglm_linalg::{vector, DenseMatrix, LinalgError};

/// Per-group factor of `M_j⁻¹` plus the shared `log det T`.
struct GroupFactors {
    ln_det_t: f64,
    /// Cholesky factors of `T⁻¹ + Z_jᵗZ_j / τ`.
    m_inv: Vec<CholeskyDecomp>,
}

fn factor_groups(t_mat: &DenseMatrix, tau_e: f64, zt_z: &[DenseMatrix]) -> Result<GroupFactors, LinalgError> {
    if !(tau_e > 0.0 && tau_e.is_finite()) {
        return Err(LinalgError::NotPositiveDefinite);
    }
    let t_lu = LuDecomp::new(t_mat)?;
    let (sign, ln_det_t) = t_lu.ln_abs_det();
    if sign <= 0.0 {
        return Err(LinalgError::NotPositiveDefinite);
    }
    let t_inv = t_lu.inverse();
    let m_inv = zt_z
        .iter()
        .map(|ztz| CholeskyDecomp::new(&t_inv.add(&ztz.scale(1.0 / tau_e))))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(GroupFactors { ln_det_t, m_inv })
}

/// Scoring log-likelihood from per-group `ZᵗZ`, the fixed-effect residual
/// sum of squares and per-group `Zᵗr`. This is the value recorded in the
/// scoring histories and the training / validation metrics.
///
/// Fails when `T` is not positive definite or some `M_j⁻¹` cannot be
/// factored.
pub fn log_likelihood(
    n_obs: usize,
    t_mat: &DenseMatrix,
    tau_e: f64,
    zt_z: &[DenseMatrix],
    fixed_rss: f64,
    zt_resid: &[Vec<f64>],
) -> Result<f64, LinalgError> {
    let factors = factor_groups(t_mat, tau_e, zt_z)?;
    let inv_tau2 = 1.0 / (tau_e * tau_e);
    let mut total = n_obs as f64 * (2.0 * PI).ln() + fixed_rss / tau_e;
    for (chol, ztr) in factors.m_inv.iter().zip(zt_resid) {
        // log det M_j = −log det M_j⁻¹
        total += tau_e.ln() - chol.ln_det() + factors.ln_det_t;
        total += inv_tau2 * vector::dot(ztr, &chol.solve(ztr));
    }
    Ok(-0.5 * total)
}

/// Exact marginal log-density of the responses given `β`, `T` and `τ`,
/// from the same statistics as [`log_likelihood`].
pub fn marginal_log_likelihood(
    n_obs: usize,
    t_mat: &DenseMatrix,
    tau_e: f64,
    zt_z: &[DenseMatrix],
    fixed_rss: f64,
    zt_resid: &[Vec<f64>],
) -> Result<f64, LinalgError> {
    let factors = factor_groups(t_mat, tau_e, zt_z)?;
    let n = n_obs as f64;
    let mut det_term = n * tau_e.ln();
    let mut quad = fixed_rss / tau_e;
    let inv_tau2 = 1.0 / (tau_e * tau_e);
    for (chol, ztr) in factors.m_inv.iter().zip(zt_resid) {
        det_term += factors.ln_det_t + chol.ln_det();
        quad -= inv_tau2 * vector::dot(ztr, &chol.solve(ztr));
    }
    Ok(-0.5 * (n * (2.0 * PI).ln() + det_term + quad))
}
