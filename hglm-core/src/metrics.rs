//! Goodness-of-fit metrics for a training or validation frame.

use serde::{Deserialize, Serialize};

use hglm_frame::Frame;
use hglm_linalg::DenseMatrix;

use crate::design::DesignLayout;
use crate::error::Result;
use crate::job::JobHandle;
use crate::loglik::log_likelihood;
use crate::residual::{residual_pass, ResidualStats};
use crate::state::EmState;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HglmMetrics {
    pub n_obs: usize,
    /// Residual sum of squares given fixed and random effects.
    pub rss: f64,
    /// Residual sum of squares given the fixed effects only.
    pub fixed_rss: f64,
    pub mse: f64,
    pub rmse: f64,
    /// Noise variance of the model (tau_e).
    pub residual_variance: f64,
    /// Marginal log-likelihood; NaN when it could not be evaluated.
    pub log_likelihood: f64,
    /// Intra-class correlation per random coefficient, T_kk / (T_kk + tau_e).
    pub icc: Vec<f64>,
}

impl HglmMetrics {
    pub fn new(residuals: &ResidualStats, state: &EmState, log_likelihood: f64) -> Self {
        let mse = if residuals.n_obs > 0 {
            residuals.rss / residuals.n_obs as f64
        } else {
            f64::NAN
        };
        Self {
            n_obs: residuals.n_obs,
            rss: residuals.rss,
            fixed_rss: residuals.fixed_rss,
            mse,
            rmse: mse.sqrt(),
            residual_variance: state.tau_e_var(),
            log_likelihood,
            icc: icc(state.t_mat(), state.tau_e_var()),
        }
    }
}

/// T_kk / (T_kk + tau_e) for every diagonal entry of T.
pub fn icc(t_mat: &DenseMatrix, tau_e: f64) -> Vec<f64> {
    t_mat.diag().into_iter().map(|t| t / (t + tau_e)).collect()
}

/// Score `frame` with `state`: one residual pass plus the log-likelihood
/// from the frame's own per-group `ZᵗZ`.
pub fn evaluate(
    frame: &Frame,
    layout: &DesignLayout,
    state: &EmState,
    zt_z: &[DenseMatrix],
    job: &JobHandle,
) -> Result<HglmMetrics> {
    let residuals = residual_pass(frame, layout, state.beta(), state.ubeta(), job)?;
    let llh = log_likelihood(
        residuals.n_obs,
        state.t_mat(),
        state.tau_e_var(),
        zt_z,
        residuals.fixed_rss,
        &residuals.group_zt_resid,
    )
    .unwrap_or(f64::NAN);
    Ok(HglmMetrics::new(&residuals, state, llh))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_icc() {
        let t = DenseMatrix::from_diag(&[3.0, 1.0]);
        assert_eq!(icc(&t, 1.0), vec![0.75, 0.5]);
    }
}
