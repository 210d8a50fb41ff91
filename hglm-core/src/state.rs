//! EM state snapshots and the cell that commits them.

use std::sync::Arc;

use rand::distributions::Distribution;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use statrs::distribution::Normal;
use thiserror::Error;

use hglm_linalg::decomposition::{CholeskyDecomp, LuDecomp};
use hglm_linalg::{vector, DenseMatrix};

use crate::config::HglmConfig;
use crate::error::{HglmError, Result};
use crate::stats::GlobalStats;

/// Relative asymmetry tolerated in a committed T matrix.
pub const SYMMETRY_TOL: f64 = 1e-8;

/// Lower bound on a derived initial variance, relative to the mean squared
/// response.
const INITIAL_VARIANCE_FLOOR: f64 = 1e-6;

/// One set of EM parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct EmState {
    beta: Vec<f64>,
    ubeta: Vec<Vec<f64>>,
    t_mat: DenseMatrix,
    tau_e_var: f64,
    iteration: usize,
}

/// Parameters proposed by one EM iteration, not yet committed.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub beta: Vec<f64>,
    pub ubeta: Vec<Vec<f64>>,
    pub t_mat: DenseMatrix,
    pub tau_e_var: f64,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CommitError {
    #[error("Candidate shape differs from the committed state: {0}")]
    Shape(&'static str),

    #[error("Candidate T matrix is not symmetric")]
    Asymmetric,

    #[error("Candidate noise variance {0:e} is not positive")]
    NonPositiveNoise(f64),
}

impl EmState {
    pub fn beta(&self) -> &[f64] {
        &self.beta
    }

    /// Random effects, one row of length q per group.
    pub fn ubeta(&self) -> &[Vec<f64>] {
        &self.ubeta
    }

    pub fn t_mat(&self) -> &DenseMatrix {
        &self.t_mat
    }

    pub fn tau_e_var(&self) -> f64 {
        self.tau_e_var
    }

    /// Number of committed EM updates behind this state.
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    /// Initial guess from user values, falling back to the OLS fit of the
    /// fixed effects and draws from N(0, T_kk) for the random effects.
    pub fn initial(config: &HglmConfig, global: &GlobalStats, q: usize, n_groups: usize) -> Result<Self> {
        let p = global.af_t_y.len();
        config.validate_initial_values(p, q, n_groups)?;

        let beta = match &config.initial_fixed_effects {
            Some(beta) => beta.clone(),
            None => ols_beta(global).unwrap_or_else(|| vec![0.0; p]),
        };

        let tau_e_var = if config.tau_e_var_init > 0.0 {
            config.tau_e_var_init
        } else {
            residual_variance(global, &beta)
        };

        let t_mat = match &config.initial_t_matrix {
            Some(rows) => {
                let t = DenseMatrix::from_rows(rows);
                if !t.is_symmetric(SYMMETRY_TOL) || CholeskyDecomp::new(&t).is_err() {
                    return Err(HglmError::config(
                        "initial_t_matrix",
                        "must be symmetric positive definite",
                    ));
                }
                t
            }
            None if config.tau_u_var_init > 0.0 => DenseMatrix::from_diag(&vec![config.tau_u_var_init; q]),
            None => DenseMatrix::from_diag(&vec![tau_e_var; q]),
        };

        let ubeta = match &config.initial_random_effects {
            Some(ubeta) => ubeta.clone(),
            None => draw_random_effects(&t_mat, n_groups, config.seed)?,
        };

        Ok(Self {
            beta,
            ubeta,
            t_mat,
            tau_e_var,
            iteration: 0,
        })
    }
}

fn ols_beta(global: &GlobalStats) -> Option<Vec<f64>> {
    match &global.af_t_af_inv {
        Some(inv) => Some(inv.mat_vec(&global.af_t_y)),
        None => LuDecomp::new(&global.af_t_af)
            .ok()
            .map(|lu| lu.solve(&global.af_t_y)),
    }
}

/// (Σy² − 2βᵗΣAfᵗy + βᵗΣAfᵗAf β) / n, floored.
fn residual_variance(global: &GlobalStats, beta: &[f64]) -> f64 {
    let rss = global.sum_y2 - 2.0 * vector::dot(beta, &global.af_t_y)
        + global.af_t_af.quadratic_form(beta);
    let mean_sq = global.sum_y2 * global.one_over_n_obs;
    let floor = INITIAL_VARIANCE_FLOOR * if mean_sq > 0.0 { mean_sq } else { 1.0 };
    (rss * global.one_over_n_obs).max(floor)
}

fn draw_random_effects(t_mat: &DenseMatrix, n_groups: usize, seed: u64) -> Result<Vec<Vec<f64>>> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let normals = t_mat
        .diag()
        .into_iter()
        .map(|var| Normal::new(0.0, var.sqrt()))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| HglmError::config("initial_t_matrix", format!("invalid diagonal: {e}")))?;
    Ok((0..n_groups)
        .map(|_| normals.iter().map(|n| n.sample(&mut rng)).collect())
        .collect())
}

/// Owner of the committed EM state.
///
/// Readers get an `Arc` to an immutable snapshot; a commit replaces the
/// whole snapshot, so a partially updated state is never observable.
#[derive(Debug)]
pub struct StateCell {
    current: Arc<EmState>,
}

impl StateCell {
    pub fn new(initial: EmState) -> Self {
        Self {
            current: Arc::new(initial),
        }
    }

    pub fn current(&self) -> Arc<EmState> {
        Arc::clone(&self.current)
    }

    /// Replace the state with `candidate` and bump the iteration count.
    /// Invalid candidates are rejected and leave the state untouched.
    pub fn commit(&mut self, candidate: Candidate) -> std::result::Result<Arc<EmState>, CommitError> {
        let current = &self.current;
        if candidate.beta.len() != current.beta.len() {
            return Err(CommitError::Shape("beta"));
        }
        if candidate.ubeta.len() != current.ubeta.len()
            || candidate
                .ubeta
                .iter()
                .zip(current.ubeta.iter())
                .any(|(a, b)| a.len() != b.len())
        {
            return Err(CommitError::Shape("ubeta"));
        }
        if candidate.t_mat.nrows() != current.t_mat.nrows() || !candidate.t_mat.is_square() {
            return Err(CommitError::Shape("T"));
        }
        if !candidate.t_mat.is_symmetric(SYMMETRY_TOL) {
            return Err(CommitError::Asymmetric);
        }
        if candidate.tau_e_var.is_nan() || candidate.tau_e_var <= 0.0 {
            return Err(CommitError::NonPositiveNoise(candidate.tau_e_var));
        }
        let iteration = current.iteration + 1;
        self.current = Arc::new(EmState {
            beta: candidate.beta,
            ubeta: candidate.ubeta,
            t_mat: candidate.t_mat,
            tau_e_var: candidate.tau_e_var,
            iteration,
        });
        Ok(self.current())
    }
}
