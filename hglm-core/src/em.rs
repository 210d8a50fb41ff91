//! EM driver for the Gaussian HGLM.
//!
//! Each iteration starts from the committed state `(β, u, T, τ)`:
//!
//! 1. E-step, per group: `C_j⁻¹ = (ArjTArj + τ T⁻¹)⁻¹`,
//!    `u_j = C_j⁻¹ (ArjTYj − AfjTArjᵗ β)`.
//! 2. M-step: `β = (ΣAfTAf)⁻¹ (ΣAfjTYj − Σ_j AfjTArj u_j)`.
//! 3. `T = (Σ_j u_j u_jᵗ + τ Σ_j C_j⁻¹) / G`, symmetrized.
//! 4. Residual pass over the frame, `τ = RSS / n`.
//! 5. Positive-semidefiniteness of `I_G ⊗ T` (the eigenvalues of `T`).
//! 6. Stop on convergence, on the iteration budget or on a cancellation
//!    request, discarding the candidate; otherwise commit it.
//!
//! Numerical failures after at least one commit end the loop with the last
//! committed state; on the first iteration they are fatal.

use std::sync::Arc;

use rayon::prelude::*;
use tracing::{debug, info, warn};

use hglm_frame::Frame;
use hglm_linalg::decomposition::{inverse, is_positive_semidefinite};
use hglm_linalg::{vector, DenseMatrix, LinalgError};

use crate::config::{HglmConfig, PsdPolicy};
use crate::design::DesignLayout;
use crate::error::{HglmError, Result};
use crate::job::JobHandle;
use crate::loglik::log_likelihood;
use crate::residual::{residual_pass, ResidualStats};
use crate::state::{Candidate, EmState, StateCell};
use crate::stats::{GlobalStats, SufficientStats};

/// Denominator floor of the relative parameter changes.
pub const RELATIVE_CHANGE_FLOOR: f64 = 1e-10;

/// Eigenvalue tolerance (relative to the largest magnitude) of the PSD check.
pub const PSD_TOL: f64 = 1e-10;

#[derive(Debug, Clone, PartialEq)]
pub enum FailureReason {
    SingularMatrix(String),
    NonPositiveNoiseVariance,
    LostPositiveDefiniteness,
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::SingularMatrix(msg) => write!(f, "singular matrix: {}", msg),
            FailureReason::NonPositiveNoiseVariance => write!(f, "noise variance became non-positive"),
            FailureReason::LostPositiveDefiniteness => {
                write!(f, "random-effect covariance lost positive definiteness")
            }
        }
    }
}

/// How the EM loop ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Termination {
    Converged { iterations: usize },
    BudgetExhausted { iterations: usize },
    Cancelled { iterations: usize },
    Failed { iterations: usize, reason: FailureReason },
}

impl Termination {
    /// Committed EM iterations behind the final state.
    pub fn iterations(&self) -> usize {
        match self {
            Termination::Converged { iterations }
            | Termination::BudgetExhausted { iterations }
            | Termination::Cancelled { iterations }
            | Termination::Failed { iterations, .. } => *iterations,
        }
    }

    pub fn is_converged(&self) -> bool {
        matches!(self, Termination::Converged { .. })
    }
}

impl std::fmt::Display for Termination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Termination::Converged { iterations } => write!(f, "converged after {} iterations", iterations),
            Termination::BudgetExhausted { iterations } => {
                write!(f, "iteration budget exhausted after {} iterations", iterations)
            }
            Termination::Cancelled { iterations } => write!(f, "cancelled after {} iterations", iterations),
            Termination::Failed { iterations, reason } => {
                write!(f, "stopped after {} iterations: {}", iterations, reason)
            }
        }
    }
}

/// Relative max-magnitude changes between two successive states.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParameterChanges {
    pub beta: f64,
    pub ubeta: f64,
    pub t_mat: f64,
    pub tau_e: f64,
}

impl ParameterChanges {
    fn between(old: &EmState, new: &Candidate) -> Self {
        let ubeta_diff = old
            .ubeta()
            .iter()
            .zip(&new.ubeta)
            .map(|(a, b)| vector::max_abs(&vector::sub(a, b)))
            .fold(0.0, f64::max);
        let ubeta_old = old.ubeta().iter().map(|u| vector::max_abs(u)).fold(0.0, f64::max);
        Self {
            beta: relative(
                vector::max_abs(&vector::sub(old.beta(), &new.beta)),
                vector::max_abs(old.beta()),
            ),
            ubeta: relative(ubeta_diff, ubeta_old),
            t_mat: relative(old.t_mat().sub(&new.t_mat).max_abs(), old.t_mat().max_abs()),
            tau_e: relative((old.tau_e_var() - new.tau_e_var).abs(), old.tau_e_var().abs()),
        }
    }

    pub fn max(&self) -> f64 {
        self.beta.max(self.ubeta).max(self.t_mat).max(self.tau_e)
    }

    pub fn all_within(&self, epsilon: f64) -> bool {
        self.max() <= epsilon
    }
}

fn relative(diff: f64, reference: f64) -> f64 {
    diff / reference.max(RELATIVE_CHANGE_FLOOR)
}

/// What an observer sees after each commit.
#[derive(Debug)]
pub struct IterationReport<'a> {
    pub state: &'a EmState,
    pub residuals: &'a ResidualStats,
    /// Training log-likelihood of the committed state; NaN if unavailable.
    pub log_likelihood: f64,
    pub changes: ParameterChanges,
}

/// Final state and termination of a driver run.
#[derive(Debug, Clone)]
pub struct EmOutcome {
    pub state: Arc<EmState>,
    pub termination: Termination,
    /// Residual sums of the final committed state (absent before the first commit).
    pub residuals: Option<ResidualStats>,
}

/// Output of the E-step.
struct EStep {
    ubeta: Vec<Vec<f64>>,
    cj_inv: Vec<DenseMatrix>,
}

enum StepError {
    Cancelled,
    Numerical(LinalgError),
    NonPositiveNoise(f64),
}

/// A computed candidate with the residual pass that scored it.
struct Proposal {
    candidate: Candidate,
    residuals: ResidualStats,
}

/// The sequential EM control loop.
pub struct EmDriver<'a> {
    config: &'a HglmConfig,
    frame: &'a Frame,
    layout: &'a DesignLayout,
    stats: &'a SufficientStats,
    global: &'a GlobalStats,
    af_t_af_inv: &'a DenseMatrix,
    zt_z: Vec<DenseMatrix>,
    job: &'a JobHandle,
}

impl<'a> EmDriver<'a> {
    pub fn new(
        config: &'a HglmConfig,
        frame: &'a Frame,
        layout: &'a DesignLayout,
        stats: &'a SufficientStats,
        global: &'a GlobalStats,
        af_t_af_inv: &'a DenseMatrix,
        job: &'a JobHandle,
    ) -> Self {
        Self {
            config,
            frame,
            layout,
            stats,
            global,
            af_t_af_inv,
            zt_z: stats.zt_z(),
            job,
        }
    }

    /// Iterate from `initial` until convergence, budget exhaustion,
    /// cancellation or failure.
    pub fn run(&self, initial: EmState) -> Result<EmOutcome> {
        self.run_with_observer(initial, |_| {})
    }

    /// Like [`EmDriver::run`], calling `observer` after every commit.
    pub fn run_with_observer<F>(&self, initial: EmState, mut observer: F) -> Result<EmOutcome>
    where
        F: FnMut(&IterationReport<'_>),
    {
        let mut cell = StateCell::new(initial);
        let mut last_residuals = None;
        let max_iter = self.config.max_iterations;

        info!(
            "Starting EM with n={}, p={}, q={}, groups={}, max_iterations={}",
            self.global.n_obs,
            self.layout.p(),
            self.layout.q(),
            self.layout.n_groups(),
            max_iter
        );

        if max_iter == 0 {
            return Ok(self.finish(cell.current(), Termination::BudgetExhausted { iterations: 0 }, None));
        }

        loop {
            let current = cell.current();
            let committed = current.iteration();
            let iteration = committed + 1;

            if self.job.stop_requested() {
                return Ok(self.finish(current, Termination::Cancelled { iterations: committed }, last_residuals));
            }

            let Proposal { candidate, residuals } = match self.propose(&current) {
                Ok(proposal) => proposal,
                Err(err) => return self.fail(current, iteration, err, last_residuals),
            };

            let psd = match is_positive_semidefinite(&candidate.t_mat, PSD_TOL) {
                Ok(psd) => psd,
                Err(source) => {
                    return self.fail(current, iteration, StepError::Numerical(source), last_residuals)
                }
            };
            if !psd {
                warn!(
                    "Random-effect covariance is not positive semidefinite in EM iteration {}",
                    iteration
                );
                if self.config.psd_policy == PsdPolicy::Stop {
                    let termination = Termination::Failed {
                        iterations: committed,
                        reason: FailureReason::LostPositiveDefiniteness,
                    };
                    return Ok(self.finish(current, termination, last_residuals));
                }
            }

            let changes = ParameterChanges::between(&current, &candidate);
            if changes.all_within(self.config.em_epsilon) {
                return Ok(self.finish(current, Termination::Converged { iterations: committed }, last_residuals));
            }
            if iteration >= max_iter {
                warn!("EM did not converge within {} iterations", max_iter);
                return Ok(self.finish(
                    current,
                    Termination::BudgetExhausted { iterations: committed },
                    last_residuals,
                ));
            }
            if self.job.stop_requested() {
                return Ok(self.finish(current, Termination::Cancelled { iterations: committed }, last_residuals));
            }

            let llh = log_likelihood(
                residuals.n_obs,
                &candidate.t_mat,
                candidate.tau_e_var,
                &self.zt_z,
                residuals.fixed_rss,
                &residuals.group_zt_resid,
            );
            let llh = match llh {
                Ok(llh) => llh,
                // only an indefinite T kept under the warn policy gets here
                Err(_) if !psd => f64::NAN,
                Err(source) => {
                    return self.fail(current, iteration, StepError::Numerical(source), last_residuals)
                }
            };

            let state = match cell.commit(candidate) {
                Ok(state) => state,
                Err(err) => {
                    // propose() already rejects non-finite and non-positive values
                    debug!("Candidate rejected: {}", err);
                    return self.fail(
                        current,
                        iteration,
                        StepError::Numerical(LinalgError::NonFinite),
                        last_residuals,
                    );
                }
            };
            self.job.update(state.iteration());

            debug!(
                "EM iteration {}: tau_e={:.6e}, llh={:.6}, max change={:.3e} (beta {:.3e}, u {:.3e}, T {:.3e}, tau_e {:.3e})",
                state.iteration(),
                state.tau_e_var(),
                llh,
                changes.max(),
                changes.beta,
                changes.ubeta,
                changes.t_mat,
                changes.tau_e
            );
            observer(&IterationReport {
                state: &state,
                residuals: &residuals,
                log_likelihood: llh,
                changes,
            });
            last_residuals = Some(residuals);
        }
    }

    fn finish(
        &self,
        state: Arc<EmState>,
        termination: Termination,
        residuals: Option<ResidualStats>,
    ) -> EmOutcome {
        info!("EM {}", termination);
        EmOutcome {
            state,
            termination,
            residuals,
        }
    }

    /// Turn a failed iteration into a terminal state: fatal before the first
    /// commit, a soft stop on the last committed state afterwards.
    fn fail(
        &self,
        current: Arc<EmState>,
        iteration: usize,
        err: StepError,
        residuals: Option<ResidualStats>,
    ) -> Result<EmOutcome> {
        let committed = current.iteration();
        let reason = match err {
            StepError::Cancelled => {
                return Ok(self.finish(current, Termination::Cancelled { iterations: committed }, residuals))
            }
            StepError::Numerical(source) if committed == 0 => {
                return Err(HglmError::Numerical { iteration, source })
            }
            StepError::NonPositiveNoise(value) if committed == 0 => {
                return Err(HglmError::NonPositiveNoiseVariance { iteration, value })
            }
            StepError::Numerical(source) => FailureReason::SingularMatrix(source.to_string()),
            StepError::NonPositiveNoise(_) => FailureReason::NonPositiveNoiseVariance,
        };
        warn!(
            "EM iteration {} failed ({}); keeping the state of iteration {}",
            iteration, reason, committed
        );
        Ok(self.finish(
            current,
            Termination::Failed {
                iterations: committed,
                reason,
            },
            residuals,
        ))
    }

    /// E-step, M-step, T update and residual pass from `state`.
    fn propose(&self, state: &EmState) -> std::result::Result<Proposal, StepError> {
        let tau_e = state.tau_e_var();
        let e_step = e_step(self.stats, state.t_mat(), tau_e, state.beta()).map_err(StepError::Numerical)?;
        let beta = m_step(self.stats, self.global, self.af_t_af_inv, &e_step.ubeta);
        let t_mat = update_t(&e_step, tau_e, self.global.one_over_n_groups);
        let finite = t_mat.is_finite()
            && beta.iter().all(|b| b.is_finite())
            && e_step.ubeta.iter().flatten().all(|u| u.is_finite());
        if !finite {
            return Err(StepError::Numerical(LinalgError::NonFinite));
        }

        let residuals = residual_pass(self.frame, self.layout, &beta, &e_step.ubeta, self.job)
            .map_err(|_| StepError::Cancelled)?;
        let tau_e_new = residuals.rss / residuals.n_obs.max(1) as f64;
        if !(tau_e_new.is_finite() && tau_e_new > 0.0) {
            return Err(StepError::NonPositiveNoise(tau_e_new));
        }

        Ok(Proposal {
            candidate: Candidate {
                beta,
                ubeta: e_step.ubeta,
                t_mat,
                tau_e_var: tau_e_new,
            },
            residuals,
        })
    }
}

/// Per-group posterior covariances and random effects, in parallel over
/// groups with one output slot per group.
fn e_step(stats: &SufficientStats, t_mat: &DenseMatrix, tau_e: f64, beta: &[f64]) -> std::result::Result<EStep, LinalgError> {
    let t_inv_scaled = inverse(t_mat)?.scale(tau_e);
    let per_group: Vec<(Vec<f64>, DenseMatrix)> = stats
        .groups
        .par_iter()
        .map(|g| {
            let mut cj_inv = inverse(&g.ar_t_ar.add(&t_inv_scaled))?;
            cj_inv.symmetrize();
            let rhs = vector::sub(&g.ar_t_y, &g.af_t_ar.transpose_mat_vec(beta));
            Ok((cj_inv.mat_vec(&rhs), cj_inv))
        })
        .collect::<std::result::Result<_, LinalgError>>()?;
    let (ubeta, cj_inv) = per_group.into_iter().unzip();
    Ok(EStep { ubeta, cj_inv })
}

fn m_step(stats: &SufficientStats, global: &GlobalStats, af_t_af_inv: &DenseMatrix, ubeta: &[Vec<f64>]) -> Vec<f64> {
    let mut rhs = global.af_t_y.clone();
    for (g, u) in stats.groups.iter().zip(ubeta) {
        let adj = g.af_t_ar.mat_vec(u);
        vector::axpy(&mut rhs, -1.0, &adj);
    }
    af_t_af_inv.mat_vec(&rhs)
}

fn update_t(e_step: &EStep, tau_e: f64, one_over_n_groups: f64) -> DenseMatrix {
    let q = e_step.ubeta.first().map_or(0, Vec::len);
    let mut sum_uu = DenseMatrix::zeros(q, q);
    let mut sum_c = DenseMatrix::zeros(q, q);
    for (u, c) in e_step.ubeta.iter().zip(&e_step.cj_inv) {
        sum_uu.add_outer_sym(u);
        sum_c.add_assign(c);
    }
    let mut t = sum_uu.add(&sum_c.scale(tau_e)).scale(one_over_n_groups);
    t.symmetrize();
    t
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::{accumulate, GroupStats};
    use hglm_frame::FrameBuilder;

    fn one_group_stats() -> SufficientStats {
        // two rows, random intercept only: z = [1], x = [1]
        let mut g = GroupStats::zeros(1, 1);
        g.af_t_af = DenseMatrix::from_diag(&[2.0]);
        g.ar_t_ar = DenseMatrix::from_diag(&[2.0]);
        g.af_t_ar = DenseMatrix::from_diag(&[2.0]);
        g.af_t_y = vec![6.0];
        g.ar_t_y = vec![6.0];
        g.n_obs = 2;
        SufficientStats {
            groups: vec![g],
            sum_y2: 20.0,
            n_obs: 2,
            sum_w: 2.0,
        }
    }

    #[test]
    fn test_e_step_shrinks_towards_zero() {
        let stats = one_group_stats();
        let t = DenseMatrix::from_diag(&[1.0]);
        // C⁻¹ = (2 + 1·1)⁻¹ = 1/3, u = (6 − 2·2)/3
        let e = e_step(&stats, &t, 1.0, &[2.0]).unwrap();
        assert!((e.cj_inv[0].get(0, 0) - 1.0 / 3.0).abs() < 1e-12);
        assert!((e.ubeta[0][0] - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_m_step_and_t_update() {
        let stats = one_group_stats();
        let global = GlobalStats::from_groups(&stats, true).unwrap();
        let inv = global.af_t_af_inv.clone().unwrap();
        let beta = m_step(&stats, &global, &inv, &[vec![1.0]]);
        // (6 − 2·1) / 2
        assert!((beta[0] - 2.0).abs() < 1e-12);

        let e = EStep {
            ubeta: vec![vec![1.0]],
            cj_inv: vec![DenseMatrix::from_diag(&[0.5])],
        };
        let t = update_t(&e, 2.0, 1.0);
        assert!((t.get(0, 0) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_e_step_singular_t() {
        let stats = one_group_stats();
        let t = DenseMatrix::zeros(1, 1);
        assert!(e_step(&stats, &t, 1.0, &[0.0]).is_err());
    }

    #[test]
    fn test_relative_change_floor() {
        assert_eq!(relative(0.0, 0.0), 0.0);
        assert_eq!(relative(1e-12, 0.0), 1e-12 / RELATIVE_CHANGE_FLOOR);
        assert_eq!(relative(0.5, 2.0), 0.25);
    }

    #[test]
    fn test_termination_iterations() {
        let t = Termination::Failed {
            iterations: 3,
            reason: FailureReason::LostPositiveDefiniteness,
        };
        assert_eq!(t.iterations(), 3);
        assert!(!t.is_converged());
        assert!(Termination::Converged { iterations: 1 }.is_converged());
        assert!(t.to_string().contains("positive definiteness"));
    }

    /// One group of two rows with a fixed and a random intercept.
    fn two_row_frame(y: &[f64]) -> Frame {
        FrameBuilder::new()
            .categorical("g", &["a", "a"])
            .numeric("y", y.to_vec())
            .build()
            .unwrap()
    }

    /// Statistics with `ArTAr = a` and no fixed/random coupling, so β stays
    /// at 0 and u stays at 0 while T and τ evolve.
    fn decoupled_stats(a: f64, sum_y2: f64) -> SufficientStats {
        let mut g = GroupStats::zeros(1, 1);
        g.af_t_af = DenseMatrix::from_diag(&[2.0]);
        g.ar_t_ar = DenseMatrix::from_diag(&[a]);
        g.n_obs = 2;
        SufficientStats {
            groups: vec![g],
            sum_y2,
            n_obs: 2,
            sum_w: 2.0,
        }
    }

    fn unit_start_config() -> HglmConfig {
        let mut config = HglmConfig::new("y", "g");
        config.em_epsilon = 0.0;
        config.max_iterations = 50;
        config.initial_fixed_effects = Some(vec![0.0]);
        config.initial_random_effects = Some(vec![vec![0.0]]);
        config.initial_t_matrix = Some(vec![vec![1.0]]);
        config.tau_e_var_init = 1.0;
        config
    }

    fn drive(
        config: &HglmConfig,
        frame: &Frame,
        stats: &SufficientStats,
        observed: &mut Vec<EmState>,
    ) -> Result<EmOutcome> {
        let layout = DesignLayout::new(frame, config)?;
        let global = GlobalStats::from_groups(stats, true)?;
        let inv = global.af_t_af_inv.clone().unwrap();
        let initial = EmState::initial(config, &global, layout.q(), layout.n_groups())?;
        let job = JobHandle::new();
        EmDriver::new(config, frame, &layout, stats, &global, &inv, &job)
            .run_with_observer(initial, |report| observed.push(report.state.clone()))
    }

    #[test]
    fn test_perfect_fit_is_fatal_on_first_iteration() {
        // y is constant, so the first step reproduces it exactly and RSS = 0
        let frame = two_row_frame(&[3.0, 3.0]);
        let config = HglmConfig::new("y", "g");
        let layout = DesignLayout::new(&frame, &config).unwrap();
        let stats = accumulate(&frame, &layout, &JobHandle::new()).unwrap();
        let mut observed = Vec::new();
        let err = drive(&config, &frame, &stats, &mut observed).unwrap_err();
        match err {
            HglmError::NonPositiveNoiseVariance { iteration, value } => {
                assert_eq!(iteration, 1);
                assert_eq!(value, 0.0);
            }
            other => panic!("unexpected error: {}", other),
        }
        assert!(observed.is_empty());
    }

    #[test]
    fn test_numerical_failure_is_fatal_on_first_iteration() {
        // T = 2, τ = 0.64: T⁻¹ + ArTAr/τ = 0.5 − 0.78 is not positive
        let frame = two_row_frame(&[0.8, -0.8]);
        let stats = decoupled_stats(-0.5, 1.28);
        let mut observed = Vec::new();
        let err = drive(&unit_start_config(), &frame, &stats, &mut observed).unwrap_err();
        assert!(
            matches!(err, HglmError::Numerical { iteration: 1, .. }),
            "unexpected error: {}",
            err
        );
        assert!(observed.is_empty());
    }

    #[test]
    fn test_failure_after_commit_keeps_last_state() {
        // iteration 1: T = 2, τ = 1.44, T⁻¹ + ArTAr/τ > 0 and is committed;
        // iteration 2: T = 1.44 / 0.22, T⁻¹ + ArTAr/τ < 0
        let frame = two_row_frame(&[1.2, -1.2]);
        let stats = decoupled_stats(-0.5, 2.88);
        let mut observed = Vec::new();
        let outcome = drive(&unit_start_config(), &frame, &stats, &mut observed).unwrap();

        assert!(
            matches!(
                outcome.termination,
                Termination::Failed {
                    iterations: 1,
                    reason: FailureReason::SingularMatrix(_)
                }
            ),
            "{}",
            outcome.termination
        );
        assert_eq!(observed.len(), 1);
        assert_eq!(*outcome.state, observed[0]);
        assert_eq!(outcome.state.iteration(), 1);
        assert!((outcome.state.t_mat().get(0, 0) - 2.0).abs() < 1e-12);
        assert!((outcome.state.tau_e_var() - 1.44).abs() < 1e-12);
        let residuals = outcome.residuals.unwrap();
        assert_eq!(residuals.n_obs, 2);
        assert!((residuals.rss - 2.88).abs() < 1e-12);
    }

    #[test]
    fn test_lost_positive_definiteness_stops_softly() {
        // ArTAr + τT⁻¹ = −0.5, so the first T update is −2
        let frame = two_row_frame(&[1.2, -1.2]);
        let stats = decoupled_stats(-1.5, 2.88);
        let mut observed = Vec::new();
        let outcome = drive(&unit_start_config(), &frame, &stats, &mut observed).unwrap();

        assert_eq!(
            outcome.termination,
            Termination::Failed {
                iterations: 0,
                reason: FailureReason::LostPositiveDefiniteness,
            }
        );
        assert!(observed.is_empty());
        assert_eq!(outcome.state.iteration(), 0);
        assert_eq!(outcome.state.t_mat().get(0, 0), 1.0);
        assert!(outcome.residuals.is_none());
    }

    #[test]
    fn test_warn_policy_keeps_iterating() {
        let frame = two_row_frame(&[1.2, -1.2]);
        let stats = decoupled_stats(-1.5, 2.88);
        let mut config = unit_start_config();
        config.psd_policy = PsdPolicy::Warn;
        config.max_iterations = 3;
        let layout = DesignLayout::new(&frame, &config).unwrap();
        let global = GlobalStats::from_groups(&stats, true).unwrap();
        let inv = global.af_t_af_inv.clone().unwrap();
        let initial = EmState::initial(&config, &global, 1, 1).unwrap();
        let job = JobHandle::new();
        let mut llh = Vec::new();
        let outcome = EmDriver::new(&config, &frame, &layout, &stats, &global, &inv, &job)
            .run_with_observer(initial, |report| llh.push(report.log_likelihood))
            .unwrap();

        assert_eq!(outcome.termination, Termination::BudgetExhausted { iterations: 2 });
        assert_eq!(llh.len(), 2);
        assert!(llh.iter().all(|v| v.is_nan()));
        assert!(outcome.state.t_mat().get(0, 0) < 0.0);
    }
}
