//! Top-level fitting entry point.

use tracing::{debug, info, warn};

use hglm_frame::Frame;
use hglm_linalg::DenseMatrix;

use crate::config::HglmConfig;
use crate::design::DesignLayout;
use crate::em::{EmDriver, EmOutcome, IterationReport, Termination};
use crate::error::{HglmError, Result};
use crate::history::ScoringHistory;
use crate::job::JobHandle;
use crate::loglik::log_likelihood;
use crate::metrics::{evaluate, HglmMetrics};
use crate::model::{FixedMatVecs, HglmModel};
use crate::state::EmState;
use crate::stats::{accumulate, GlobalStats};

/// Gaussian HGLM estimator.
#[derive(Debug, Clone)]
pub struct Hglm {
    config: HglmConfig,
}

/// Validation frame adapted to the training frame, with its own `ZᵗZ`.
struct Validation {
    frame: Frame,
    zt_z: Vec<DenseMatrix>,
}

impl Hglm {
    pub fn new(config: HglmConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &HglmConfig {
        &self.config
    }

    /// Fit on `train`, optionally scoring `valid` along the way.
    pub fn fit(&self, train: &Frame, valid: Option<&Frame>, job: &JobHandle) -> Result<HglmModel> {
        self.fit_with_observer(train, valid, job, |_| {})
    }

    /// Like [`Hglm::fit`], calling `observer` after every committed EM
    /// iteration.
    pub fn fit_with_observer<F>(
        &self,
        train: &Frame,
        valid: Option<&Frame>,
        job: &JobHandle,
        mut observer: F,
    ) -> Result<HglmModel>
    where
        F: FnMut(&IterationReport<'_>),
    {
        let config = &self.config;
        config.validate(train)?;
        let layout = DesignLayout::new(train, config)?;
        config.validate_initial_values(layout.p(), layout.q(), layout.n_groups())?;
        info!(
            "Fitting HGLM on {} rows: p={}, q={}, groups={}",
            train.n_rows(),
            layout.p(),
            layout.q(),
            layout.n_groups()
        );

        if job.stop_requested() {
            return Err(HglmError::Cancelled);
        }
        let stats = accumulate(train, &layout, job)?;
        let global = GlobalStats::from_groups(&stats, config.max_iterations > 0)?;
        let initial = EmState::initial(config, &global, layout.q(), layout.n_groups())?;
        debug!("Initial tau_e={:.6e}, beta={:?}", initial.tau_e_var(), initial.beta());

        let validation = match valid {
            Some(frame) => prepare_validation(frame, train, &layout, job)?,
            None => None,
        };

        let mut training_history = ScoringHistory::new();
        let mut validation_history = ScoringHistory::new();
        let outcome = match &global.af_t_af_inv {
            Some(inv) => {
                let driver = EmDriver::new(config, train, &layout, &stats, &global, inv, job);
                driver.run_with_observer(initial, |report| {
                    let iteration = report.state.iteration();
                    training_history.record(iteration, report.log_likelihood, report.state.tau_e_var());
                    if let Some(v) = &validation {
                        if config.score_each_iteration || iteration % config.score_iteration_interval == 0 {
                            match evaluate(&v.frame, &layout, report.state, &v.zt_z, job) {
                                Ok(m) => validation_history.record(iteration, m.log_likelihood, m.residual_variance),
                                Err(e) => debug!("Validation scoring skipped at iteration {}: {}", iteration, e),
                            }
                        }
                    }
                    observer(report);
                })?
            }
            None => EmOutcome {
                state: std::sync::Arc::new(initial),
                termination: Termination::BudgetExhausted { iterations: 0 },
                residuals: None,
            },
        };

        let state = (*outcome.state).clone();
        // metrics describe the final state whenever the loop ran, even if
        // it stopped before its first commit
        let scored = global.af_t_af_inv.is_some() && !job.stop_requested();
        let train_zt_z = stats.zt_z();
        let training_metrics = match &outcome.residuals {
            Some(residuals) => {
                let llh = log_likelihood(
                    residuals.n_obs,
                    state.t_mat(),
                    state.tau_e_var(),
                    &train_zt_z,
                    residuals.fixed_rss,
                    &residuals.group_zt_resid,
                )
                .unwrap_or(f64::NAN);
                Some(HglmMetrics::new(residuals, &state, llh))
            }
            None if scored => Some(evaluate(train, &layout, &state, &train_zt_z, job)?),
            None => None,
        };
        let validation_metrics = match &validation {
            Some(v) if scored => Some(evaluate(&v.frame, &layout, &state, &v.zt_z, job)?),
            _ => None,
        };
        if let Some(m) = &training_metrics {
            info!(
                "Training: log-likelihood={:.6}, tau_e={:.6e}, RMSE={:.6}",
                m.log_likelihood, m.residual_variance, m.rmse
            );
        }

        let fixed_mat_vecs = config.show_fixed_mat_vecs.then(|| FixedMatVecs {
            global: global.clone(),
            groups: stats.groups.clone(),
        });

        Ok(HglmModel {
            config: config.clone(),
            layout,
            schema: train.schema(),
            state,
            termination: outcome.termination,
            training_metrics,
            validation_metrics,
            training_history,
            validation_history,
            fixed_mat_vecs,
        })
    }
}

fn prepare_validation(
    frame: &Frame,
    train: &Frame,
    layout: &DesignLayout,
    job: &JobHandle,
) -> Result<Option<Validation>> {
    let adapted = frame.adapt_to(train)?;
    match accumulate(&adapted, layout, job) {
        Ok(stats) => Ok(Some(Validation {
            zt_z: stats.zt_z(),
            frame: adapted,
        })),
        Err(HglmError::NoValidRows) => {
            warn!("Validation frame has no valid rows; it will not be scored");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}
