//! The fitted HGLM: coefficients, diagnostics and row scoring.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use hglm_frame::{Frame, RowView};
use hglm_linalg::vector;

use crate::config::HglmConfig;
use crate::design::DesignLayout;
use crate::em::Termination;
use crate::error::Result;
use crate::history::ScoringHistory;
use crate::metrics::HglmMetrics;
use crate::state::EmState;
use crate::stats::{GlobalStats, GroupStats};

/// Global and per-group fixed matrices and vectors, kept for inspection
/// when `show_fixed_mat_vecs` is set.
#[derive(Debug, Clone)]
pub struct FixedMatVecs {
    pub global: GlobalStats,
    pub groups: Vec<GroupStats>,
}

/// A fitted Gaussian HGLM.
#[derive(Debug, Clone)]
pub struct HglmModel {
    pub(crate) config: HglmConfig,
    pub(crate) layout: DesignLayout,
    /// Zero-row copy of the training frame, for adapting scoring frames.
    pub(crate) schema: Frame,
    pub(crate) state: EmState,
    pub(crate) termination: Termination,
    pub(crate) training_metrics: Option<HglmMetrics>,
    pub(crate) validation_metrics: Option<HglmMetrics>,
    pub(crate) training_history: ScoringHistory,
    pub(crate) validation_history: ScoringHistory,
    pub(crate) fixed_mat_vecs: Option<FixedMatVecs>,
}

impl HglmModel {
    pub fn config(&self) -> &HglmConfig {
        &self.config
    }

    pub fn layout(&self) -> &DesignLayout {
        &self.layout
    }

    /// Final EM state.
    pub fn state(&self) -> &EmState {
        &self.state
    }

    pub fn termination(&self) -> &Termination {
        &self.termination
    }

    pub fn iterations(&self) -> usize {
        self.termination.iterations()
    }

    pub fn training_metrics(&self) -> Option<&HglmMetrics> {
        self.training_metrics.as_ref()
    }

    pub fn validation_metrics(&self) -> Option<&HglmMetrics> {
        self.validation_metrics.as_ref()
    }

    pub fn training_history(&self) -> &ScoringHistory {
        &self.training_history
    }

    pub fn validation_history(&self) -> &ScoringHistory {
        &self.validation_history
    }

    pub fn fixed_mat_vecs(&self) -> Option<&FixedMatVecs> {
        self.fixed_mat_vecs.as_ref()
    }

    /// Fixed coefficients by name, in design order (intercept last).
    pub fn coefficients(&self) -> Vec<(String, f64)> {
        self.layout
            .fixed_names()
            .iter()
            .cloned()
            .zip(self.state.beta().iter().copied())
            .collect()
    }

    pub fn coefficient(&self, name: &str) -> Option<f64> {
        let idx = self.layout.fixed_names().iter().position(|n| n == name)?;
        self.state.beta().get(idx).copied()
    }

    /// Random coefficients of every group, keyed by group name. Each vector
    /// is ordered like [`DesignLayout::random_names`].
    pub fn random_coefficients(&self) -> Vec<(String, Vec<f64>)> {
        self.layout
            .group_names()
            .iter()
            .cloned()
            .zip(self.state.ubeta().iter().cloned())
            .collect()
    }

    /// Prediction `xᵗβ + zᵗu_group + offset` for a row of a frame adapted
    /// to the training frame.
    ///
    /// NaN when the group is missing or unknown, or when a predictor is
    /// missing under `MissingValuesHandling::Skip`; 0 for zero-weight rows.
    /// A missing offset counts as 0.
    pub fn predict_row(&self, row: &RowView<'_>) -> f64 {
        let layout = &self.layout;
        let Some(u) = layout
            .group_index(row)
            .and_then(|j| self.state.ubeta().get(j))
        else {
            return f64::NAN;
        };
        if layout.weight(row) == 0.0 {
            return 0.0;
        }
        if !layout.predictors_usable(row) {
            return f64::NAN;
        }
        let mut x = vec![0.0; layout.p()];
        let mut z = vec![0.0; layout.q()];
        layout.extract_fixed(row, &mut x);
        layout.extract_random(row, &mut z);
        let offset = layout.offset(row);
        let offset = if offset.is_nan() { 0.0 } else { offset };
        vector::dot(&x, self.state.beta()) + vector::dot(&z, u) + offset
    }

    /// Score every row of `frame`, in row order.
    pub fn predict(&self, frame: &Frame) -> Result<Vec<f64>> {
        let adapted = frame.adapt_to(&self.schema)?;
        let chunks: Vec<Vec<f64>> = adapted
            .partitions()
            .par_iter()
            .map(|part| part.rows().map(|row| self.predict_row(&row)).collect())
            .collect();
        Ok(chunks.concat())
    }

    /// Human-readable description of the fit.
    pub fn model_summary(&self) -> String {
        let state = &self.state;
        let mut out = format!(
            "HGLM (Gaussian, identity link)\n\
             Response: {}\n\
             Group column: {} ({} groups)\n\
             Fixed coefficients: {}\n\
             Random coefficients: {}\n\
             EM: {}\n\
             Noise variance (tau_e): {:.6}\n",
            self.config.response_column,
            self.config.group_column,
            self.layout.n_groups(),
            self.layout.p(),
            self.layout.random_names().join(", "),
            self.termination,
            state.tau_e_var(),
        );
        out.push_str("T matrix:\n");
        out.push_str(&state.t_mat().to_string());
        out.push_str("Fixed effects:\n");
        for (name, value) in self.coefficients() {
            out.push_str(&format!("  {:<24} {:>14.6}\n", name, value));
        }
        for (label, metrics) in [
            ("Training", &self.training_metrics),
            ("Validation", &self.validation_metrics),
        ] {
            if let Some(m) = metrics {
                out.push_str(&format!(
                    "{} metrics: n={}, RMSE={:.6}, log-likelihood={:.6}, ICC=[{}]\n",
                    label,
                    m.n_obs,
                    m.rmse,
                    m.log_likelihood,
                    m.icc
                        .iter()
                        .map(|v| format!("{:.4}", v))
                        .collect::<Vec<_>>()
                        .join(", ")
                ));
            }
        }
        out
    }

    /// Serializable snapshot of the fit.
    pub fn report(&self) -> ModelReport {
        ModelReport {
            response_column: self.config.response_column.clone(),
            group_column: self.config.group_column.clone(),
            termination: self.termination.to_string(),
            iterations: self.iterations(),
            converged: self.termination.is_converged(),
            fixed_coefficients: self
                .coefficients()
                .into_iter()
                .map(|(name, value)| NamedCoefficient { name, value })
                .collect(),
            random_names: self.layout.random_names().to_vec(),
            random_coefficients: self
                .random_coefficients()
                .into_iter()
                .map(|(group, values)| GroupCoefficients { group, values })
                .collect(),
            t_matrix: self.state.t_mat().to_rows(),
            tau_e_var: self.state.tau_e_var(),
            training_metrics: self.training_metrics.clone(),
            validation_metrics: self.validation_metrics.clone(),
            training_history: self.training_history.clone(),
            validation_history: self.validation_history.clone(),
            config: self.config.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedCoefficient {
    pub name: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupCoefficients {
    pub group: String,
    pub values: Vec<f64>,
}

/// JSON-friendly view of a fitted model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelReport {
    pub response_column: String,
    pub group_column: String,
    pub termination: String,
    pub iterations: usize,
    pub converged: bool,
    pub fixed_coefficients: Vec<NamedCoefficient>,
    pub random_names: Vec<String>,
    pub random_coefficients: Vec<GroupCoefficients>,
    pub t_matrix: Vec<Vec<f64>>,
    pub tau_e_var: f64,
    pub training_metrics: Option<HglmMetrics>,
    pub validation_metrics: Option<HglmMetrics>,
    pub training_history: ScoringHistory,
    pub validation_history: ScoringHistory,
    pub config: HglmConfig,
}
