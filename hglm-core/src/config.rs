//! Fit configuration and its validation against a training frame.

use serde::{Deserialize, Serialize};

use hglm_frame::Frame;

use crate::error::{HglmError, Result};

/// How rows with missing predictor values are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MissingValuesHandling {
    /// Drop the row from fitting; predict NaN for it.
    Skip,
    /// Replace a missing numeric value by the training mean and a missing
    /// level by the training mode.
    MeanImputation,
}

/// What the EM driver does when the updated T matrix is not positive
/// semidefinite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PsdPolicy {
    /// Discard the candidate and stop with the last committed state.
    Stop,
    /// Log a warning and keep iterating.
    Warn,
}

/// Configuration for an HGLM fit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HglmConfig {
    /// Response column (numeric).
    pub response_column: String,
    /// Grouping column (categorical); one random effect per level.
    pub group_column: String,
    /// Predictors that also get a random slope per group.
    pub random_columns: Vec<String>,
    /// Add a random intercept per group.
    pub random_intercept: bool,
    /// One indicator per level instead of dropping the first level.
    pub use_all_factor_levels: bool,
    /// Columns excluded from the design.
    pub ignored_columns: Vec<String>,
    pub weights_column: Option<String>,
    pub offset_column: Option<String>,
    pub missing_values_handling: MissingValuesHandling,
    /// Relative change below which the EM loop is converged.
    pub em_epsilon: f64,
    /// EM iteration budget; 0 returns the initial guess.
    pub max_iterations: usize,
    /// Initial beta (length p, intercept last).
    pub initial_fixed_effects: Option<Vec<f64>>,
    /// Initial random effects, one row of length q per group.
    pub initial_random_effects: Option<Vec<Vec<f64>>>,
    /// Initial q x q random-effect covariance.
    pub initial_t_matrix: Option<Vec<Vec<f64>>>,
    /// Diagonal of the initial T when no matrix is given (0 = derive).
    pub tau_u_var_init: f64,
    /// Initial noise variance (0 = derive from OLS).
    pub tau_e_var_init: f64,
    /// Seed for the random initial effects.
    pub seed: u64,
    pub score_each_iteration: bool,
    /// Score the validation frame every this many iterations.
    pub score_iteration_interval: usize,
    pub psd_policy: PsdPolicy,
    /// Keep the global fixed matrices and vectors on the model.
    pub show_fixed_mat_vecs: bool,
}

impl Default for HglmConfig {
    fn default() -> Self {
        Self {
            response_column: String::new(),
            group_column: String::new(),
            random_columns: Vec::new(),
            random_intercept: true,
            use_all_factor_levels: false,
            ignored_columns: Vec::new(),
            weights_column: None,
            offset_column: None,
            missing_values_handling: MissingValuesHandling::MeanImputation,
            em_epsilon: 1e-3,
            max_iterations: 1000,
            initial_fixed_effects: None,
            initial_random_effects: None,
            initial_t_matrix: None,
            tau_u_var_init: 0.0,
            tau_e_var_init: 0.0,
            seed: 12345,
            score_each_iteration: false,
            score_iteration_interval: 5,
            psd_policy: PsdPolicy::Stop,
            show_fixed_mat_vecs: false,
        }
    }
}

impl HglmConfig {
    pub fn new(response_column: impl Into<String>, group_column: impl Into<String>) -> Self {
        Self {
            response_column: response_column.into(),
            group_column: group_column.into(),
            ..Default::default()
        }
    }

    /// True when `name` is the response, weights or offset column, or ignored.
    pub fn is_special_column(&self, name: &str) -> bool {
        name == self.response_column
            || self.weights_column.as_deref() == Some(name)
            || self.offset_column.as_deref() == Some(name)
            || self.ignored_columns.iter().any(|c| c == name)
    }

    /// Check the configuration against the training frame's columns.
    pub fn validate(&self, frame: &Frame) -> Result<()> {
        if self.response_column.is_empty() {
            return Err(HglmError::config("response_column", "must be set"));
        }
        let response = frame.find(&self.response_column).ok_or_else(|| {
            HglmError::config(
                "response_column",
                format!("column '{}' not found", self.response_column),
            )
        })?;
        if frame.meta(response).is_categorical() {
            return Err(HglmError::config(
                "response_column",
                format!("'{}' must be numeric for a Gaussian model", self.response_column),
            ));
        }

        if self.group_column.is_empty() {
            return Err(HglmError::config("group_column", "must be set"));
        }
        let group = frame.find(&self.group_column).ok_or_else(|| {
            HglmError::config("group_column", format!("column '{}' not found", self.group_column))
        })?;
        if !frame.meta(group).is_categorical() {
            return Err(HglmError::config(
                "group_column",
                format!("'{}' must be categorical", self.group_column),
            ));
        }
        if frame.meta(group).cardinality() == 0 {
            return Err(HglmError::config(
                "group_column",
                format!("'{}' has no levels", self.group_column),
            ));
        }
        if self.is_special_column(&self.group_column) {
            return Err(HglmError::config(
                "group_column",
                "must not be the response, weights, offset or an ignored column",
            ));
        }

        if self.random_columns.is_empty() && !self.random_intercept {
            return Err(HglmError::config(
                "random_columns",
                "no random effects: give random columns or enable random_intercept",
            ));
        }
        for (i, name) in self.random_columns.iter().enumerate() {
            if frame.find(name).is_none() {
                return Err(HglmError::config(
                    "random_columns",
                    format!("column '{}' not found", name),
                ));
            }
            if *name == self.group_column || self.is_special_column(name) {
                return Err(HglmError::config(
                    "random_columns",
                    format!("'{}' cannot be a random column", name),
                ));
            }
            if self.random_columns[..i].contains(name) {
                return Err(HglmError::config(
                    "random_columns",
                    format!("'{}' listed more than once", name),
                ));
            }
        }

        for (field, column) in [
            ("weights_column", &self.weights_column),
            ("offset_column", &self.offset_column),
        ] {
            if let Some(name) = column {
                let idx = frame
                    .find(name)
                    .ok_or_else(|| HglmError::config(field, format!("column '{}' not found", name)))?;
                if frame.meta(idx).is_categorical() {
                    return Err(HglmError::config(field, format!("'{}' must be numeric", name)));
                }
                if *name == self.response_column {
                    return Err(HglmError::config(field, "must differ from the response column"));
                }
            }
        }

        if !(self.em_epsilon.is_finite() && self.em_epsilon >= 0.0) {
            return Err(HglmError::config("em_epsilon", "must be a non-negative number"));
        }
        if !(self.tau_u_var_init.is_finite() && self.tau_u_var_init >= 0.0) {
            return Err(HglmError::config("tau_u_var_init", "must be non-negative"));
        }
        if !(self.tau_e_var_init.is_finite() && self.tau_e_var_init >= 0.0) {
            return Err(HglmError::config("tau_e_var_init", "must be non-negative"));
        }
        if self.score_iteration_interval == 0 {
            return Err(HglmError::config("score_iteration_interval", "must be at least 1"));
        }
        Ok(())
    }

    /// Check user-supplied initial values against the design dimensions.
    pub fn validate_initial_values(&self, p: usize, q: usize, n_groups: usize) -> Result<()> {
        if let Some(beta) = &self.initial_fixed_effects {
            if beta.len() != p {
                return Err(HglmError::config(
                    "initial_fixed_effects",
                    format!("expected {} values (intercept last), got {}", p, beta.len()),
                ));
            }
        }
        if let Some(ubeta) = &self.initial_random_effects {
            if ubeta.len() != n_groups || ubeta.iter().any(|row| row.len() != q) {
                return Err(HglmError::config(
                    "initial_random_effects",
                    format!("expected {} rows of length {}", n_groups, q),
                ));
            }
        }
        if let Some(t) = &self.initial_t_matrix {
            if t.len() != q || t.iter().any(|row| row.len() != q) {
                return Err(HglmError::config(
                    "initial_t_matrix",
                    format!("expected a {}x{} matrix", q, q),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hglm_frame::FrameBuilder;

    fn frame() -> Frame {
        FrameBuilder::new()
            .categorical("clinic", &["a", "b", "a"])
            .numeric("age", vec![30.0, 41.0, 52.0])
            .numeric("w", vec![1.0, 1.0, 2.0])
            .numeric("y", vec![1.0, 2.0, 3.0])
            .build()
            .unwrap()
    }

    fn field_of(err: HglmError) -> &'static str {
        match err {
            HglmError::Config { field, .. } => field,
            other => panic!("expected config error, got {other}"),
        }
    }

    #[test]
    fn test_defaults() {
        let config = HglmConfig::default();
        assert!(config.random_intercept);
        assert!(!config.use_all_factor_levels);
        assert_eq!(config.em_epsilon, 1e-3);
        assert_eq!(config.max_iterations, 1000);
        assert_eq!(config.score_iteration_interval, 5);
        assert_eq!(config.missing_values_handling, MissingValuesHandling::MeanImputation);
        assert_eq!(config.psd_policy, PsdPolicy::Stop);
    }

    #[test]
    fn test_valid_config_passes() {
        let mut config = HglmConfig::new("y", "clinic");
        config.random_columns = vec!["age".into()];
        config.weights_column = Some("w".into());
        config.validate(&frame()).unwrap();
    }

    #[test]
    fn test_group_column_must_be_categorical() {
        let config = HglmConfig::new("y", "age");
        assert_eq!(field_of(config.validate(&frame()).unwrap_err()), "group_column");
    }

    #[test]
    fn test_missing_group_column() {
        let config = HglmConfig::new("y", "site");
        assert_eq!(field_of(config.validate(&frame()).unwrap_err()), "group_column");
    }

    #[test]
    fn test_requires_some_random_effect() {
        let mut config = HglmConfig::new("y", "clinic");
        config.random_intercept = false;
        assert_eq!(field_of(config.validate(&frame()).unwrap_err()), "random_columns");
    }

    #[test]
    fn test_unknown_random_and_weight_columns() {
        let mut config = HglmConfig::new("y", "clinic");
        config.random_columns = vec!["height".into()];
        assert_eq!(field_of(config.validate(&frame()).unwrap_err()), "random_columns");

        let mut config = HglmConfig::new("y", "clinic");
        config.weights_column = Some("weight".into());
        assert_eq!(field_of(config.validate(&frame()).unwrap_err()), "weights_column");
    }

    #[test]
    fn test_numeric_parameters() {
        let mut config = HglmConfig::new("y", "clinic");
        config.em_epsilon = -1.0;
        assert_eq!(field_of(config.validate(&frame()).unwrap_err()), "em_epsilon");

        let mut config = HglmConfig::new("y", "clinic");
        config.score_iteration_interval = 0;
        assert_eq!(
            field_of(config.validate(&frame()).unwrap_err()),
            "score_iteration_interval"
        );
    }

    #[test]
    fn test_initial_value_shapes() {
        let mut config = HglmConfig::new("y", "clinic");
        config.initial_fixed_effects = Some(vec![0.0; 3]);
        config.initial_t_matrix = Some(vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
        config.validate_initial_values(3, 2, 2).unwrap();
        assert_eq!(
            field_of(config.validate_initial_values(4, 2, 2).unwrap_err()),
            "initial_fixed_effects"
        );
        assert_eq!(
            field_of(config.validate_initial_values(3, 1, 2).unwrap_err()),
            "initial_t_matrix"
        );
    }
}
