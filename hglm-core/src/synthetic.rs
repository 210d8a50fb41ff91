//! Synthetic grouped data from known HGLM parameters.
//!
//! Predictors `x1..xk` are standard normal; group `j` gets a random effect
//! `u_j ~ N(0, T)` on the first `q − 1` predictors plus an intercept
//! (last), and `y = xᵗβ + zᵗu_j + e` with `e ~ N(0, tau_e)`.

use rand::distributions::Distribution;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use statrs::distribution::Normal;

use hglm_frame::{Frame, FrameBuilder};
use hglm_linalg::decomposition::CholeskyDecomp;
use hglm_linalg::{vector, DenseMatrix};

use crate::config::HglmConfig;
use crate::error::{HglmError, Result};

pub const GROUP_COLUMN: &str = "group";
pub const RESPONSE_COLUMN: &str = "y";

/// Parameters of a synthetic dataset.
#[derive(Debug, Clone)]
pub struct SyntheticSpec {
    pub n_groups: usize,
    pub rows_per_group: usize,
    /// Fixed effects for `x1..xk` followed by the intercept.
    pub beta: Vec<f64>,
    /// Random-effect covariance (q x q), intercept last.
    pub t_mat: Vec<Vec<f64>>,
    pub tau_e: f64,
    pub seed: u64,
    pub chunk_rows: usize,
}

impl Default for SyntheticSpec {
    fn default() -> Self {
        Self {
            n_groups: 20,
            rows_per_group: 50,
            beta: vec![1.5, -0.75, 2.0],
            t_mat: vec![vec![0.5, 0.1], vec![0.1, 1.0]],
            tau_e: 0.25,
            seed: 42,
            chunk_rows: 256,
        }
    }
}

/// Generated frame plus the random effects actually drawn.
#[derive(Debug, Clone)]
pub struct SyntheticData {
    pub frame: Frame,
    pub ubeta: Vec<Vec<f64>>,
}

impl SyntheticSpec {
    /// Number of numeric predictors.
    pub fn n_predictors(&self) -> usize {
        self.beta.len().saturating_sub(1)
    }

    pub fn predictor_names(&self) -> Vec<String> {
        (1..=self.n_predictors()).map(|k| format!("x{}", k)).collect()
    }

    /// A configuration that fits the generating model.
    pub fn config(&self) -> HglmConfig {
        let mut config = HglmConfig::new(RESPONSE_COLUMN, GROUP_COLUMN);
        let n_slopes = self.t_mat.len().saturating_sub(1);
        config.random_columns = self.predictor_names().into_iter().take(n_slopes).collect();
        config
    }

    fn check(&self) -> Result<DenseMatrix> {
        if self.beta.is_empty() {
            return Err(HglmError::config("beta", "needs at least the intercept"));
        }
        if self.n_groups == 0 || self.rows_per_group == 0 {
            return Err(HglmError::config("n_groups", "groups and rows per group must be positive"));
        }
        let q = self.t_mat.len();
        if q == 0 || self.t_mat.iter().any(|row| row.len() != q) {
            return Err(HglmError::config("t_mat", "must be a non-empty square matrix"));
        }
        if q - 1 > self.n_predictors() {
            return Err(HglmError::config(
                "t_mat",
                format!("{} random slopes but only {} predictors", q - 1, self.n_predictors()),
            ));
        }
        if !(self.tau_e.is_finite() && self.tau_e > 0.0) {
            return Err(HglmError::config("tau_e", "must be positive"));
        }
        let t = DenseMatrix::from_rows(&self.t_mat);
        let chol = CholeskyDecomp::new(&t)
            .map_err(|e| HglmError::config("t_mat", format!("must be positive definite: {}", e)))?;
        Ok(chol.l)
    }

    /// Draw the dataset.
    pub fn generate(&self) -> Result<SyntheticData> {
        let l = self.check()?;
        let q = l.nrows();
        let k = self.n_predictors();
        let n = self.n_groups * self.rows_per_group;
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let std_normal = Normal::new(0.0, 1.0).map_err(|e| HglmError::config("seed", e.to_string()))?;
        let noise = Normal::new(0.0, self.tau_e.sqrt()).map_err(|e| HglmError::config("tau_e", e.to_string()))?;

        let ubeta: Vec<Vec<f64>> = (0..self.n_groups)
            .map(|_| {
                let draws: Vec<f64> = (0..q).map(|_| std_normal.sample(&mut rng)).collect();
                l.mat_vec(&draws)
            })
            .collect();

        let mut xs = vec![Vec::with_capacity(n); k];
        let mut codes = Vec::with_capacity(n);
        let mut y = Vec::with_capacity(n);
        let mut x = vec![0.0; k + 1];
        let mut z = vec![0.0; q];
        for (j, u) in ubeta.iter().enumerate() {
            for _ in 0..self.rows_per_group {
                for (slot, column) in x.iter_mut().zip(xs.iter_mut()) {
                    *slot = std_normal.sample(&mut rng);
                    column.push(*slot);
                }
                x[k] = 1.0;
                z[..q - 1].copy_from_slice(&x[..q - 1]);
                z[q - 1] = 1.0;
                y.push(vector::dot(&x, &self.beta) + vector::dot(&z, u) + noise.sample(&mut rng));
                codes.push(Some(j as u32));
            }
        }

        let width = self.n_groups.to_string().len();
        let domain = (0..self.n_groups)
            .map(|j| format!("g{:0width$}", j, width = width))
            .collect();
        let mut builder = FrameBuilder::new()
            .categorical_codes(GROUP_COLUMN, domain, codes)
            .chunk_rows(self.chunk_rows.max(1));
        for (name, values) in self.predictor_names().iter().zip(xs) {
            builder = builder.numeric(name, values);
        }
        let frame = builder.numeric(RESPONSE_COLUMN, y).build()?;
        Ok(SyntheticData { frame, ubeta })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_shape_and_determinism() {
        let spec = SyntheticSpec {
            n_groups: 12,
            rows_per_group: 5,
            ..Default::default()
        };
        let a = spec.generate().unwrap();
        let b = spec.generate().unwrap();
        assert_eq!(a.frame.n_rows(), 60);
        assert_eq!(a.frame.column_names(), vec!["group", "x1", "x2", "y"]);
        assert_eq!(a.frame.meta(0).domain[0], "g00");
        assert_eq!(a.frame.level(0, 59), Some(11));
        assert_eq!(a.ubeta.len(), 12);
        assert_eq!(a.ubeta, b.ubeta);
        assert_eq!(a.frame.numeric_values(3), b.frame.numeric_values(3));
    }

    #[test]
    fn test_config_matches_layout() {
        let spec = SyntheticSpec::default();
        let config = spec.config();
        assert_eq!(config.random_columns, vec!["x1"]);
        assert_eq!(config.group_column, GROUP_COLUMN);
    }

    #[test]
    fn test_rejects_bad_t() {
        let spec = SyntheticSpec {
            t_mat: vec![vec![1.0, 2.0], vec![2.0, 1.0]],
            ..Default::default()
        };
        assert!(matches!(spec.generate(), Err(HglmError::Config { field: "t_mat", .. })));

        let spec = SyntheticSpec {
            t_mat: vec![vec![1.0; 4]; 4],
            ..Default::default()
        };
        assert!(spec.generate().is_err());
    }
}
