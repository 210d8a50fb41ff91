//! Error taxonomy for HGLM fitting.
//!
//! Only fatal conditions are errors. Numerical trouble after at least one
//! committed EM iteration, loss of positive definiteness, cancellation and
//! budget exhaustion are terminal states of the driver (see
//! [`crate::em::Termination`]), not errors.

use hglm_frame::FrameError;
use hglm_linalg::LinalgError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HglmError {
    #[error("Invalid parameter '{field}': {message}")]
    Config { field: &'static str, message: String },

    #[error("Fixed-effect cross-product matrix is singular; check for collinear or constant predictors: {0}")]
    SingularFixedMatrix(#[source] LinalgError),

    #[error("No valid rows to fit (all rows have missing values or zero weight)")]
    NoValidRows,

    #[error("Numerical failure in EM iteration {iteration}; no usable model: {source}")]
    Numerical {
        iteration: usize,
        #[source]
        source: LinalgError,
    },

    #[error("Noise variance became non-positive ({value:e}) in EM iteration {iteration}")]
    NonPositiveNoiseVariance { iteration: usize, value: f64 },

    #[error("Job was cancelled before any model state existed")]
    Cancelled,

    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),
}

impl HglmError {
    pub(crate) fn config(field: &'static str, message: impl Into<String>) -> Self {
        HglmError::Config {
            field,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, HglmError>;
