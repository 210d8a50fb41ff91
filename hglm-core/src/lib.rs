//! hglm-core: EM fitting of Gaussian hierarchical GLMs for HGLM-RS
//!
//! Implements the design-row extraction, partitioned sufficient-statistics
//! accumulation, the EM driver with its per-group E-step, the marginal
//! log-likelihood, the fitted model with row scoring, and a synthetic-data
//! generator.

pub mod config;
pub mod design;
pub mod em;
pub mod error;
pub mod fit;
pub mod history;
pub mod job;
pub mod loglik;
pub mod mapreduce;
pub mod metrics;
pub mod model;
pub mod residual;
pub mod state;
pub mod stats;
pub mod synthetic;
pub mod util;

pub use config::{HglmConfig, MissingValuesHandling, PsdPolicy};
pub use em::{FailureReason, Termination};
pub use error::HglmError;
pub use fit::Hglm;
pub use job::JobHandle;
pub use model::{HglmModel, ModelReport};
