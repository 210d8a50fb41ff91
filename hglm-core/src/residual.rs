//! Residual pass: the data-dependent part of the noise-variance update and
//! of the log-likelihood, recomputed for every EM candidate.

use hglm_frame::{Frame, Partition};
use hglm_linalg::vector;

use crate::design::DesignLayout;
use crate::error::Result;
use crate::job::JobHandle;
use crate::mapreduce::{run_task, PartitionTask};

/// Residual sums of one pass, with `r = y − offset − xᵗβ`.
#[derive(Debug, Clone, PartialEq)]
pub struct ResidualStats {
    /// Σ (r − zᵗu_j)².
    pub rss: f64,
    /// Per-group share of `rss`.
    pub group_rss: Vec<f64>,
    /// Σ r².
    pub fixed_rss: f64,
    /// Per group Σ z r.
    pub group_zt_resid: Vec<Vec<f64>>,
    pub n_obs: usize,
}

impl ResidualStats {
    pub fn zeros(q: usize, n_groups: usize) -> Self {
        Self {
            rss: 0.0,
            group_rss: vec![0.0; n_groups],
            fixed_rss: 0.0,
            group_zt_resid: vec![vec![0.0; q]; n_groups],
            n_obs: 0,
        }
    }

    fn merge(mut self, other: &ResidualStats) -> Self {
        self.rss += other.rss;
        self.fixed_rss += other.fixed_rss;
        self.n_obs += other.n_obs;
        vector::add_assign(&mut self.group_rss, &other.group_rss);
        for (mine, theirs) in self.group_zt_resid.iter_mut().zip(&other.group_zt_resid) {
            vector::add_assign(mine, theirs);
        }
        self
    }
}

struct ResidualTask<'a> {
    layout: &'a DesignLayout,
    beta: &'a [f64],
    ubeta: &'a [Vec<f64>],
}

impl PartitionTask for ResidualTask<'_> {
    type Output = ResidualStats;

    fn identity(&self) -> ResidualStats {
        ResidualStats::zeros(self.layout.q(), self.layout.n_groups())
    }

    fn map(&self, partition: &Partition<'_>) -> ResidualStats {
        let layout = self.layout;
        let mut out = self.identity();
        let mut x = vec![0.0; layout.p()];
        let mut z = vec![0.0; layout.q()];
        for row in partition.rows() {
            if !layout.is_valid(&row) {
                continue;
            }
            let Some(j) = layout.group_index(&row) else {
                continue;
            };
            layout.extract_fixed(&row, &mut x);
            layout.extract_random(&row, &mut z);
            let r = layout.response(&row) - layout.offset(&row) - vector::dot(&x, self.beta);
            let e = r - vector::dot(&z, &self.ubeta[j]);
            out.rss += e * e;
            out.group_rss[j] += e * e;
            out.fixed_rss += r * r;
            vector::axpy(&mut out.group_zt_resid[j], r, &z);
            out.n_obs += 1;
        }
        out
    }

    fn reduce(&self, left: ResidualStats, right: ResidualStats) -> ResidualStats {
        left.merge(&right)
    }
}

/// Residual sums of `frame` under the coefficients `beta` and `ubeta`.
pub fn residual_pass(
    frame: &Frame,
    layout: &DesignLayout,
    beta: &[f64],
    ubeta: &[Vec<f64>],
    job: &JobHandle,
) -> Result<ResidualStats> {
    run_task(&ResidualTask { layout, beta, ubeta }, frame, job)
}
