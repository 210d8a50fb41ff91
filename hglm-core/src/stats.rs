//! Per-group sufficient statistics and their global post-processing.
//!
//! One pass over the frame collects, for every group `j`, the cross
//! products of the fixed design `Af`, the random design `Ar` and the
//! offset-adjusted response `y`. They depend only on the data and the
//! layout, so they are computed once per fit (and once per scored frame).

use hglm_frame::{Frame, Partition};
use hglm_linalg::decomposition::inverse;
use hglm_linalg::{vector, DenseMatrix};
use tracing::debug;

use crate::design::DesignLayout;
use crate::error::{HglmError, Result};
use crate::job::JobHandle;
use crate::mapreduce::{run_task, PartitionTask};

/// Cross products of one group.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupStats {
    /// AfjTAfj (p x p).
    pub af_t_af: DenseMatrix,
    /// ArjTArj (q x q).
    pub ar_t_ar: DenseMatrix,
    /// AfjTArj (p x q).
    pub af_t_ar: DenseMatrix,
    /// AfjTYj (p).
    pub af_t_y: Vec<f64>,
    /// ArjTYj (q).
    pub ar_t_y: Vec<f64>,
    pub n_obs: usize,
}

impl GroupStats {
    pub fn zeros(p: usize, q: usize) -> Self {
        Self {
            af_t_af: DenseMatrix::zeros(p, p),
            ar_t_ar: DenseMatrix::zeros(q, q),
            af_t_ar: DenseMatrix::zeros(p, q),
            af_t_y: vec![0.0; p],
            ar_t_y: vec![0.0; q],
            n_obs: 0,
        }
    }

    fn add_row(&mut self, x: &[f64], z: &[f64], y: f64) {
        self.af_t_af.add_outer_sym(x);
        self.ar_t_ar.add_outer_sym(z);
        self.af_t_ar.add_outer(x, z);
        vector::axpy(&mut self.af_t_y, y, x);
        vector::axpy(&mut self.ar_t_y, y, z);
        self.n_obs += 1;
    }

    fn merge(&mut self, other: &GroupStats) {
        self.af_t_af.add_assign(&other.af_t_af);
        self.ar_t_ar.add_assign(&other.ar_t_ar);
        self.af_t_ar.add_assign(&other.af_t_ar);
        vector::add_assign(&mut self.af_t_y, &other.af_t_y);
        vector::add_assign(&mut self.ar_t_y, &other.ar_t_y);
        self.n_obs += other.n_obs;
    }
}

/// Per-group statistics plus the scalar totals of one pass.
#[derive(Debug, Clone, PartialEq)]
pub struct SufficientStats {
    pub groups: Vec<GroupStats>,
    /// Sum of squared offset-adjusted responses.
    pub sum_y2: f64,
    pub n_obs: usize,
    /// Sum of the weights of the valid rows.
    pub sum_w: f64,
}

impl SufficientStats {
    pub fn zeros(p: usize, q: usize, n_groups: usize) -> Self {
        Self {
            groups: vec![GroupStats::zeros(p, q); n_groups],
            sum_y2: 0.0,
            n_obs: 0,
            sum_w: 0.0,
        }
    }

    pub fn n_groups(&self) -> usize {
        self.groups.len()
    }

    /// Elementwise sum of two partial results over the same layout.
    pub fn merge(&mut self, other: &SufficientStats) {
        for (mine, theirs) in self.groups.iter_mut().zip(other.groups.iter()) {
            mine.merge(theirs);
        }
        self.sum_y2 += other.sum_y2;
        self.n_obs += other.n_obs;
        self.sum_w += other.sum_w;
    }

    /// ArjTArj of every group, in group order.
    pub fn zt_z(&self) -> Vec<DenseMatrix> {
        self.groups.iter().map(|g| g.ar_t_ar.clone()).collect()
    }
}

struct AccumulateTask<'a> {
    layout: &'a DesignLayout,
}

impl PartitionTask for AccumulateTask<'_> {
    type Output = Option<SufficientStats>;

    fn identity(&self) -> Self::Output {
        None
    }

    fn map(&self, partition: &Partition<'_>) -> Self::Output {
        let layout = self.layout;
        let mut stats = SufficientStats::zeros(layout.p(), layout.q(), layout.n_groups());
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
            let y = layout.response(&row) - layout.offset(&row);
            stats.groups[j].add_row(&x, &z, y);
            stats.sum_y2 += y * y;
            stats.n_obs += 1;
            stats.sum_w += layout.weight(&row);
        }
        Some(stats)
    }

    fn reduce(&self, left: Self::Output, right: Self::Output) -> Self::Output {
        match (left, right) {
            (Some(mut left), Some(right)) => {
                left.merge(&right);
                Some(left)
            }
            (left, None) => left,
            (None, right) => right,
        }
    }
}

/// Collect the sufficient statistics of every valid row of `frame`.
///
/// Fails with [`HglmError::NoValidRows`] when no row qualifies.
pub fn accumulate(frame: &Frame, layout: &DesignLayout, job: &JobHandle) -> Result<SufficientStats> {
    let stats = run_task(&AccumulateTask { layout }, frame, job)?
        .unwrap_or_else(|| SufficientStats::zeros(layout.p(), layout.q(), layout.n_groups()));
    if stats.n_obs == 0 {
        return Err(HglmError::NoValidRows);
    }
    debug!(
        "Accumulated {} rows over {} partitions into {} groups",
        stats.n_obs,
        frame.n_partitions(),
        stats.n_groups()
    );
    Ok(stats)
}

/// Totals over all groups, computed once after accumulation.
#[derive(Debug, Clone)]
pub struct GlobalStats {
    /// Sum over groups of AfjTAfj.
    pub af_t_af: DenseMatrix,
    /// Its inverse; only computed when EM iterations will run.
    pub af_t_af_inv: Option<DenseMatrix>,
    /// Sum over groups of AfjTYj.
    pub af_t_y: Vec<f64>,
    pub sum_y2: f64,
    pub n_obs: usize,
    pub sum_w: f64,
    pub one_over_n_groups: f64,
    pub one_over_n_obs: f64,
}

impl GlobalStats {
    /// Sum the per-group fixed statistics and, when `invert`, invert the
    /// p x p total. A singular total is fatal.
    pub fn from_groups(stats: &SufficientStats, invert: bool) -> Result<Self> {
        let p = stats.groups.first().map_or(0, |g| g.af_t_y.len());
        let mut af_t_af = DenseMatrix::zeros(p, p);
        let mut af_t_y = vec![0.0; p];
        for group in &stats.groups {
            af_t_af.add_assign(&group.af_t_af);
            vector::add_assign(&mut af_t_y, &group.af_t_y);
        }
        let af_t_af_inv = if invert {
            let mut inv = inverse(&af_t_af).map_err(HglmError::SingularFixedMatrix)?;
            inv.symmetrize();
            Some(inv)
        } else {
            None
        };
        Ok(Self {
            af_t_af,
            af_t_af_inv,
            af_t_y,
            sum_y2: stats.sum_y2,
            n_obs: stats.n_obs,
            sum_w: stats.sum_w,
            one_over_n_groups: 1.0 / stats.n_groups().max(1) as f64,
            one_over_n_obs: 1.0 / stats.n_obs.max(1) as f64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HglmConfig;
    use hglm_frame::FrameBuilder;

    fn frame(chunk_rows: usize) -> Frame {
        FrameBuilder::new()
            .categorical("g", &["a", "a", "b", "b", "b", "NA"])
            .numeric("x", vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0])
            .numeric("off", vec![0.5, 0.0, 0.0, 0.0, 1.0, 0.0])
            .numeric("y", vec![2.0, 3.0, 5.0, 4.0, 7.0, 1.0])
            .chunk_rows(chunk_rows)
            .build()
            .unwrap()
    }

    fn layout(frame: &Frame) -> DesignLayout {
        let mut config = HglmConfig::new("y", "g");
        config.random_columns = vec!["x".into()];
        config.offset_column = Some("off".into());
        DesignLayout::new(frame, &config).unwrap()
    }

    #[test]
    fn test_group_cross_products() {
        let f = frame(4);
        let stats = accumulate(&f, &layout(&f), &JobHandle::new()).unwrap();
        assert_eq!(stats.n_obs, 5);
        assert_eq!(stats.sum_w, 5.0);
        let a = &stats.groups[0];
        assert_eq!(a.n_obs, 2);
        // x = [x, 1], y adjusted by the offset: 1.5 and 3.0
        assert_eq!(a.af_t_af.to_rows(), vec![vec![5.0, 3.0], vec![3.0, 2.0]]);
        assert_eq!(a.af_t_y, vec![1.5 + 6.0, 4.5]);
        assert_eq!(a.ar_t_ar, a.af_t_af);
        assert_eq!(a.af_t_ar, a.af_t_af);
        assert_eq!(stats.sum_y2, 1.5 * 1.5 + 9.0 + 25.0 + 16.0 + 36.0);
    }

    #[test]
    fn test_partitioning_does_not_change_stats() {
        let job = JobHandle::new();
        let whole = accumulate(&frame(100), &layout(&frame(100)), &job).unwrap();
        let split = accumulate(&frame(1), &layout(&frame(1)), &job).unwrap();
        assert_eq!(whole, split);
    }

    #[test]
    fn test_no_valid_rows() {
        let f = FrameBuilder::new()
            .categorical("g", &["a", "b"])
            .numeric("x", vec![1.0, 2.0])
            .numeric("y", vec![f64::NAN, f64::NAN])
            .build()
            .unwrap();
        let layout = DesignLayout::new(&f, &HglmConfig::new("y", "g")).unwrap();
        assert!(matches!(
            accumulate(&f, &layout, &JobHandle::new()),
            Err(HglmError::NoValidRows)
        ));
    }

    #[test]
    fn test_global_inverse() {
        let f = frame(2);
        let stats = accumulate(&f, &layout(&f), &JobHandle::new()).unwrap();
        let global = GlobalStats::from_groups(&stats, true).unwrap();
        assert_eq!(global.n_obs, 5);
        assert_eq!(global.one_over_n_groups, 0.5);
        let product = global.af_t_af.mat_mul(global.af_t_af_inv.as_ref().unwrap());
        for i in 0..2 {
            for j in 0..2 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((product.get(i, j) - expected).abs() < 1e-10);
            }
        }
        assert!(GlobalStats::from_groups(&stats, false).unwrap().af_t_af_inv.is_none());
    }

    #[test]
    fn test_singular_fixed_matrix_is_fatal() {
        let f = FrameBuilder::new()
            .categorical("g", &["a", "b", "a"])
            .numeric("x", vec![1.0, 1.0, 1.0])
            .numeric("y", vec![1.0, 2.0, 3.0])
            .build()
            .unwrap();
        let layout = DesignLayout::new(&f, &HglmConfig::new("y", "g")).unwrap();
        let stats = accumulate(&f, &layout, &JobHandle::new()).unwrap();
        assert!(matches!(
            GlobalStats::from_groups(&stats, true),
            Err(HglmError::SingularFixedMatrix(_))
        ));
    }
}
