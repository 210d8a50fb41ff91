//! Property-based tests using proptest.
//!
//! Invariants checked over random inputs:
//!   - sufficient statistics do not depend on partitioning
//!   - committed EM states keep T symmetric and tau_e positive
//!   - the Woodbury marginal log-likelihood matches a dense evaluation
//!   - the scoring log-likelihood matches its explicit-matrix form
//!   - intra-class correlations lie in [0, 1)

use proptest::prelude::*;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use hglm_core::design::DesignLayout;
use hglm_core::loglik::{log_likelihood, marginal_log_likelihood};
use hglm_core::metrics::icc;
use hglm_core::stats::accumulate;
use hglm_core::synthetic::SyntheticSpec;
use hglm_core::{Hglm, JobHandle};
use hglm_linalg::decomposition::{determinant, inverse, LuDecomp};
use hglm_linalg::{vector, DenseMatrix};

fn random_pd(q: usize, rng: &mut ChaCha8Rng) -> DenseMatrix {
    let a = DenseMatrix::from_rows(
        &(0..q)
            .map(|_| (0..q).map(|_| rng.gen::<f64>() * 2.0 - 1.0).collect())
            .collect::<Vec<Vec<f64>>>(),
    );
    let mut t = a.mat_mul(&a.transpose()).add(&DenseMatrix::identity(q).scale(0.1));
    t.symmetrize();
    t
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-9 * (1.0 + a.abs().max(b.abs()))
}

// ---------------------------------------------------------------------------
// 1. Sufficient statistics are invariant to chunking
// ---------------------------------------------------------------------------
proptest! {
    #![proptest_config(ProptestConfig::with_cases(30))]

    #[test]
    fn prop_stats_partition_invariant(
        chunk in 1usize..40,
        seed in 0u64..1000,
    ) {
        let spec = SyntheticSpec {
            n_groups: 5,
            rows_per_group: 8,
            seed,
            chunk_rows: 1_000,
            ..Default::default()
        };
        let data = spec.generate().unwrap();
        let layout = DesignLayout::new(&data.frame, &spec.config()).unwrap();
        let job = JobHandle::new();
        let whole = accumulate(&data.frame, &layout, &job).unwrap();
        let chunked_frame = data.frame.clone().with_chunk_rows(chunk).unwrap();
        let chunked = accumulate(&chunked_frame, &layout, &job).unwrap();

        prop_assert_eq!(whole.n_obs, chunked.n_obs);
        prop_assert!(close(whole.sum_y2, chunked.sum_y2));
        for (a, b) in whole.groups.iter().zip(&chunked.groups) {
            prop_assert_eq!(a.n_obs, b.n_obs);
            for (x, y) in a.af_t_af.to_rows().concat().iter().zip(b.af_t_af.to_rows().concat()) {
                prop_assert!(close(*x, y));
            }
            for (x, y) in a.af_t_ar.to_rows().concat().iter().zip(b.af_t_ar.to_rows().concat()) {
                prop_assert!(close(*x, y));
            }
            for (x, y) in a.ar_t_y.iter().zip(&b.ar_t_y) {
                prop_assert!(close(*x, *y));
            }
        }
    }
}

// ---------------------------------------------------------------------------
// 2. Every committed state is a valid parameter set
// ---------------------------------------------------------------------------
proptest! {
    #![proptest_config(ProptestConfig::with_cases(10))]

    #[test]
    fn prop_committed_states_valid(
        seed in 0u64..1000,
        n_groups in 2usize..8,
    ) {
        let spec = SyntheticSpec {
            n_groups,
            rows_per_group: 12,
            seed,
            ..Default::default()
        };
        let data = spec.generate().unwrap();
        let mut config = spec.config();
        config.max_iterations = 6;
        let mut violations = Vec::new();
        let model = Hglm::new(config)
            .fit_with_observer(&data.frame, None, &JobHandle::new(), |report| {
                let s = report.state;
                if !s.t_mat().is_symmetric(1e-12) || s.tau_e_var() <= 0.0 {
                    violations.push(s.iteration());
                }
                if !(report.changes.max() >= 0.0 && report.changes.max().is_finite()) {
                    violations.push(s.iteration());
                }
            })
            .unwrap();
        prop_assert!(violations.is_empty(), "invalid at {:?}", violations);
        prop_assert!(model.iterations() <= 6);
        prop_assert_eq!(model.training_history().len(), model.iterations());
    }
}

// ---------------------------------------------------------------------------
// 3. Log-likelihoods against explicit matrix evaluations
// ---------------------------------------------------------------------------
proptest! {
    #![proptest_config(ProptestConfig::with_cases(40))]

    #[test]
    fn prop_loglik_matches_explicit_forms(
        q in 1usize..4,
        n_groups in 1usize..4,
        tau in 0.05f64..3.0,
        seed in 0u64..1000,
    ) {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let t = random_pd(q, &mut rng);
        let mut zt_z = Vec::new();
        let mut zt_r = Vec::new();
        let mut fixed_rss = 0.0;
        let mut n_obs = 0;
        let mut dense = 0.0;
        let t_inv = inverse(&t).unwrap();
        let det_t = determinant(&t).unwrap();
        let mut scoring_sum = 0.0;
        for _ in 0..n_groups {
            let n = q + 1 + rng.gen_range(0..4);
            let z_rows: Vec<Vec<f64>> = (0..n)
                .map(|_| (0..q).map(|_| rng.gen::<f64>() * 2.0 - 1.0).collect())
                .collect();
            let r: Vec<f64> = (0..n).map(|_| rng.gen::<f64>() * 2.0 - 1.0).collect();
            let z = DenseMatrix::from_rows(&z_rows);
            let ztz = z.transpose().mat_mul(&z);
            let ztr = z.transpose_mat_vec(&r);
            let m = inverse(&t_inv.add(&ztz.scale(1.0 / tau))).unwrap();
            scoring_sum += (tau * determinant(&m).unwrap() * det_t).ln()
                + m.quadratic_form(&ztr) / (tau * tau);
            zt_z.push(ztz);
            zt_r.push(ztr);
            fixed_rss += vector::dot(&r, &r);
            n_obs += n;

            let v = DenseMatrix::identity(n)
                .scale(tau)
                .add(&z.mat_mul(&t).mat_mul(&z.transpose()));
            let (_, ln_det) = LuDecomp::new(&v).unwrap().ln_abs_det();
            let quad = vector::dot(&r, &inverse(&v).unwrap().mat_vec(&r));
            dense += -0.5 * (n as f64 * (2.0 * std::f64::consts::PI).ln() + ln_det + quad);
        }
        let woodbury = marginal_log_likelihood(n_obs, &t, tau, &zt_z, fixed_rss, &zt_r).unwrap();
        prop_assert!(
            (woodbury - dense).abs() < 1e-7 * (1.0 + dense.abs()),
            "{} vs {}", woodbury, dense
        );

        scoring_sum += n_obs as f64 * (2.0 * std::f64::consts::PI).ln() + fixed_rss / tau;
        let scoring = log_likelihood(n_obs, &t, tau, &zt_z, fixed_rss, &zt_r).unwrap();
        let expected = -0.5 * scoring_sum;
        prop_assert!(
            (scoring - expected).abs() < 1e-7 * (1.0 + expected.abs()),
            "{} vs {}", scoring, expected
        );
    }
}

// ---------------------------------------------------------------------------
// 4. ICC lies in [0, 1)
// ---------------------------------------------------------------------------
proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_icc_in_unit_interval(
        q in 1usize..5,
        tau in 1e-6f64..100.0,
        seed in 0u64..1000,
    ) {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let t = random_pd(q, &mut rng);
        let values = icc(&t, tau);
        prop_assert_eq!(values.len(), q);
        for v in values {
            prop_assert!((0.0..1.0).contains(&v), "icc {}", v);
        }
    }
}
