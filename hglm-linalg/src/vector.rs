//! Dense vector kernels on `&[f64]`.
//!
//! Shapes must match; a mismatch is a programming error and panics.

/// Inner product a'b.
pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    assert_eq!(a.len(), b.len());
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// a + b.
pub fn add(a: &[f64], b: &[f64]) -> Vec<f64> {
    assert_eq!(a.len(), b.len());
    a.iter().zip(b.iter()).map(|(x, y)| x + y).collect()
}

/// a - b.
pub fn sub(a: &[f64], b: &[f64]) -> Vec<f64> {
    assert_eq!(a.len(), b.len());
    a.iter().zip(b.iter()).map(|(x, y)| x - y).collect()
}

/// s * a.
pub fn scale(a: &[f64], s: f64) -> Vec<f64> {
    a.iter().map(|x| x * s).collect()
}

/// acc += a.
pub fn add_assign(acc: &mut [f64], a: &[f64]) {
    assert_eq!(acc.len(), a.len());
    for (t, v) in acc.iter_mut().zip(a.iter()) {
        *t += v;
    }
}

/// acc += s * a.
pub fn axpy(acc: &mut [f64], s: f64, a: &[f64]) {
    assert_eq!(acc.len(), a.len());
    if s == 0.0 {
        return;
    }
    for (t, v) in acc.iter_mut().zip(a.iter()) {
        *t += s * v;
    }
}

/// Largest absolute entry (0 for an empty slice).
pub fn max_abs(a: &[f64]) -> f64 {
    a.iter().fold(0.0f64, |m, v| m.max(v.abs()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dot() {
        assert!((dot(&[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0]) - 32.0).abs() < 1e-12);
    }

    #[test]
    fn test_axpy_and_add_assign() {
        let mut acc = vec![1.0, 1.0];
        axpy(&mut acc, 2.0, &[1.0, -1.0]);
        assert_eq!(acc, vec![3.0, -1.0]);
        add_assign(&mut acc, &[1.0, 1.0]);
        assert_eq!(acc, vec![4.0, 0.0]);
    }

    #[test]
    fn test_max_abs() {
        assert_eq!(max_abs(&[]), 0.0);
        assert_eq!(max_abs(&[1.0, -3.5, 2.0]), 3.5);
    }

    #[test]
    fn test_add_sub_scale() {
        assert_eq!(add(&[1.0, 2.0], &[3.0, 4.0]), vec![4.0, 6.0]);
        assert_eq!(sub(&[1.0, 2.0], &[3.0, 4.0]), vec![-2.0, -2.0]);
        assert_eq!(scale(&[1.0, -2.0], 0.5), vec![0.5, -1.0]);
    }
}
