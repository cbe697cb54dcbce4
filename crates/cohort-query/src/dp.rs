//! Differential-privacy noise for count responses.
//!
//! Each cell receives Laplace noise with scale `1 / epsilon` (sensitivity 1),
//! truncated toward zero, and the noised count is clamped to at least 1.

use rand::Rng;

use crate::aggregate::CountTable;

/// Draws one sample from Laplace(0, scale) by inverse transform.
pub fn laplace<R: Rng + ?Sized>(rng: &mut R, scale: f64) -> f64 {
    let u: f64 = rng.gen_range(-0.5..0.5);
    let tail = (1.0 - 2.0 * u.abs()).max(f64::MIN_POSITIVE);
    -scale * u.signum() * tail.ln()
}

/// Applies noise to every cell of `counts`.
///
/// A non-finite or non-positive `epsilon` leaves the table unchanged.
pub fn apply_laplace<R: Rng + ?Sized>(mut counts: CountTable, epsilon: f64, rng: &mut R) -> CountTable {
    if !epsilon.is_finite() || epsilon <= 0.0 {
        return counts;
    }
    let scale = 1.0 / epsilon;
    for cells in counts.values_mut() {
        for count in cells.values_mut() {
            #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap, clippy::cast_sign_loss)]
            let noised = (*count as i64).saturating_add(laplace(rng, scale) as i64).max(1) as u64;
            *count = noised;
        }
    }
    counts
}

/// Applies noise with the thread-local generator.
pub fn privatize(counts: CountTable, epsilon: f64) -> CountTable {
    apply_laplace(counts, epsilon, &mut rand::thread_rng())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::BTreeMap;

    fn table(cells: &[(&str, u64)]) -> CountTable {
        let mut t = CountTable::new();
        t.insert(
            "tumorGrade".to_string(),
            cells.iter().map(|(k, n)| ((*k).to_string(), *n)).collect::<BTreeMap<_, _>>(),
        );
        t
    }

    #[test]
    fn test_counts_never_drop_below_one() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let noised = apply_laplace(table(&[("I", 1), ("II", 0)]), 0.05, &mut rng);
            assert!(noised["tumorGrade"].values().all(|n| *n >= 1));
        }
    }

    #[test]
    fn test_keys_are_preserved() {
        let mut rng = StdRng::seed_from_u64(1);
        let noised = apply_laplace(table(&[("I", 10), ("II", 20)]), 1.0, &mut rng);
        assert_eq!(noised["tumorGrade"].keys().collect::<Vec<_>>(), vec!["I", "II"]);
    }

    #[test]
    fn test_invalid_epsilon_is_identity() {
        let mut rng = StdRng::seed_from_u64(3);
        let original = table(&[("I", 4)]);
        assert_eq!(apply_laplace(original.clone(), f64::INFINITY, &mut rng), original);
        assert_eq!(apply_laplace(original.clone(), 0.0, &mut rng), original);
    }

    #[test]
    fn test_noise_is_centered() {
        let mut rng = StdRng::seed_from_u64(11);
        let n = 20_000;
        let mean: f64 = (0..n).map(|_| laplace(&mut rng, 1.0)).sum::<f64>() / f64::from(n);
        assert!(mean.abs() < 0.1, "mean {mean}");
    }

    #[test]
    fn test_large_epsilon_is_nearly_exact() {
        let mut rng = StdRng::seed_from_u64(5);
        let noised = apply_laplace(table(&[("I", 100)]), 1000.0, &mut rng);
        assert_eq!(noised["tumorGrade"]["I"], 100);
    }
}
