use crate::matrix::FeatureMatrix;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Bound a matrix to at most `cap` rows, always keeping row 0 (the target).
///
/// Above the cap, `cap - 1` comparison rows are drawn uniformly without
/// replacement from `1..n_rows` and kept in their input order.
/// Returns the (possibly reduced) matrix and, for each output row, the input
/// row it came from.
pub fn sample_rows<R: Rng + ?Sized>(
    matrix: &FeatureMatrix,
    cap: usize,
    rng: &mut R,
) -> (FeatureMatrix, Vec<usize>) {
    let n_rows = matrix.n_rows();
    if n_rows <= cap || cap == 0 {
        return (matrix.clone(), (0..n_rows).collect());
    }

    let comparison = n_rows - 1;
    let mut picked: Vec<usize> = rand::seq::index::sample(rng, comparison, cap - 1)
        .into_iter()
        .map(|i| i + 1)
        .collect();
    picked.sort_unstable();

    let mut indices = Vec::with_capacity(cap);
    indices.push(0);
    indices.extend(picked);

    (matrix.select_rows(&indices), indices)
}

/// RNG for sampling: seeded when a seed is configured, entropy otherwise
pub fn sampling_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered(n: usize) -> FeatureMatrix {
        FeatureMatrix::from_rows((0..n).map(|i| vec![i as f64]).collect()).unwrap()
    }

    #[test]
    fn test_no_sampling_at_or_below_cap() {
        let matrix = numbered(10);
        let mut rng = sampling_rng(Some(1));

        let (out, indices) = sample_rows(&matrix, 10, &mut rng);
        assert_eq!(out, matrix);
        assert_eq!(indices, (0..10).collect::<Vec<_>>());

        let (out, _) = sample_rows(&matrix, 50, &mut rng);
        assert_eq!(out.n_rows(), 10);
    }

    #[test]
    fn test_sampling_keeps_target_and_caps_rows() {
        let matrix = numbered(1000);
        let mut rng = sampling_rng(None);

        for cap in [2, 7, 500, 999] {
            let (out, indices) = sample_rows(&matrix, cap, &mut rng);
            assert_eq!(out.n_rows(), cap);
            assert_eq!(indices.len(), cap);
            assert_eq!(indices[0], 0);
            assert_eq!(out.row(0), &[0.0]);
            // comparison rows are distinct, ordered, and never the target
            assert!(indices[1..].windows(2).all(|w| w[0] < w[1]));
            assert!(indices[1..].iter().all(|&i| i >= 1 && i < 1000));
            for (pos, &src) in indices.iter().enumerate() {
                assert_eq!(out.row(pos), matrix.row(src));
            }
        }
    }

    #[test]
    fn test_seeded_sampling_is_reproducible() {
        let matrix = numbered(200);
        let (_, a) = sample_rows(&matrix, 20, &mut sampling_rng(Some(42)));
        let (_, b) = sample_rows(&matrix, 20, &mut sampling_rng(Some(42)));
        assert_eq!(a, b);
    }
}
