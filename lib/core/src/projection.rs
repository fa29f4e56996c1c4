//! 2D projection of feature matrices
//!
//! [`Projector`] is the seam between the service and the manifold-learning
//! library. [`TsneProjector`] runs t-SNE through `bhtsne`: exact gradients
//! for small inputs, Barnes-Hut above [`BARNES_HUT_MIN_ROWS`]. Matrices
//! below [`MIN_ROWS`] are laid out directly, since up to three points embed
//! in the plane with their pairwise distances intact.

use crate::config::ProjectionConfig;
use crate::matrix::FeatureMatrix;
use crate::{Error, Result};
use std::panic::{self, AssertUnwindSafe};
use tracing::debug;

/// A single projected point
pub type Coordinate = [f64; 2];

/// Row count from which Barnes-Hut replaces the exact O(n^2) gradient
pub const BARNES_HUT_MIN_ROWS: usize = 200;

/// Smallest matrix handed to `bhtsne`: it requires `n - 1 >= 3 * perplexity`
/// with perplexity at least 1.
pub const MIN_ROWS: usize = 4;

/// Parameters for one projection run
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionParams {
    pub perplexity: f64,
    pub epochs: usize,
    pub seed: u64,
    pub theta: f64,
}

impl ProjectionParams {
    /// Parameters for a matrix of `n_rows` rows: perplexity is
    /// `min(perplexity_cap, n_rows - 1)`.
    pub fn for_rows(config: &ProjectionConfig, n_rows: usize) -> Self {
        let max_perplexity = n_rows.saturating_sub(1) as f64;
        Self {
            perplexity: config.perplexity_cap.min(max_perplexity),
            epochs: config.epochs,
            seed: config.seed,
            theta: config.theta,
        }
    }

    /// Perplexity actually handed to `bhtsne`, clamped to `(n_rows - 1) / 3`
    pub fn effective_perplexity(&self, n_rows: usize) -> f64 {
        let limit = n_rows.saturating_sub(1) as f64 / 3.0;
        self.perplexity.min(limit).max(1.0)
    }
}

/// Projects every matrix row to a 2D point, preserving row order
pub trait Projector: Send + Sync {
    fn project(&self, matrix: &FeatureMatrix, params: &ProjectionParams) -> Result<Vec<Coordinate>>;
}

fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f64>()
        .sqrt()
}

/// Distance-preserving layout for at most three rows: row 0 at the origin,
/// row 1 on the x axis, row 2 placed by the law of cosines.
fn small_layout(matrix: &FeatureMatrix) -> Vec<Coordinate> {
    let rows: Vec<&[f64]> = matrix.rows().collect();
    let mut layout = Vec::with_capacity(rows.len());
    if rows.is_empty() {
        return layout;
    }
    layout.push([0.0, 0.0]);

    if rows.len() >= 2 {
        let d01 = euclidean(rows[0], rows[1]);
        layout.push([d01, 0.0]);

        if rows.len() >= 3 {
            let d02 = euclidean(rows[0], rows[2]);
            let d12 = euclidean(rows[1], rows[2]);
            let x = if d01 > 0.0 {
                (d01 * d01 + d02 * d02 - d12 * d12) / (2.0 * d01)
            } else {
                d02
            };
            let y = (d02 * d02 - x * x).max(0.0).sqrt();
            layout.push([x, y]);
        }
    }
    layout
}

/// t-SNE via `bhtsne`
#[derive(Debug, Clone, Copy, Default)]
pub struct TsneProjector;

impl TsneProjector {
    pub fn new() -> Self {
        Self
    }

    fn run(samples: &[&[f64]], params: &ProjectionParams, perplexity: f64) -> Vec<f64> {
        let mut tsne = bhtsne::tSNE::new(samples);
        tsne.embedding_dim(2).perplexity(perplexity).epochs(params.epochs);

        if samples.len() >= BARNES_HUT_MIN_ROWS {
            tsne.barnes_hut(params.theta, |a, b| euclidean(a, b));
        } else {
            tsne.exact(|a, b| euclidean(a, b));
        }

        tsne.embedding()
    }
}

impl Projector for TsneProjector {
    fn project(&self, matrix: &FeatureMatrix, params: &ProjectionParams) -> Result<Vec<Coordinate>> {
        let n_rows = matrix.n_rows();
        if matrix.n_features() == 0 {
            return Err(Error::ComputationFailure(
                "feature matrix has no columns".to_string(),
            ));
        }
        if n_rows < MIN_ROWS {
            debug!("Laying out {} rows directly, below t-SNE minimum", n_rows);
            return Ok(small_layout(matrix));
        }

        let perplexity = params.effective_perplexity(n_rows);
        debug!(
            "Running t-SNE on {} rows x {} features (perplexity {}, epochs {}, seed {})",
            n_rows,
            matrix.n_features(),
            perplexity,
            params.epochs,
            params.seed
        );

        let samples: Vec<&[f64]> = matrix.rows().collect();
        let embedding = panic::catch_unwind(AssertUnwindSafe(|| {
            Self::run(&samples, params, perplexity)
        }))
        .map_err(|cause| {
            let message = cause
                .downcast_ref::<String>()
                .cloned()
                .or_else(|| cause.downcast_ref::<&str>().map(|s| s.to_string()))
                .unwrap_or_else(|| "t-SNE panicked".to_string());
            Error::ComputationFailure(message)
        })?;

        if embedding.len() != n_rows * 2 {
            return Err(Error::ComputationFailure(format!(
                "expected {} embedding values, got {}",
                n_rows * 2,
                embedding.len()
            )));
        }

        Ok(embedding
            .chunks_exact(2)
            .map(|xy| [xy[0], xy[1]])
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perplexity_is_capped_by_rows() {
        let config = ProjectionConfig::default();
        assert_eq!(ProjectionParams::for_rows(&config, 11).perplexity, 10.0);
        assert_eq!(ProjectionParams::for_rows(&config, 31).perplexity, 30.0);
        assert_eq!(ProjectionParams::for_rows(&config, 5000).perplexity, 30.0);

        let params = ProjectionParams::for_rows(&config, 11);
        assert_eq!(params.epochs, 1000);
        assert_eq!(params.seed, 42);
    }

    #[test]
    fn test_effective_perplexity_respects_library_bound() {
        let config = ProjectionConfig::default();
        let params = ProjectionParams::for_rows(&config, 11);
        let effective = params.effective_perplexity(11);
        assert!(3.0 * effective.trunc() <= 10.0);
        assert!(effective >= 1.0);

        let params = ProjectionParams::for_rows(&config, 5000);
        assert_eq!(params.effective_perplexity(5000), 30.0);
    }

    #[test]
    fn test_matrix_without_features_fails() {
        let projector = TsneProjector::new();
        let config = ProjectionConfig::default();

        let no_columns = FeatureMatrix::from_rows(vec![vec![]; 6]).unwrap();
        let result = projector.project(&no_columns, &ProjectionParams::for_rows(&config, 6));
        assert!(matches!(result, Err(Error::ComputationFailure(_))));
    }

    #[test]
    fn test_small_inputs_keep_distances() {
        let projector = TsneProjector::new();
        let config = ProjectionConfig::default();

        let single = FeatureMatrix::from_rows(vec![vec![1.0, 2.0]]).unwrap();
        let layout = projector
            .project(&single, &ProjectionParams::for_rows(&config, 1))
            .unwrap();
        assert_eq!(layout, vec![[0.0, 0.0]]);

        let triangle =
            FeatureMatrix::from_rows(vec![vec![0.0, 0.0], vec![3.0, 0.0], vec![0.0, 4.0]]).unwrap();
        let layout = projector
            .project(&triangle, &ProjectionParams::for_rows(&config, 3))
            .unwrap();
        assert_eq!(layout.len(), 3);
        let dist = |a: Coordinate, b: Coordinate| euclidean(&a, &b);
        assert!((dist(layout[0], layout[1]) - 3.0).abs() < 1e-9);
        assert!((dist(layout[0], layout[2]) - 4.0).abs() < 1e-9);
        assert!((dist(layout[1], layout[2]) - 5.0).abs() < 1e-9);

        let duplicates = FeatureMatrix::from_rows(vec![vec![1.0], vec![1.0]]).unwrap();
        let layout = projector
            .project(&duplicates, &ProjectionParams::for_rows(&config, 2))
            .unwrap();
        assert_eq!(layout, vec![[0.0, 0.0], [0.0, 0.0]]);
    }

    #[test]
    fn test_tsne_projects_every_row() {
        let rows: Vec<Vec<f64>> = (0..12)
            .map(|i| {
                let cluster = if i % 2 == 0 { 0.0 } else { 10.0 };
                vec![cluster + i as f64 * 0.1, cluster, 1.0]
            })
            .collect();
        let matrix = FeatureMatrix::from_rows(rows).unwrap();
        let config = ProjectionConfig::default();
        let params = ProjectionParams::for_rows(&config, matrix.n_rows());

        let coordinates = TsneProjector::new().project(&matrix, &params).unwrap();
        assert_eq!(coordinates.len(), 12);
        assert!(coordinates.iter().all(|[x, y]| x.is_finite() && y.is_finite()));
    }
}
