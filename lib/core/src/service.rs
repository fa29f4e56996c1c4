use crate::cache::{CacheKey, CacheStats, ProjectionCache};
use crate::city::CityRegistry;
use crate::config::ProjectionConfig;
use crate::matrix::{CoercionReport, FeatureMatrix};
use crate::projection::{Coordinate, ProjectionParams, Projector};
use crate::record::{Record, RecordId};
use crate::sampling::{sample_rows, sampling_rng};
use crate::{Error, Result};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Supplies the comparison population for a city
pub trait DatasetSource: Send + Sync {
    fn load(&self, city: &str) -> Result<Vec<Record>>;
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProjectionRequest {
    #[serde(rename = "targetRecord", default)]
    pub target_record: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectionResponse {
    pub coordinates: Vec<Coordinate>,
    #[serde(rename = "recordId")]
    pub record_id: RecordId,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ServiceStats {
    pub cache: CacheStats,
    pub coercion: CoercionReport,
}

/// Places a target record among a city's population in 2D
pub struct ProjectionService {
    registry: CityRegistry,
    config: ProjectionConfig,
    source: Arc<dyn DatasetSource>,
    projector: Arc<dyn Projector>,
    cache: ProjectionCache<ProjectionResponse>,
    sample_rng: Mutex<StdRng>,
    coerced: Mutex<CoercionReport>,
}

impl ProjectionService {
    pub fn new(
        registry: CityRegistry,
        config: ProjectionConfig,
        source: Arc<dyn DatasetSource>,
        projector: Arc<dyn Projector>,
    ) -> Self {
        Self {
            cache: ProjectionCache::new(config.cache_capacity),
            sample_rng: Mutex::new(sampling_rng(config.sample_seed)),
            coerced: Mutex::new(CoercionReport::default()),
            registry,
            config,
            source,
            projector,
        }
    }

    pub fn registry(&self) -> &CityRegistry {
        &self.registry
    }

    /// Project the request's target record against `city`, serving from the
    /// cache when this (city, record id) pair was computed before.
    pub fn project(&self, city: &str, request: &ProjectionRequest) -> Result<Arc<ProjectionResponse>> {
        let target = match &request.target_record {
            Some(Value::Object(map)) => map,
            Some(_) => {
                return Err(Error::InvalidRequest(
                    "targetRecord must be a JSON object".to_string(),
                ))
            }
            None => return Err(Error::InvalidRequest("targetRecord is required".to_string())),
        };

        if !self.registry.is_configured(city) {
            warn!("No feature list configured for city: {}", city);
            return Err(Error::UnconfiguredCity(city.to_string()));
        }

        let record_id = RecordId::of(target);
        let key = CacheKey::new(city, record_id.key());

        let (response, hit) = self
            .cache
            .get_or_try_insert_with(key, || self.compute(city, target, record_id.clone()))?;

        if hit {
            info!("Using cached t-SNE for {}_{}", city, record_id);
        }
        Ok(response)
    }

    fn compute(&self, city: &str, target: &Record, record_id: RecordId) -> Result<ProjectionResponse> {
        info!("Generating t-SNE for {}, record {}", city, record_id);
        let features = self.registry.features(city);

        let records = self.source.load(city).map_err(|e| match e {
            Error::NotFound(_) => Error::NotFound(format!("No data available for {}", city)),
            other => other,
        })?;
        if records.is_empty() {
            return Err(Error::NotFound(format!("No data available for {}", city)));
        }
        info!("Processing {} records for t-SNE", records.len());

        let (matrix, report) = FeatureMatrix::assemble(target, &records, features);
        if report.total() > 0 {
            debug!(
                "Coerced {} field values to zero for {} (missing {}, null {}, non-numeric {}, non-finite {})",
                report.total(),
                city,
                report.missing,
                report.null,
                report.non_numeric,
                report.non_finite
            );
        }
        *self.coerced.lock() += report;

        let matrix = if matrix.n_rows() > self.config.max_points {
            info!(
                "Sampling {} points from {} total points",
                self.config.max_points,
                matrix.n_rows()
            );
            let mut rng = self.sample_rng.lock();
            sample_rows(&matrix, self.config.max_points, &mut *rng).0
        } else {
            matrix
        };

        let params = ProjectionParams::for_rows(&self.config, matrix.n_rows());
        info!(
            "Running t-SNE with perplexity {} on {} points",
            params.perplexity,
            matrix.n_rows()
        );

        let coordinates = self.projector.project(&matrix, &params)?;
        if coordinates.len() != matrix.n_rows() {
            return Err(Error::ComputationFailure(format!(
                "projector returned {} points for {} rows",
                coordinates.len(),
                matrix.n_rows()
            )));
        }

        Ok(ProjectionResponse {
            coordinates,
            record_id,
        })
    }

    /// Forget cached projections for a city
    pub fn invalidate_city(&self, city: &str) -> usize {
        let removed = self.cache.invalidate_city(city);
        info!("Invalidated {} cached projections for {}", removed, city);
        removed
    }

    pub fn stats(&self) -> ServiceStats {
        ServiceStats {
            cache: self.cache.stats(),
            coercion: *self.coerced.lock(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedSource(Vec<Record>);

    impl DatasetSource for FixedSource {
        fn load(&self, _city: &str) -> Result<Vec<Record>> {
            Ok(self.0.clone())
        }
    }

    /// Places row i at (first feature, i) so tests can trace rows through
    #[derive(Default)]
    struct TraceProjector {
        calls: AtomicUsize,
    }

    impl Projector for TraceProjector {
        fn project(&self, matrix: &FeatureMatrix, _params: &ProjectionParams) -> Result<Vec<Coordinate>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(matrix
                .rows()
                .enumerate()
                .map(|(i, row)| [row.first().copied().unwrap_or(0.0), i as f64])
                .collect())
        }
    }

    fn rows(n: usize) -> Vec<Record> {
        (0..n)
            .map(|i| {
                json!({"PTR_SEQUENCE_NUM": 1000 + i, "CREAT_DON": i as f64 * 0.1})
                    .as_object()
                    .unwrap()
                    .clone()
            })
            .collect()
    }

    fn service(records: Vec<Record>, config: ProjectionConfig) -> (ProjectionService, Arc<TraceProjector>) {
        let projector = Arc::new(TraceProjector::default());
        let service = ProjectionService::new(
            CityRegistry::new(AppConfig::default().cities),
            config,
            Arc::new(FixedSource(records)),
            projector.clone(),
        );
        (service, projector)
    }

    fn request(target: Value) -> ProjectionRequest {
        ProjectionRequest {
            target_record: Some(target),
        }
    }

    #[test]
    fn test_target_comes_first() {
        let (service, _) = service(rows(10), ProjectionConfig::default());
        let response = service
            .project("Baltimore", &request(json!({"PTR_SEQUENCE_NUM": 42, "CREAT_DON": "1.2"})))
            .unwrap();

        assert_eq!(response.coordinates.len(), 11);
        assert_eq!(response.coordinates[0][0], 42.0);
        assert_eq!(response.record_id.value(), &json!(42));
    }

    #[test]
    fn test_second_request_is_cached() {
        let (service, projector) = service(rows(10), ProjectionConfig::default());
        let req = request(json!({"PTR_SEQUENCE_NUM": 42}));

        let first = service.project("Boston", &req).unwrap();
        let second = service.project("Boston", &req).unwrap();
        assert_eq!(first, second);
        assert_eq!(projector.calls.load(Ordering::SeqCst), 1);

        // a different city is a different key
        service.project("LA", &req).unwrap();
        assert_eq!(projector.calls.load(Ordering::SeqCst), 2);

        assert_eq!(service.invalidate_city("Boston"), 1);
        service.project("Boston", &req).unwrap();
        assert_eq!(projector.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_sampling_keeps_target() {
        let mut config = ProjectionConfig::default();
        config.max_points = 25;
        config.sample_seed = Some(7);
        let (service, _) = service(rows(200), config);

        let response = service
            .project("Baltimore", &request(json!({"PTR_SEQUENCE_NUM": -5})))
            .unwrap();
        assert_eq!(response.coordinates.len(), 25);
        assert_eq!(response.coordinates[0][0], -5.0);
        assert!(response.coordinates[1..].iter().all(|[x, _]| *x >= 1000.0));
    }

    #[test]
    fn test_unconfigured_city() {
        let (service, projector) = service(rows(10), ProjectionConfig::default());
        let err = service
            .project("Atlantis", &request(json!({"PTR_SEQUENCE_NUM": 1})))
            .unwrap_err();
        assert!(matches!(err, Error::UnconfiguredCity(_)));
        assert_eq!(err.status_code(), 404);
        assert_eq!(projector.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_empty_dataset_is_not_found() {
        let (service, _) = service(Vec::new(), ProjectionConfig::default());
        let err = service
            .project("LA", &request(json!({"PTR_SEQUENCE_NUM": 1})))
            .unwrap_err();
        assert_eq!(err.to_string(), "No data available for LA");
        assert_eq!(err.status_code(), 404);
    }

    #[test]
    fn test_invalid_target() {
        let (service, _) = service(rows(3), ProjectionConfig::default());
        let missing = ProjectionRequest { target_record: None };
        assert!(matches!(service.project("LA", &missing), Err(Error::InvalidRequest(_))));
        assert!(matches!(
            service.project("LA", &request(json!([1, 2]))),
            Err(Error::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_coercion_is_counted() {
        let (service, _) = service(rows(4), ProjectionConfig::default());
        service
            .project("Boston", &request(json!({"PTR_SEQUENCE_NUM": 3, "KDPI": "n/a"})))
            .unwrap();

        let stats = service.stats();
        assert!(stats.coercion.non_numeric >= 1);
        assert!(stats.coercion.missing > 0);
        assert_eq!(stats.cache.entries, 1);
    }
}
