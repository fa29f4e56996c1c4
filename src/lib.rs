//! # allomap
//!
//! Places an organ-allocation record among a city's reference population by
//! projecting both into 2D with t-SNE, served over HTTP.
//!
//! ## Quick Start
//!
//! ### As a Server
//!
//! ```bash
//! allomap --data-dir ./data router              # :5002, /health + /api/tsne/{city}
//! allomap --data-dir ./data reference           # :5003 or $PORT, /api/reference-data/{city}
//! allomap --data-dir ./data projection          # :5001, /api/tsne/{city}
//! ```
//!
//! ### As a Library
//!
//! ```rust,no_run
//! use allomap::prelude::*;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! let config = AppConfig::default();
//! let registry = CityRegistry::new(config.cities.clone());
//! let store = Arc::new(DatasetStore::new("./data", registry.clone()));
//! let service = ProjectionService::new(
//!     registry,
//!     config.projection.clone(),
//!     store,
//!     Arc::new(TsneProjector::new()),
//! );
//!
//! let request: ProjectionRequest = serde_json::from_value(json!({
//!     "targetRecord": {"PTR_SEQUENCE_NUM": 42, "CREAT_DON": "1.2", "AGE_DON": "55"}
//! })).unwrap();
//! let response = service.project("Baltimore", &request).unwrap();
//! println!("target at {:?}", response.coordinates[0]);
//! ```
//!
//! ## Crate Structure
//!
//! - `allomap-core` - configuration, matrix assembly, sampling, projection, cache
//! - `allomap-storage` - per-city CSV resolution and loading
//! - `allomap-api` - the router, reference-data and projection HTTP services

// Re-export core types
pub use allomap_core::{
    AppConfig, CityConfig, CityRegistry, CoercionReport, Coordinate, DatasetSource, Error,
    FeatureMatrix, ProjectionCache, ProjectionConfig, ProjectionParams, ProjectionRequest,
    ProjectionResponse, ProjectionService, Projector, Record, RecordId, Result, TsneProjector,
};

// Re-export storage
pub use allomap_storage::DatasetStore;

// Re-export API
pub use allomap_api::RestApi;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        AppConfig, CityRegistry, DatasetSource, DatasetStore, Error, FeatureMatrix,
        ProjectionRequest, ProjectionResponse, ProjectionService, Projector, Record, RestApi,
        Result, TsneProjector,
    };
}
