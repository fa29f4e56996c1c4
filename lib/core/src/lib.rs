//! # allomap Core
//!
//! Core library for the allomap projection services.
//!
//! This crate provides the pieces between an HTTP request and the t-SNE call:
//!
//! - [`AppConfig`] / [`CityRegistry`] - per-city feature lists and dataset files
//! - [`FeatureMatrix`] - total, zero-coercing numeric matrix assembly
//! - [`sample_rows`] - target-preserving row sampling above a size cap
//! - [`Projector`] / [`TsneProjector`] - 2D projection through `bhtsne`
//! - [`ProjectionCache`] - bounded, single-flight result cache
//! - [`ProjectionService`] - the whole flow for one city and target record
//!
//! ## Example
//!
//! ```rust
//! use allomap_core::{FeatureMatrix, Record};
//! use serde_json::json;
//!
//! let features = vec!["CREAT_DON".to_string(), "AGE_DON".to_string()];
//! let target: Record = json!({"CREAT_DON": "1.2", "AGE_DON": "55"})
//!     .as_object()
//!     .unwrap()
//!     .clone();
//! let population: Vec<Record> = vec![json!({"CREAT_DON": 0.9}).as_object().unwrap().clone()];
//!
//! let (matrix, report) = FeatureMatrix::assemble(&target, &population, &features);
//! assert_eq!(matrix.row(0), &[1.2, 55.0]);
//! assert_eq!(report.missing, 1);
//! ```

pub mod cache;
pub mod city;
pub mod config;
pub mod error;
pub mod matrix;
pub mod projection;
pub mod record;
pub mod sampling;
pub mod service;

pub use cache::{CacheKey, CacheStats, ProjectionCache};
pub use city::CityRegistry;
pub use config::{AppConfig, CityConfig, ProjectionConfig, ServerConfig};
pub use error::{Error, Result};
pub use matrix::{CoercionReport, FeatureMatrix};
pub use projection::{Coordinate, ProjectionParams, Projector, TsneProjector};
pub use record::{Record, RecordId, RECORD_ID_FIELD};
pub use sampling::sample_rows;
pub use service::{DatasetSource, ProjectionRequest, ProjectionResponse, ProjectionService, ServiceStats};
