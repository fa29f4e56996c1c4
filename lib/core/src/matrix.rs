//! Feature matrix assembly
//!
//! Converts records into a dense row-major matrix over a fixed, ordered
//! feature list. Coercion is total: anything that does not parse as a finite
//! number becomes `0.0`, and every such substitution is counted in a
//! [`CoercionReport`].

use crate::record::Record;
use serde::Serialize;
use serde_json::Value;
use std::ops::AddAssign;

/// Counts of field values that were coerced to zero
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CoercionReport {
    pub missing: usize,
    pub null: usize,
    pub non_numeric: usize,
    pub non_finite: usize,
}

impl CoercionReport {
    pub fn total(&self) -> usize {
        self.missing + self.null + self.non_numeric + self.non_finite
    }
}

impl AddAssign for CoercionReport {
    fn add_assign(&mut self, other: Self) {
        self.missing += other.missing;
        self.null += other.null;
        self.non_numeric += other.non_numeric;
        self.non_finite += other.non_finite;
    }
}

/// Coerce a single field value to a finite `f64`
pub fn coerce_value(value: Option<&Value>, report: &mut CoercionReport) -> f64 {
    let parsed = match value {
        None => {
            report.missing += 1;
            return 0.0;
        }
        Some(Value::Null) => {
            report.null += 1;
            return 0.0;
        }
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::Bool(b)) => Some(if *b { 1.0 } else { 0.0 }),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => None,
    };

    match parsed {
        Some(v) if v.is_finite() => v,
        Some(_) => {
            report.non_finite += 1;
            0.0
        }
        None => {
            report.non_numeric += 1;
            0.0
        }
    }
}

/// Extract a record's feature vector in feature-list order
pub fn feature_vector(record: &Record, features: &[String], report: &mut CoercionReport) -> Vec<f64> {
    features
        .iter()
        .map(|name| coerce_value(record.get(name), report))
        .collect()
}

/// Dense row-major matrix of finite values; row 0 is the target record
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    data: Vec<f64>,
    n_rows: usize,
    n_features: usize,
}

impl FeatureMatrix {
    /// Build the matrix with `target` at row 0 followed by `comparison` in order
    pub fn assemble(
        target: &Record,
        comparison: &[Record],
        features: &[String],
    ) -> (Self, CoercionReport) {
        let mut report = CoercionReport::default();
        let n_features = features.len();
        let mut data = Vec::with_capacity((comparison.len() + 1) * n_features);

        data.extend(feature_vector(target, features, &mut report));
        for record in comparison {
            data.extend(feature_vector(record, features, &mut report));
        }

        let matrix = Self {
            data,
            n_rows: comparison.len() + 1,
            n_features,
        };
        (matrix, report)
    }

    /// Build from explicit rows. Non-finite values are zeroed; rows must share
    /// one width.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Option<Self> {
        let n_features = rows.first().map(|r| r.len()).unwrap_or(0);
        if rows.iter().any(|r| r.len() != n_features) {
            return None;
        }
        let n_rows = rows.len();
        let data = rows
            .into_iter()
            .flatten()
            .map(|v| if v.is_finite() { v } else { 0.0 })
            .collect();
        Some(Self {
            data,
            n_rows,
            n_features,
        })
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn row(&self, index: usize) -> &[f64] {
        let start = index * self.n_features;
        &self.data[start..start + self.n_features]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f64]> {
        (0..self.n_rows).map(move |i| self.row(i))
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// New matrix made of the given rows, in the given order
    pub fn select_rows(&self, indices: &[usize]) -> Self {
        let mut data = Vec::with_capacity(indices.len() * self.n_features);
        for &i in indices {
            data.extend_from_slice(self.row(i));
        }
        Self {
            data,
            n_rows: indices.len(),
            n_features: self.n_features,
        }
    }
}
