pub mod dataset;

pub use dataset::{read_csv, DatasetStore};
