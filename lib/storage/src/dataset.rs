use allomap_core::record::infer_cell;
use allomap_core::{CityRegistry, DatasetSource, Error, Record, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Resolves cities to CSV files in a data directory and reads them as records
pub struct DatasetStore {
    data_dir: PathBuf,
    registry: CityRegistry,
}

impl DatasetStore {
    pub fn new<P: AsRef<Path>>(data_dir: P, registry: CityRegistry) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            registry,
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Find the dataset file for a city.
    ///
    /// The configured file wins when it exists. Otherwise the first `.csv`
    /// file (by name) whose name contains the city, ignoring case, is used.
    pub fn resolve(&self, city: &str) -> Result<PathBuf> {
        debug!("Looking for reference data in: {}", self.data_dir.display());

        let mut files: Vec<String> = std::fs::read_dir(&self.data_dir)
            .map_err(|e| {
                Error::ReadFailure(format!(
                    "Error listing files in {}: {}",
                    self.data_dir.display(),
                    e
                ))
            })?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
            .filter_map(|entry| entry.file_name().into_string().ok())
            .collect();
        files.sort();

        if let Some(configured) = self.registry.file_for(city) {
            if files.iter().any(|f| f == configured) {
                return Ok(self.data_dir.join(configured));
            }
            warn!("Configured file {} for {} is missing, trying name match", configured, city);
        }

        let needle = city.to_lowercase();
        let matched = files.into_iter().find(|f| {
            let lower = f.to_lowercase();
            !needle.is_empty() && lower.contains(&needle) && lower.ends_with(".csv")
        });

        match matched {
            Some(file) => {
                info!("Found matching file for {}: {}", city, file);
                Ok(self.data_dir.join(file))
            }
            None => Err(Error::NotFound(format!(
                "Reference data file not found for {}",
                city
            ))),
        }
    }

    /// Read every row of a city's dataset
    pub fn load(&self, city: &str) -> Result<Vec<Record>> {
        let path = self.resolve(city)?;
        info!("Loading reference data from {}", path.display());
        let records = read_csv(&path)?;
        info!("Loaded {} records for {}", records.len(), city);
        Ok(records)
    }
}

impl DatasetSource for DatasetStore {
    fn load(&self, city: &str) -> Result<Vec<Record>> {
        DatasetStore::load(self, city)
    }
}

/// Read a headed CSV file into records. Short rows are padded with nulls and
/// surplus cells are dropped.
pub fn read_csv<P: AsRef<Path>>(path: P) -> Result<Vec<Record>> {
    let path = path.as_ref();
    let read_failure = |e: csv::Error| Error::ReadFailure(format!("{}: {}", path.display(), e));

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(read_failure)?;

    let headers = reader.headers().map_err(read_failure)?.clone();
    debug!("Columns in {}: {:?}", path.display(), headers.iter().collect::<Vec<_>>());

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row.map_err(read_failure)?;
        let record: Record = headers
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let value = row.get(i).map(infer_cell).unwrap_or(Value::Null);
                (name.to_string(), value)
            })
            .collect();
        records.push(record);
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use allomap_core::AppConfig;
    use serde_json::json;
    use std::fs;

    fn store(dir: &Path) -> DatasetStore {
        DatasetStore::new(dir, CityRegistry::new(AppConfig::default().cities))
    }

    #[test]
    fn test_resolve_configured_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("boston_reference.csv"), "A\n1\n").unwrap();
        fs::write(dir.path().join("boston_old.csv"), "A\n1\n").unwrap();

        let path = store(dir.path()).resolve("Boston").unwrap();
        assert_eq!(path, dir.path().join("boston_reference.csv"));
    }

    #[test]
    fn test_resolve_falls_back_to_name_match() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Denver_Donors.CSV"), "A\n1\n").unwrap();
        fs::write(dir.path().join("denver_notes.txt"), "x").unwrap();

        let path = store(dir.path()).resolve("denver").unwrap();
        assert_eq!(path, dir.path().join("Denver_Donors.CSV"));
    }

    #[test]
    fn test_resolve_not_found() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("la_reference.csv"), "A\n1\n").unwrap();

        let err = store(dir.path()).resolve("Atlantis").unwrap_err();
        assert_eq!(err.to_string(), "Reference data file not found for Atlantis");
        assert_eq!(err.status_code(), 404);
    }

    #[test]
    fn test_missing_data_dir_is_read_failure() {
        let dir = tempfile::tempdir().unwrap();
        let err = store(&dir.path().join("nope")).resolve("LA").unwrap_err();
        assert!(matches!(err, Error::ReadFailure(_)));
    }

    #[test]
    fn test_read_csv_types_cells() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("la_reference.csv");
        fs::write(
            &path,
            "PTR_SEQUENCE_NUM,KDPI,SHARE_TY,CREAT_DON\n1,0.45,Local,\n2,NaN,Regional,1.1\n3\n",
        )
        .unwrap();

        let records = read_csv(&path).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0]["PTR_SEQUENCE_NUM"], json!(1));
        assert_eq!(records[0]["KDPI"], json!(0.45));
        assert_eq!(records[0]["SHARE_TY"], json!("Local"));
        assert_eq!(records[0]["CREAT_DON"], Value::Null);
        assert_eq!(records[1]["KDPI"], Value::Null);
        assert_eq!(records[2]["SHARE_TY"], Value::Null);
        assert_eq!(records[2].len(), 4);
    }

    #[test]
    fn test_malformed_csv_is_read_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("boston_reference.csv");
        fs::write(&path, b"A,B\n1,\xff\xfe\n").unwrap();

        let err = read_csv(&path).unwrap_err();
        assert!(matches!(err, Error::ReadFailure(_)));
        assert_eq!(err.status_code(), 500);
    }

    #[test]
    fn test_load_through_dataset_source() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("baltimore_reference.csv"), "PTR_SEQUENCE_NUM\n7\n8\n").unwrap();

        let source: &dyn DatasetSource = &store(dir.path());
        let records = source.load("Baltimore").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1]["PTR_SEQUENCE_NUM"], json!(8));
    }
}
