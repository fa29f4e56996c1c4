//! Configuration for the allomap services
//!
//! Loaded with precedence: CLI flags > environment variables > config file >
//! built-in defaults. The built-in defaults carry the three reference cities
//! with their fixed feature lists.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Default file looked up in the working directory when no `--config` is given
pub const DEFAULT_CONFIG_FILE: &str = "allomap.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Directory holding the per-city CSV files
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub projection: ProjectionConfig,

    #[serde(default = "default_cities")]
    pub cities: Vec<CityConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_router_port")]
    pub router_port: u16,

    /// Overridable through the `PORT` environment variable
    #[serde(default = "default_reference_port")]
    pub reference_port: u16,

    #[serde(default = "default_projection_port")]
    pub projection_port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectionConfig {
    /// Row cap (target included) above which comparison rows are sampled
    #[serde(default = "default_max_points")]
    pub max_points: usize,

    #[serde(default = "default_perplexity_cap")]
    pub perplexity_cap: f64,

    #[serde(default = "default_epochs")]
    pub epochs: usize,

    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Barnes-Hut accuracy/speed trade-off
    #[serde(default = "default_theta")]
    pub theta: f64,

    /// Seed for row sampling; entropy-seeded when unset
    #[serde(default)]
    pub sample_seed: Option<u64>,

    /// Maximum cached projections, 0 disables caching
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
}

/// One city: its dataset file and the ordered features projected from it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CityConfig {
    pub name: String,
    pub file: String,
    pub features: Vec<String>,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_router_port() -> u16 {
    5002
}

fn default_reference_port() -> u16 {
    5003
}

fn default_projection_port() -> u16 {
    5001
}

fn default_max_points() -> usize {
    5000
}

fn default_perplexity_cap() -> f64 {
    30.0
}

fn default_epochs() -> usize {
    1000
}

fn default_seed() -> u64 {
    42
}

fn default_theta() -> f64 {
    0.5
}

fn default_cache_capacity() -> usize {
    1024
}

fn city(name: &str, file: &str, features: &[&str]) -> CityConfig {
    CityConfig {
        name: name.to_string(),
        file: file.to_string(),
        features: features.iter().map(|f| f.to_string()).collect(),
    }
}

fn default_cities() -> Vec<CityConfig> {
    vec![
        city(
            "Baltimore",
            "baltimore_reference.csv",
            &[
                "PTR_SEQUENCE_NUM", "CREAT_DON", "DAYSQAIT_ALLOC", "time_on_analysis", "KDPI",
                "AGE_DON", "HGT_CM_CALC", "MICRO_FAT_LI_DON", "BUN_DON", "DIURETICS_N",
                "KIL_BACK_TBL_FLUSH", "INIT_EPTS", "DAYSWAIT_CHRON", "NUM_ORG_DISC", "END_CPRA",
                "PO2_DON", "KIP_REASON_CD", "time_since_gfr_less_than_20", "REGION_IDENTICAL",
                "LENGTH_LEFT_LUNG",
            ],
        ),
        city(
            "Boston",
            "boston_reference.csv",
            &[
                "PTR_SEQUENCE_NUM", "time_on_dialysis", "DAYSWAIT_ALLOC", "KDPI", "PUMP_KI_N",
                "KIR_FINAL_FLUSH", "KIR_REASON_CD", "time_since_gfr_less_than_20", "DAYSWAIT_CHRON",
                "LENGTH_LEFT_LUNG", "AGE_DON", "PO2_DON", "CREAT_DON", "WGT_KG_DON_CALC",
                "BMI_DON_CALC", "INIT_EPTS", "BUN_DON", "CREAT_TRR", "PRI_PAYMENT_TRR_KI", "PH_DON",
            ],
        ),
        city(
            "LA",
            "la_reference.csv",
            &[
                "PTR_SEQUENCE_NUM", "DAYSWAIT_ALLOC", "time_on_dialysis", "KDPI", "KIR_REASON_CD",
                "CREAT_DON", "CREAT_TRR", "C1_0", "NUM_ORG_DISC", "LENGTH_LEFT_LUNG", "SEPTAL_WALL",
                "CARDARREST_DOWNTM_DURATION", "BMI_CALC", "DAYSWAIT_CHRON", "SHARE_TY_Local",
                "PH_DON", "HGT_CM_CALC", "INIT_EPTS", "AGE_DON", "MEETS_DBL_KI_CRITERIA",
            ],
        ),
    ]
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            server: ServerConfig::default(),
            projection: ProjectionConfig::default(),
            cities: default_cities(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            router_port: default_router_port(),
            reference_port: default_reference_port(),
            projection_port: default_projection_port(),
        }
    }
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self {
            max_points: default_max_points(),
            perplexity_cap: default_perplexity_cap(),
            epochs: default_epochs(),
            seed: default_seed(),
            theta: default_theta(),
            sample_seed: None,
            cache_capacity: default_cache_capacity(),
        }
    }
}

impl AppConfig {
    /// Parse a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::InvalidConfig(e.to_string()))
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::InvalidConfig(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Load configuration from an explicit file, else `allomap.toml` if it
    /// exists, else defaults; then apply environment overrides and validate.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut config = match config_path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
                Self::from_file(DEFAULT_CONFIG_FILE)?
            }
            None => Self::default(),
        };

        config.apply_env_vars(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides. The lookup is injected so tests
    /// don't have to touch the process environment.
    pub fn apply_env_vars<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("ALLOMAP_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }

        if let Some(host) = lookup("ALLOMAP_HOST") {
            self.server.host = host;
        }

        if let Some(port) = lookup("PORT") {
            self.server.reference_port = port
                .parse()
                .map_err(|_| Error::InvalidConfig(format!("Invalid PORT: {}", port)))?;
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.projection.max_points < 2 {
            return Err(Error::InvalidConfig(format!(
                "max_points must be at least 2, got {}",
                self.projection.max_points
            )));
        }

        let perplexity_cap = self.projection.perplexity_cap;
        if perplexity_cap.is_nan() || perplexity_cap < 1.0 {
            return Err(Error::InvalidConfig(format!(
                "perplexity_cap must be at least 1, got {}",
                perplexity_cap
            )));
        }

        let mut seen = HashSet::new();
        for city in &self.cities {
            if !seen.insert(city.name.as_str()) {
                return Err(Error::InvalidConfig(format!("duplicate city: {}", city.name)));
            }
            if city.features.is_empty() {
                return Err(Error::InvalidConfig(format!(
                    "city {} has no features configured",
                    city.name
                )));
            }
        }

        Ok(())
    }
}
