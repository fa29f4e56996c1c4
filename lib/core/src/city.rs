use crate::config::CityConfig;
use ahash::AHashMap;

/// Lookup of per-city feature lists and dataset files
#[derive(Debug, Clone, Default)]
pub struct CityRegistry {
    cities: AHashMap<String, CityConfig>,
    order: Vec<String>,
}

impl CityRegistry {
    pub fn new(cities: Vec<CityConfig>) -> Self {
        let mut registry = Self::default();
        for city in cities {
            registry.order.push(city.name.clone());
            registry.cities.insert(city.name.clone(), city);
        }
        registry
    }

    pub fn get(&self, city: &str) -> Option<&CityConfig> {
        self.cities.get(city)
    }

    /// Ordered feature list for a city; empty when the city is unknown
    pub fn features(&self, city: &str) -> &[String] {
        self.cities
            .get(city)
            .map(|c| c.features.as_slice())
            .unwrap_or(&[])
    }

    /// Configured dataset file name for a city
    pub fn file_for(&self, city: &str) -> Option<&str> {
        self.cities.get(city).map(|c| c.file.as_str())
    }

    pub fn is_configured(&self, city: &str) -> bool {
        !self.features(city).is_empty()
    }

    /// City names in configuration order
    pub fn names(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.cities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cities.is_empty()
    }
}
