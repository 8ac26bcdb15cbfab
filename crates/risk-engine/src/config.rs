//! Weight table and band thresholds
//!
//! Read once from `weights.json`:
//!
//! ```json
//! {
//!   "weights": { "population_density": 0.25, "proximity_to_shelter": -0.05 },
//!   "bands":   { "low": [0, 0.33], "medium": [0.33, 0.67], "high": [0.67, 1.0] }
//! }
//! ```
//!
//! A missing file yields [`WeightConfig::default`]. A file that exists but
//! does not parse, or whose bands do not tile `[0, 1]`, is an error.

use crate::{Factor, Result, RiskError};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::Path;
use tracing::{debug, info};

/// Tolerance when checking that adjacent bands meet
const BAND_EPSILON: f64 = 1e-9;

/// Default factor weights (sum of positive weights = 0.95)
pub const DEFAULT_WEIGHTS: [(Factor, f64); 6] = [
    (Factor::PopulationDensity, 0.25),
    (Factor::ResidentialUnitCount, 0.20),
    (Factor::BuildingStories, 0.15),
    (Factor::HazardLiquefactionRank, 0.25),
    (Factor::FloodDepth, 0.10),
    (Factor::ProximityToShelter, -0.05),
];

/// Half-open score interval `[low, high)` with a label
#[derive(Debug, Clone, PartialEq)]
pub struct Band {
    pub name: String,
    pub low: f64,
    pub high: f64,
}

impl Band {
    pub fn new(name: impl Into<String>, low: f64, high: f64) -> Self {
        Self {
            name: name.into(),
            low,
            high,
        }
    }

    pub fn contains(&self, score: f64) -> bool {
        self.low <= score && score < self.high
    }
}

fn default_bands() -> Vec<Band> {
    vec![
        Band::new("low", 0.0, 0.33),
        Band::new("medium", 0.33, 0.67),
        Band::new("high", 0.67, 1.0),
    ]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightConfig {
    /// Factor name → signed weight. Unknown names are kept but never used.
    pub weights: BTreeMap<String, f64>,
    /// Bands in declared order
    #[serde(
        default = "default_bands",
        deserialize_with = "deserialize_bands",
        serialize_with = "serialize_bands"
    )]
    pub bands: Vec<Band>,
}

impl Default for WeightConfig {
    fn default() -> Self {
        Self {
            weights: DEFAULT_WEIGHTS
                .iter()
                .map(|(f, w)| (f.as_str().to_string(), *w))
                .collect(),
            bands: default_bands(),
        }
    }
}

impl WeightConfig {
    /// Load from `path`, falling back to defaults when the file is absent
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No weight config at {:?}, using defaults", path);
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };

        let config: WeightConfig = serde_json::from_str(&text)?;
        config.validate()?;

        info!(
            "Loaded weight config from {:?} ({} weights, {} bands)",
            path,
            config.weights.len(),
            config.bands.len()
        );
        Ok(config)
    }

    /// Weight for `factor`, 0 when the table has no entry
    pub fn weight(&self, factor: Factor) -> f64 {
        self.weights.get(factor.as_str()).copied().unwrap_or(0.0)
    }

    /// First band in declared order containing `score`. Scores past every
    /// upper bound land in the band with the highest upper bound, since the
    /// last band is open-ended.
    pub fn classify(&self, score: f64) -> &str {
        if let Some(band) = self.bands.iter().find(|b| b.contains(score)) {
            return &band.name;
        }
        let fallback = self
            .bands
            .iter()
            .max_by(|a, b| a.high.partial_cmp(&b.high).unwrap_or(std::cmp::Ordering::Equal))
            .map(|b| b.name.as_str())
            .unwrap_or("high");
        debug!("Score {} outside band table, using {}", score, fallback);
        fallback
    }

    /// Bands must be named uniquely, non-empty, and together cover `[0, 1]`
    /// without overlaps or gaps.
    pub fn validate(&self) -> Result<()> {
        if self.bands.is_empty() {
            return Err(RiskError::InvalidBands("no bands defined".to_string()));
        }

        let mut seen = HashSet::new();
        for band in &self.bands {
            if !seen.insert(band.name.as_str()) {
                return Err(RiskError::InvalidBands(format!("duplicate band {}", band.name)));
            }
            if !(band.low.is_finite() && band.high.is_finite() && band.low < band.high) {
                return Err(RiskError::InvalidBands(format!(
                    "band {} has empty range [{}, {})",
                    band.name, band.low, band.high
                )));
            }
        }

        let mut sorted: Vec<&Band> = self.bands.iter().collect();
        sorted.sort_by(|a, b| a.low.partial_cmp(&b.low).unwrap_or(std::cmp::Ordering::Equal));

        if let Some(first) = sorted.first() {
            if first.low > BAND_EPSILON {
                return Err(RiskError::InvalidBands(format!(
                    "band {} starts at {}, scores from 0 are unclassified",
                    first.name, first.low
                )));
            }
        }
        for pair in sorted.windows(2) {
            let (prev, next) = (pair[0], pair[1]);
            if (next.low - prev.high).abs() > BAND_EPSILON {
                let kind = if next.low < prev.high { "overlaps" } else { "leaves a gap after" };
                return Err(RiskError::InvalidBands(format!(
                    "band {} {} band {}",
                    next.name, kind, prev.name
                )));
            }
        }
        if let Some(last) = sorted.last() {
            if last.high < 1.0 - BAND_EPSILON {
                return Err(RiskError::InvalidBands(format!(
                    "band {} ends at {}, scores up to 1 are unclassified",
                    last.name, last.high
                )));
            }
        }
        Ok(())
    }
}

/// Reads `{"name": [low, high], ...}` keeping document order
fn deserialize_bands<'de, D>(deserializer: D) -> std::result::Result<Vec<Band>, D::Error>
where
    D: Deserializer<'de>,
{
    struct BandsVisitor;

    impl<'de> Visitor<'de> for BandsVisitor {
        type Value = Vec<Band>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a map of band name to [low, high]")
        }

        fn visit_map<A>(self, mut map: A) -> std::result::Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut bands = Vec::with_capacity(map.size_hint().unwrap_or(3));
            while let Some((name, (low, high))) = map.next_entry::<String, (f64, f64)>()? {
                bands.push(Band { name, low, high });
            }
            Ok(bands)
        }
    }

    deserializer.deserialize_map(BandsVisitor)
}

fn serialize_bands<S>(bands: &[Band], serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let mut map = serializer.serialize_map(Some(bands.len()))?;
    for band in bands {
        map.serialize_entry(&band.name, &[band.low, band.high])?;
    }
    map.end()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{tempdir, NamedTempFile};

    fn write_config(json: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let config = WeightConfig::load(dir.path().join("weights.json")).unwrap();
        assert_eq!(config, WeightConfig::default());
        assert_eq!(config.weight(Factor::PopulationDensity), 0.25);
        assert_eq!(config.weight(Factor::ProximityToShelter), -0.05);
        let names: Vec<&str> = config.bands.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["low", "medium", "high"]);
    }

    #[test]
    fn test_load_from_file() {
        let file = write_config(
            r#"{
                "weights": {"population_density": 0.3, "residential_unit_count": 0.2},
                "bands": {"low": [0, 0.4], "medium": [0.4, 0.8], "high": [0.8, 1.0]}
            }"#,
        );
        let config = WeightConfig::load(file.path()).unwrap();
        assert_eq!(config.weight(Factor::PopulationDensity), 0.3);
        assert_eq!(config.weight(Factor::HazardLiquefactionRank), 0.0);
        assert_eq!(config.bands[1], Band::new("medium", 0.4, 0.8));
    }

    #[test]
    fn test_malformed_json_is_an_error() {
        let file = write_config(r#"{"weights": {"population_density": 0.3"#);
        assert!(matches!(WeightConfig::load(file.path()), Err(RiskError::Json(_))));
    }

    #[test]
    fn test_missing_weights_key_is_an_error() {
        let file = write_config(r#"{"bands": {"low": [0, 1.0]}}"#);
        assert!(matches!(WeightConfig::load(file.path()), Err(RiskError::Json(_))));
    }

    #[test]
    fn test_bands_default_when_omitted() {
        let file = write_config(r#"{"weights": {"flood_depth": 0.5}}"#);
        let config = WeightConfig::load(file.path()).unwrap();
        assert_eq!(config.bands, default_bands());
    }

    #[test]
    fn test_band_order_follows_document() {
        let config: WeightConfig = serde_json::from_str(
            r#"{"weights": {}, "bands": {"high": [0.5, 1.0], "low": [0, 0.5]}}"#,
        )
        .unwrap();
        assert_eq!(config.bands[0].name, "high");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_overlapping_bands_rejected() {
        let file = write_config(
            r#"{"weights": {}, "bands": {"low": [0, 0.5], "medium": [0.4, 0.8], "high": [0.8, 1.0]}}"#,
        );
        assert!(matches!(WeightConfig::load(file.path()), Err(RiskError::InvalidBands(_))));
    }

    #[test]
    fn test_gapped_bands_rejected() {
        let config: WeightConfig = serde_json::from_str(
            r#"{"weights": {}, "bands": {"low": [0, 0.3], "high": [0.5, 1.0]}}"#,
        )
        .unwrap();
        assert!(config.validate().is_err());

        let short: WeightConfig =
            serde_json::from_str(r#"{"weights": {}, "bands": {"low": [0, 0.9]}}"#).unwrap();
        assert!(short.validate().is_err());
    }

    #[test]
    fn test_classify_default_bands() {
        let config = WeightConfig::default();
        assert_eq!(config.classify(0.0), "low");
        assert_eq!(config.classify(0.1), "low");
        assert_eq!(config.classify(0.33), "medium");
        assert_eq!(config.classify(0.5), "medium");
        assert_eq!(config.classify(0.8), "high");
        assert_eq!(config.classify(1.0), "high");
    }

    #[test]
    fn test_classify_custom_bands() {
        let config: WeightConfig = serde_json::from_str(
            r#"{"weights": {}, "bands": {"low": [0, 0.4], "medium": [0.4, 0.8], "high": [0.8, 1.0]}}"#,
        )
        .unwrap();
        assert_eq!(config.classify(0.39), "low");
        assert_eq!(config.classify(0.40), "medium");
        assert_eq!(config.classify(0.79), "medium");
        assert_eq!(config.classify(0.80), "high");
        assert_eq!(config.classify(1.0), "high");
    }

    #[test]
    fn test_top_edge_falls_back_to_band_with_greatest_upper_bound() {
        // No band is called "high" and the top band is not declared last
        let config: WeightConfig = serde_json::from_str(
            r#"{"weights": {}, "bands": {"severe": [0.5, 1.0], "calm": [0, 0.5]}}"#,
        )
        .unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.classify(0.99), "severe");
        assert_eq!(config.classify(1.0), "severe");
    }

    #[test]
    fn test_bands_serialize_as_map() {
        let json = serde_json::to_value(WeightConfig::default()).unwrap();
        assert_eq!(json["bands"]["medium"], serde_json::json!([0.33, 0.67]));
    }
}
