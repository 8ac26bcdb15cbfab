//! Entrapment Risk Engine
//!
//! Scores how likely a person at a point is to be trapped after a major
//! earthquake, from three spatial layers and a weight table.
//!
//! # Scoring Model (6-Factor)
//!
//! ```text
//! Score(p) = clamp(w₁·P + w₂·R + w₃·S + w₄·L + w₅·F + w₆·D, 0, 1)
//! ```
//!
//! | Factor | Default weight | Normalization                          |
//! |--------|----------------|----------------------------------------|
//! | P      | 0.25           | grid cell density / 1000 (unclamped)   |
//! | R      | 0.20           | residential buildings within 100 m / 10 |
//! | S      | 0.15           | mean stories within 100 m / 20         |
//! | L      | 0.25           | liquefaction rank / 5                  |
//! | F      | 0.10           | flood depth (no source yet, always 0)  |
//! | D      | -0.05          | shelter distance / 1000 m              |
//!
//! The score maps onto a band table (`low`, `medium`, `high` by default) and
//! the factors with the largest `|value · weight|` are reported back.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

pub mod config;
pub mod grid;
pub mod layers;
pub mod scorer;

pub use config::{Band, WeightConfig};
pub use layers::{BuildingProps, BuildingUse, GridCellProps, HazardProps, Layer, SpatialLayerStore};
pub use scorer::RiskEngine;

#[derive(Error, Debug)]
pub enum RiskError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("GeoJSON error in {path:?}: {source}")]
    GeoJson {
        path: PathBuf,
        #[source]
        source: geojson::Error,
    },
    #[error("Expected a FeatureCollection in {0:?}")]
    NotFeatureCollection(PathBuf),
    #[error("Invalid band table: {0}")]
    InvalidBands(String),
    #[error("Risk score is not finite at ({lat}, {lon})")]
    NonFiniteScore { lat: f64, lon: f64 },
}

pub type Result<T> = std::result::Result<T, RiskError>;

/// Named risk factors; the snake_case names are the keys of the weight table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Factor {
    PopulationDensity,
    ResidentialUnitCount,
    BuildingStories,
    HazardLiquefactionRank,
    FloodDepth,
    ProximityToShelter,
}

impl Factor {
    pub const ALL: [Factor; 6] = [
        Factor::PopulationDensity,
        Factor::ResidentialUnitCount,
        Factor::BuildingStories,
        Factor::HazardLiquefactionRank,
        Factor::FloodDepth,
        Factor::ProximityToShelter,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Factor::PopulationDensity => "population_density",
            Factor::ResidentialUnitCount => "residential_unit_count",
            Factor::BuildingStories => "building_stories",
            Factor::HazardLiquefactionRank => "hazard_liquefaction_rank",
            Factor::FloodDepth => "flood_depth",
            Factor::ProximityToShelter => "proximity_to_shelter",
        }
    }
}

impl std::fmt::Display for Factor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized value for each of the six factors
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FactorValues {
    pub population_density: f64,
    pub residential_unit_count: f64,
    pub building_stories: f64,
    pub hazard_liquefaction_rank: f64,
    pub flood_depth: f64,
    pub proximity_to_shelter: f64,
}

impl FactorValues {
    pub fn get(&self, factor: Factor) -> f64 {
        match factor {
            Factor::PopulationDensity => self.population_density,
            Factor::ResidentialUnitCount => self.residential_unit_count,
            Factor::BuildingStories => self.building_stories,
            Factor::HazardLiquefactionRank => self.hazard_liquefaction_rank,
            Factor::FloodDepth => self.flood_depth,
            Factor::ProximityToShelter => self.proximity_to_shelter,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Factor, f64)> + '_ {
        Factor::ALL.into_iter().map(move |f| (f, self.get(f)))
    }

    /// Unclamped weighted sum; factors without a weight contribute 0
    pub fn weighted_sum(&self, config: &WeightConfig) -> f64 {
        self.iter().map(|(f, v)| config.weight(f) * v).sum()
    }
}

/// One factor's contribution, reported for explainability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskFactor {
    pub factor: Factor,
    pub value: f64,
    pub description: String,
}

/// Result of scoring a single point
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskScore {
    /// Clamped composite score (0-1)
    pub risk_score: f64,
    pub band: String,
    /// At most five contributors, largest impact first
    pub top_contributors: Vec<RiskFactor>,
    pub lat: f64,
    pub lon: f64,
}
