//! Point risk scoring
//!
//! For a query point the engine gathers one value per factor, weights them
//! with the [`WeightConfig`], clamps the sum to `[0, 1]` and classifies it.
//!
//! Per-factor normalization:
//! - Population: containing grid cell density / 1000. Not clamped here, so a
//!   dense cell can dominate before the final clamp.
//! - Residential count: residential buildings within 100 m / 10, capped at 1
//! - Stories: mean storeys within 100 m / 20, capped at 1
//! - Liquefaction: containing zone rank / 5, capped at 1
//! - Flood depth: always 0
//! - Shelter proximity: fixed 500 m / 1000 m

use crate::{
    Factor, FactorValues, Result, RiskError, RiskFactor, RiskScore, SpatialLayerStore,
    WeightConfig,
};
use spatial_geometry::Point;
use std::sync::Arc;
use tracing::debug;

/// Search radius for nearby buildings
pub const BUILDING_RADIUS_M: f64 = 100.0;

/// Density (per km²) that maps to a factor of 1
const POPULATION_SCALE: f64 = 1000.0;

/// Residential buildings within the radius that saturate the factor
const RESIDENTIAL_SCALE: f64 = 10.0;

/// Mean storeys that saturate the factor
const STORIES_SCALE: f64 = 20.0;

/// Highest liquefaction rank
const LIQUEFACTION_MAX_RANK: f64 = 5.0;

/// Distance to the nearest shelter until real routing is wired in
pub const MOCK_SHELTER_DISTANCE_M: f64 = 500.0;

/// Shelter distance that saturates the factor
const SHELTER_SCALE_M: f64 = 1000.0;

/// Contributors returned per score
pub const MAX_CONTRIBUTORS: usize = 5;

/// Scores points against shared layers and weights
#[derive(Debug, Clone)]
pub struct RiskEngine {
    layers: Arc<SpatialLayerStore>,
    config: Arc<WeightConfig>,
}

impl RiskEngine {
    pub fn new(layers: Arc<SpatialLayerStore>, config: Arc<WeightConfig>) -> Self {
        Self { layers, config }
    }

    pub fn config(&self) -> &WeightConfig {
        &self.config
    }

    pub fn layers(&self) -> &SpatialLayerStore {
        &self.layers
    }

    /// Score the point at (`lat`, `lon`). Coordinates are expected to be
    /// validated by the caller.
    pub fn calculate_risk_score(&self, lat: f64, lon: f64) -> Result<RiskScore> {
        let point = Point::new(lon, lat);
        let mut factors = FactorValues::default();
        let mut contributors = Vec::new();

        // P: population density of the containing grid cell
        if let Some(cell) = self.layers.containing_cell(&point) {
            let density = cell.density();
            factors.population_density = density / POPULATION_SCALE;
            contributors.push(RiskFactor {
                factor: Factor::PopulationDensity,
                value: factors.population_density,
                description: format!("Population density: {}/km²", density),
            });
        }

        // R, S: buildings around the point
        let nearby = self.layers.buildings_within(&point, BUILDING_RADIUS_M);
        if !nearby.is_empty() {
            let residential_count = nearby.iter().filter(|b| b.is_residential()).count();
            let avg_stories =
                nearby.iter().map(|b| b.levels()).sum::<f64>() / nearby.len() as f64;

            factors.residential_unit_count = (residential_count as f64 / RESIDENTIAL_SCALE).min(1.0);
            factors.building_stories = (avg_stories / STORIES_SCALE).min(1.0);

            contributors.push(RiskFactor {
                factor: Factor::ResidentialUnitCount,
                value: factors.residential_unit_count,
                description: format!("Residential buildings: {}", residential_count),
            });
            contributors.push(RiskFactor {
                factor: Factor::BuildingStories,
                value: factors.building_stories,
                description: format!("Average stories: {:.1}", avg_stories),
            });
        }

        // L: liquefaction zone
        if let Some(zone) = self.layers.containing_hazard(&point) {
            let rank = zone.rank();
            factors.hazard_liquefaction_rank = (rank as f64 / LIQUEFACTION_MAX_RANK).min(1.0);
            contributors.push(RiskFactor {
                factor: Factor::HazardLiquefactionRank,
                value: factors.hazard_liquefaction_rank,
                description: format!("Liquefaction risk: {}/5", rank),
            });
        }

        // F: no flood source yet, stays 0 and is never reported

        // D: shelter proximity
        factors.proximity_to_shelter = (MOCK_SHELTER_DISTANCE_M / SHELTER_SCALE_M).min(1.0);
        contributors.push(RiskFactor {
            factor: Factor::ProximityToShelter,
            value: factors.proximity_to_shelter,
            description: format!("Distance to shelter: {:.1}m", MOCK_SHELTER_DISTANCE_M),
        });

        let raw = factors.weighted_sum(&self.config);
        if !raw.is_finite() {
            return Err(RiskError::NonFiniteScore { lat, lon });
        }
        let risk_score = raw.clamp(0.0, 1.0);
        let band = self.config.classify(risk_score).to_string();

        rank_contributors(&mut contributors, &self.config);
        contributors.truncate(MAX_CONTRIBUTORS);

        debug!(
            "Scored ({:.5}, {:.5}): {:.3} {} (pop={:.2}, resi={:.2}, stories={:.2}, liq={:.2}, flood={:.2}, shelter={:.2})",
            lat,
            lon,
            risk_score,
            band,
            factors.population_density,
            factors.residential_unit_count,
            factors.building_stories,
            factors.hazard_liquefaction_rank,
            factors.flood_depth,
            factors.proximity_to_shelter
        );

        Ok(RiskScore {
            risk_score,
            band,
            top_contributors: contributors,
            lat,
            lon,
        })
    }
}

/// Order by |value · weight| descending; equal impacts keep their order
fn rank_contributors(contributors: &mut [RiskFactor], config: &WeightConfig) {
    let impact = |c: &RiskFactor| (c.value * config.weight(c.factor)).abs();
    contributors.sort_by(|a, b| {
        impact(b)
            .partial_cmp(&impact(a))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}
