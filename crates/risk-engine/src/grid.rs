//! Batch risk assessment over every population grid cell
//!
//! Unlike point scoring, factors here are normalized across the whole grid
//! and aggregated per cell:
//!
//! | Factor        | Per-cell metric                          | Normalization       |
//! |---------------|------------------------------------------|---------------------|
//! | population    | `pop_density`                            | / max over grid     |
//! | residential   | sum of `units` of buildings in the cell  | / 100, capped       |
//! | stories       | mean `levels` of buildings in the cell   | / 30, capped        |
//! | liquefaction  | max rank of intersecting zones (else 1)  | (rank - 1) / 4      |
//! | flood         | none                                     | 0                   |
//! | shelter       | centroid to nearest shelter, metres      | / max over grid     |

use crate::layers::{BuildingProps, GridCellProps, HazardProps, Layer};
use crate::{Factor, FactorValues, WeightConfig};
use serde::Serialize;
use geo::{BoundingRect, Contains, EuclideanDistance, Intersects};
use spatial_geometry::{centroid, interior_point, Geometry, Point, METERS_PER_DEGREE};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Unit count that saturates the residential factor
const UNITS_SCALE: f64 = 100.0;

/// Mean storeys that saturate the stories factor
const STORIES_SCALE: f64 = 30.0;

/// Raw per-cell metrics before normalization
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CellMetrics {
    pub pop_density: f64,
    pub total_units: u64,
    pub avg_building_stories: f64,
    pub residential_building_count: usize,
    pub hazard_liq_rank: u32,
    pub shelter_distance_m: f64,
}

/// Assessment of one grid cell
#[derive(Debug, Clone, Serialize)]
pub struct CellRisk {
    /// Index of the cell in the source file
    pub index: usize,
    pub metrics: CellMetrics,
    pub normalized: FactorValues,
    pub risk_score: f64,
    pub risk_band: String,
}

/// Assessment of the full grid
#[derive(Debug, Clone, Serialize)]
pub struct GridAssessment {
    pub cells: Vec<CellRisk>,
    pub mean_risk_score: f64,
    pub band_distribution: BTreeMap<String, usize>,
}

/// Score every grid cell. `shelters` are (lon, lat) points.
pub fn assess_grid(
    grid: &Layer<GridCellProps>,
    buildings: &Layer<BuildingProps>,
    hazards: &Layer<HazardProps>,
    shelters: &[Point<f64>],
    config: &WeightConfig,
) -> GridAssessment {
    info!(
        "Assessing {} grid cells against {} buildings, {} hazard zones, {} shelters",
        grid.len(),
        buildings.len(),
        hazards.len(),
        shelters.len()
    );

    let metrics: Vec<CellMetrics> = grid
        .features()
        .iter()
        .map(|cell| {
            let mut m = building_metrics(&cell.geometry, buildings);
            m.pop_density = cell.props.density();
            m.hazard_liq_rank = hazards
                .features()
                .iter()
                .filter(|zone| zone.geometry.intersects(&cell.geometry))
                .map(|zone| zone.props.rank())
                .max()
                .unwrap_or(1);
            m.shelter_distance_m = centroid(&cell.geometry)
                .map(|c| nearest_shelter_m(&c, shelters))
                .unwrap_or(0.0);
            m
        })
        .collect();

    let max_pop = positive_max(metrics.iter().map(|m| m.pop_density));
    let max_distance = positive_max(metrics.iter().map(|m| m.shelter_distance_m));

    let mut band_distribution = BTreeMap::new();
    let cells: Vec<CellRisk> = grid
        .features()
        .iter()
        .zip(metrics)
        .map(|(cell, metrics)| {
            let normalized = FactorValues {
                population_density: metrics.pop_density / max_pop,
                residential_unit_count: (metrics.total_units as f64 / UNITS_SCALE).clamp(0.0, 1.0),
                building_stories: (metrics.avg_building_stories / STORIES_SCALE).clamp(0.0, 1.0),
                hazard_liquefaction_rank: ((metrics.hazard_liq_rank as f64 - 1.0) / 4.0).clamp(0.0, 1.0),
                flood_depth: 0.0,
                proximity_to_shelter: metrics.shelter_distance_m / max_distance,
            };
            let raw = normalized.weighted_sum(config);
            let risk_score = if raw.is_finite() { raw.clamp(0.0, 1.0) } else { 0.0 };
            let risk_band = config.classify(risk_score).to_string();
            *band_distribution.entry(risk_band.clone()).or_insert(0) += 1;

            debug!("Cell {}: {:.3} {}", cell.index, risk_score, risk_band);

            CellRisk {
                index: cell.index,
                metrics,
                normalized,
                risk_score,
                risk_band,
            }
        })
        .collect();

    let mean_risk_score = if cells.is_empty() {
        0.0
    } else {
        cells.iter().map(|c| c.risk_score).sum::<f64>() / cells.len() as f64
    };

    GridAssessment {
        cells,
        mean_risk_score,
        band_distribution,
    }
}

/// Buildings are assigned to a cell by a point on their footprint, so each
/// building counts towards at most one cell
fn building_metrics(cell: &Geometry<f64>, buildings: &Layer<BuildingProps>) -> CellMetrics {
    let Some(bbox) = cell.bounding_rect() else {
        return CellMetrics::default();
    };
    let inside: Vec<&BuildingProps> = buildings
        .features()
        .iter()
        .filter(|b| {
            interior_point(&b.geometry).is_some_and(|p| p.intersects(&bbox) && cell.contains(&p))
        })
        .map(|b| &b.props)
        .collect();

    if inside.is_empty() {
        return CellMetrics::default();
    }

    CellMetrics {
        total_units: inside.iter().map(|b| b.units() as u64).sum(),
        avg_building_stories: inside.iter().map(|b| b.levels()).sum::<f64>() / inside.len() as f64,
        residential_building_count: inside.iter().filter(|b| b.is_residential()).count(),
        ..CellMetrics::default()
    }
}

/// Planar distance to the closest shelter, converted at 111 km per degree.
/// 0 when there are no shelters.
fn nearest_shelter_m(point: &Point<f64>, shelters: &[Point<f64>]) -> f64 {
    shelters
        .iter()
        .map(|s| point.euclidean_distance(s) * METERS_PER_DEGREE)
        .reduce(f64::min)
        .unwrap_or(0.0)
}

/// Largest value, or 1 when nothing is positive
fn positive_max(values: impl Iterator<Item = f64>) -> f64 {
    let max = values.fold(0.0, f64::max);
    if max > 0.0 {
        max
    } else {
        1.0
    }
}

impl CellRisk {
    /// Properties appended to the cell's GeoJSON feature
    pub fn properties(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut props = serde_json::Map::new();
        props.insert("total_units".into(), self.metrics.total_units.into());
        props.insert("avg_building_stories".into(), self.metrics.avg_building_stories.into());
        props.insert(
            "residential_building_count".into(),
            self.metrics.residential_building_count.into(),
        );
        props.insert("hazard_liq_rank".into(), self.metrics.hazard_liq_rank.into());
        props.insert("shelter_distance_m".into(), self.metrics.shelter_distance_m.into());
        for factor in Factor::ALL {
            props.insert(format!("norm_{}", factor), self.normalized.get(factor).into());
        }
        props.insert("risk_score".into(), self.risk_score.into());
        props.insert("risk_band".into(), self.risk_band.clone().into());
        props
    }
}
