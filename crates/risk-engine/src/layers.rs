//! Spatial layers loaded from GeoJSON
//!
//! Three layers feed the engine:
//!
//! | Layer     | File                  | Attributes                       |
//! |-----------|-----------------------|----------------------------------|
//! | Grid      | `grid_500m.geojson`   | `pop_density`                    |
//! | Buildings | `buildings.geojson`   | `use`, `levels`, `units`         |
//! | Hazard    | `hazard_liq.geojson`  | `liq_rank`                       |
//!
//! Each layer is read at most once per [`SpatialLayerStore`]. A missing file is
//! an empty layer. On the lazy path a corrupt file is logged and also treated
//! as empty; [`SpatialLayerStore::preload`] surfaces the error instead.

use crate::{Result, RiskError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use geo::Contains;
use spatial_geometry::{from_geojson, meters_to_degrees, within_distance, Geometry, Point};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerKind {
    Grid,
    Buildings,
    Hazard,
}

impl LayerKind {
    pub fn file_name(&self) -> &'static str {
        match self {
            LayerKind::Grid => "grid_500m.geojson",
            LayerKind::Buildings => "buildings.geojson",
            LayerKind::Hazard => "hazard_liq.geojson",
        }
    }
}

/// Accepts numbers or null; negative and non-finite values read as absent
fn lenient_level<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<f64>::deserialize(deserializer)?;
    Ok(value.filter(|v| v.is_finite() && *v >= 0.0))
}

/// Like [`lenient_level`], rounding to a whole count
fn lenient_count<'de, D>(deserializer: D) -> std::result::Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<f64>::deserialize(deserializer)?;
    Ok(value
        .filter(|v| v.is_finite() && *v >= 0.0)
        .map(|v| v.round().min(u32::MAX as f64) as u32))
}

/// Population grid cell attributes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GridCellProps {
    /// People per km²; absent reads as 0
    #[serde(default, alias = "population_density")]
    pub pop_density: Option<f64>,
}

impl GridCellProps {
    pub fn density(&self) -> f64 {
        self.pop_density.unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildingUse {
    Residential,
    #[serde(other)]
    Other,
}

/// Building footprint attributes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildingProps {
    /// Absent reads as [`BuildingUse::Other`]
    #[serde(default, rename = "use")]
    pub building_use: Option<BuildingUse>,
    /// Storeys, fractional values kept as given; absent reads as 1
    #[serde(default, deserialize_with = "lenient_level")]
    pub levels: Option<f64>,
    /// Dwelling units; absent reads as 0
    #[serde(default, deserialize_with = "lenient_count")]
    pub units: Option<u32>,
}

impl BuildingProps {
    pub fn is_residential(&self) -> bool {
        self.building_use == Some(BuildingUse::Residential)
    }

    pub fn levels(&self) -> f64 {
        self.levels.unwrap_or(1.0)
    }

    pub fn units(&self) -> u32 {
        self.units.unwrap_or(0)
    }
}

/// Liquefaction hazard zone attributes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HazardProps {
    /// Severity 1-5; absent reads as 1
    #[serde(default, alias = "liquefaction_rank", deserialize_with = "lenient_count")]
    pub liq_rank: Option<u32>,
}

impl HazardProps {
    pub fn rank(&self) -> u32 {
        self.liq_rank.unwrap_or(1)
    }
}

/// A feature's geometry with its typed attributes
#[derive(Debug, Clone)]
pub struct Feature<P> {
    /// Position in the source file
    pub index: usize,
    pub geometry: Geometry<f64>,
    pub props: P,
}

/// An immutable collection of features in file order
#[derive(Debug, Clone)]
pub struct Layer<P> {
    features: Vec<Feature<P>>,
    crs: Option<String>,
}

impl<P> Default for Layer<P> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<P> Layer<P> {
    pub fn empty() -> Self {
        Self {
            features: Vec::new(),
            crs: None,
        }
    }

    pub fn new(features: Vec<Feature<P>>) -> Self {
        Self { features, crs: None }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn features(&self) -> &[Feature<P>] {
        &self.features
    }

    /// Declared CRS name, `None` meaning geographic lon/lat
    pub fn crs(&self) -> Option<&str> {
        self.crs.as_deref()
    }

    /// Attributes of the first feature containing `point`
    pub fn containing(&self, point: &Point<f64>) -> Option<&P> {
        self.features
            .iter()
            .find(|f| f.geometry.contains(point))
            .map(|f| &f.props)
    }

    /// Attributes of every feature closer than `radius_m`, using the
    /// 111 km-per-degree approximation
    pub fn within_radius(&self, point: &Point<f64>, radius_m: f64) -> Vec<&P> {
        let radius_deg = meters_to_degrees(radius_m);
        self.features
            .iter()
            .filter(|f| within_distance(&f.geometry, point, radius_deg))
            .map(|f| &f.props)
            .collect()
    }
}

fn crs_name(collection: &geojson::FeatureCollection) -> Option<String> {
    let crs = collection.foreign_members.as_ref()?.get("crs")?;
    crs.pointer("/properties/name")
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

fn is_geographic(crs: &str) -> bool {
    let upper = crs.to_ascii_uppercase();
    upper.contains("CRS84") || upper.ends_with("4326")
}

/// Read a layer file. `Ok(None)` when the file does not exist.
///
/// Features without geometry, with invalid geometry, or with attributes of
/// the wrong type are skipped and counted.
pub fn load_layer<P: DeserializeOwned>(path: impl AsRef<Path>) -> Result<Option<Layer<P>>> {
    let path = path.as_ref();
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let geojson: geojson::GeoJson = text.parse().map_err(|source| RiskError::GeoJson {
        path: path.to_path_buf(),
        source,
    })?;
    let collection = match geojson {
        geojson::GeoJson::FeatureCollection(fc) => fc,
        _ => return Err(RiskError::NotFeatureCollection(path.to_path_buf())),
    };

    let crs = crs_name(&collection);
    if let Some(name) = crs.as_deref().filter(|c| !is_geographic(c)) {
        warn!("{:?} declares CRS {}, coordinates used as lon/lat degrees", path, name);
    }

    let mut features = Vec::with_capacity(collection.features.len());
    let mut skipped = 0;

    for (index, feature) in collection.features.into_iter().enumerate() {
        let geometry = match feature.geometry.as_ref().map(|g| from_geojson(&g.value)) {
            Some(Ok(geometry)) => geometry,
            Some(Err(e)) => {
                warn!("{:?} feature {}: {}", path, index, e);
                skipped += 1;
                continue;
            }
            None => {
                skipped += 1;
                continue;
            }
        };
        let props = serde_json::Value::Object(feature.properties.unwrap_or_default());
        let props: P = match serde_json::from_value(props) {
            Ok(p) => p,
            Err(e) => {
                warn!("{:?} feature {}: bad attributes: {}", path, index, e);
                skipped += 1;
                continue;
            }
        };
        features.push(Feature {
            index,
            geometry,
            props,
        });
    }

    info!(
        "Loaded {} features from {:?} ({} skipped)",
        features.len(),
        path,
        skipped
    );

    Ok(Some(Layer { features, crs }))
}

/// Lazy loader for the lookup path: absent and corrupt both mean empty
fn load_or_empty<P: DeserializeOwned>(path: &Path) -> Layer<P> {
    match load_layer(path) {
        Ok(Some(layer)) => layer,
        Ok(None) => {
            warn!("Layer file {:?} not found, treating as empty", path);
            Layer::empty()
        }
        Err(e) => {
            error!("Failed to load layer {:?}: {}; treating as empty", path, e);
            Layer::empty()
        }
    }
}

/// Owns the three layer caches; each layer is loaded on first use
#[derive(Debug)]
pub struct SpatialLayerStore {
    data_dir: PathBuf,
    grid: OnceLock<Layer<GridCellProps>>,
    buildings: OnceLock<Layer<BuildingProps>>,
    hazards: OnceLock<Layer<HazardProps>>,
}

impl SpatialLayerStore {
    /// Store reading layer files from `data_dir`
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            grid: OnceLock::new(),
            buildings: OnceLock::new(),
            hazards: OnceLock::new(),
        }
    }

    /// Store with layers already in memory
    pub fn from_layers(
        grid: Layer<GridCellProps>,
        buildings: Layer<BuildingProps>,
        hazards: Layer<HazardProps>,
    ) -> Self {
        let store = Self::new(PathBuf::new());
        let _ = store.grid.set(grid);
        let _ = store.buildings.set(buildings);
        let _ = store.hazards.set(hazards);
        store
    }

    pub fn path(&self, kind: LayerKind) -> PathBuf {
        self.data_dir.join(kind.file_name())
    }

    pub fn grid(&self) -> &Layer<GridCellProps> {
        self.grid.get_or_init(|| load_or_empty(&self.path(LayerKind::Grid)))
    }

    pub fn buildings(&self) -> &Layer<BuildingProps> {
        self.buildings
            .get_or_init(|| load_or_empty(&self.path(LayerKind::Buildings)))
    }

    pub fn hazards(&self) -> &Layer<HazardProps> {
        self.hazards
            .get_or_init(|| load_or_empty(&self.path(LayerKind::Hazard)))
    }

    /// Grid cell containing `point`
    pub fn containing_cell(&self, point: &Point<f64>) -> Option<&GridCellProps> {
        self.grid().containing(point)
    }

    /// Hazard zone containing `point`
    pub fn containing_hazard(&self, point: &Point<f64>) -> Option<&HazardProps> {
        self.hazards().containing(point)
    }

    /// Buildings closer than `radius_m` to `point`
    pub fn buildings_within(&self, point: &Point<f64>, radius_m: f64) -> Vec<&BuildingProps> {
        self.buildings().within_radius(point, radius_m)
    }

    /// Load every layer not yet cached, failing on a corrupt file. Missing
    /// files still load as empty.
    pub fn preload(&self) -> Result<()> {
        preload_into(&self.grid, &self.path(LayerKind::Grid))?;
        preload_into(&self.buildings, &self.path(LayerKind::Buildings))?;
        preload_into(&self.hazards, &self.path(LayerKind::Hazard))?;
        info!(
            "Preloaded layers: {} grid cells, {} buildings, {} hazard zones",
            self.grid().len(),
            self.buildings().len(),
            self.hazards().len()
        );
        Ok(())
    }
}

fn preload_into<P: DeserializeOwned>(cell: &OnceLock<Layer<P>>, path: &Path) -> Result<()> {
    if cell.get().is_some() {
        return Ok(());
    }
    let layer = load_layer(path)?.unwrap_or_else(|| {
        warn!("Layer file {:?} not found, treating as empty", path);
        Layer::empty()
    });
    // A concurrent lazy load may have won; its value is equivalent
    let _ = cell.set(layer);
    Ok(())
}
