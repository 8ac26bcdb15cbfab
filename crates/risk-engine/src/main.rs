//! Risk Grid CLI
//!
//! Scores every cell of the population grid and writes the result as GeoJSON.
//!
//! Usage:
//!   compute-risk --mock-dir data/mock \
//!                --config config/weights.json \
//!                --output data/computed/risk_grid.geojson

use anyhow::{bail, Context, Result};
use clap::Parser;
use geojson::{FeatureCollection, GeoJson};
use risk_engine::grid::{assess_grid, GridAssessment};
use risk_engine::layers::{load_layer, LayerKind};
use risk_engine::{BuildingProps, GridCellProps, HazardProps, Layer, WeightConfig};
use serde::de::DeserializeOwned;
use shelters::ShelterCatalogue;
use spatial_geometry::Point;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(
    name = "compute-risk",
    about = "Compute entrapment risk for every population grid cell"
)]
struct Args {
    /// Directory holding grid_500m, buildings and hazard_liq GeoJSON layers
    #[arg(short, long, default_value = "data/mock")]
    mock_dir: PathBuf,

    /// Weight and band table
    #[arg(short, long, default_value = "config/weights.json")]
    config: PathBuf,

    /// Output GeoJSON file
    #[arg(short, long, default_value = "data/computed/risk_grid.geojson")]
    output: PathBuf,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("{}", "=".repeat(60));
    info!("Entrapment Risk Grid");
    info!("{}", "=".repeat(60));

    let config = WeightConfig::load(&args.config)
        .with_context(|| format!("loading weight config {:?}", args.config))?;

    let grid_path = args.mock_dir.join(LayerKind::Grid.file_name());
    let grid: Layer<GridCellProps> = match load_layer(&grid_path)? {
        Some(grid) if !grid.is_empty() => grid,
        _ => bail!("No grid data found at {:?}", grid_path),
    };
    let buildings: Layer<BuildingProps> = load_optional(&args.mock_dir, LayerKind::Buildings)?;
    let hazards: Layer<HazardProps> = load_optional(&args.mock_dir, LayerKind::Hazard)?;

    let shelters = shelter_points(&ShelterCatalogue::tokyo_wards());

    let assessment = assess_grid(&grid, &buildings, &hazards, &shelters, &config);

    let source = read_collection(&grid_path)?;
    let output = annotate(source, &assessment);

    if let Some(parent) = args.output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    info!("Writing risk grid to {:?}", args.output);
    let file = File::create(&args.output)?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, &GeoJson::FeatureCollection(output))?;

    info!("{}", "=".repeat(60));
    info!("SUMMARY");
    info!("{}", "=".repeat(60));
    info!("Cells scored: {}", assessment.cells.len());
    info!("Mean risk score: {:.3}", assessment.mean_risk_score);
    for (band, count) in &assessment.band_distribution {
        info!("  {}: {} cells", band, count);
    }

    Ok(())
}

/// Every catalogue shelter as a (lon, lat) point
fn shelter_points(catalogue: &ShelterCatalogue) -> Vec<Point<f64>> {
    catalogue
        .shelters()
        .iter()
        .map(|s| Point::new(s.lon, s.lat))
        .collect()
}

/// A missing layer is empty; a corrupt one aborts the run
fn load_optional<P: DeserializeOwned>(dir: &Path, kind: LayerKind) -> Result<Layer<P>> {
    let path = dir.join(kind.file_name());
    match load_layer(&path).with_context(|| format!("loading {:?}", path))? {
        Some(layer) => Ok(layer),
        None => {
            warn!("{:?} not found, continuing without it", path);
            Ok(Layer::empty())
        }
    }
}

fn read_collection(path: &Path) -> Result<FeatureCollection> {
    let text = std::fs::read_to_string(path)?;
    match text.parse::<GeoJson>()? {
        GeoJson::FeatureCollection(fc) => Ok(fc),
        _ => bail!("{:?} is not a FeatureCollection", path),
    }
}

/// Keep the scored cells with their original properties and geometry, plus
/// the computed attributes
fn annotate(source: FeatureCollection, assessment: &GridAssessment) -> FeatureCollection {
    let scored: Vec<geojson::Feature> = assessment
        .cells
        .iter()
        .filter_map(|cell| {
            let mut feature = source.features.get(cell.index)?.clone();
            let props = feature.properties.get_or_insert_with(Default::default);
            props.extend(cell.properties());
            Some(feature)
        })
        .collect();

    let mut metadata = source.foreign_members.unwrap_or_default();
    metadata.insert(
        "generated_at".into(),
        chrono::Utc::now().to_rfc3339().into(),
    );
    metadata.insert("cells".into(), scored.len().into());
    metadata.insert("mean_risk_score".into(), assessment.mean_risk_score.into());

    FeatureCollection {
        bbox: source.bbox,
        features: scored,
        foreign_members: Some(metadata),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_measures_against_whole_catalogue() {
        let points = shelter_points(&ShelterCatalogue::tokyo_wards());
        assert_eq!(points.len(), 6);
        // Taito Cultural Center is part of the grid shelter set
        assert!(points.contains(&Point::new(139.7794, 35.7139)));
    }

    #[test]
    fn test_cell_near_taito_uses_taito_distance() {
        let cell = geojson::Value::Polygon(vec![vec![
            vec![139.7784, 35.7129],
            vec![139.7804, 35.7129],
            vec![139.7804, 35.7149],
            vec![139.7784, 35.7149],
            vec![139.7784, 35.7129],
        ]]);
        let grid = Layer::new(vec![risk_engine::layers::Feature {
            index: 0,
            geometry: spatial_geometry::from_geojson(&cell).unwrap(),
            props: GridCellProps::default(),
        }]);
        let shelters = shelter_points(&ShelterCatalogue::tokyo_wards());

        let assessment = assess_grid(&grid, &Layer::empty(), &Layer::empty(), &shelters, &WeightConfig::default());
        assert!(assessment.cells[0].metrics.shelter_distance_m < 1.0);
    }
}
