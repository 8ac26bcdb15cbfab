//! Planar predicates over `geo` geometries read from GeoJSON
//!
//! Coordinates stay in degrees with x = longitude and y = latitude. The
//! predicates themselves come from `geo`; this module only validates input
//! and fixes the conventions the risk layers rely on.

use geo::{BoundingRect, Centroid, EuclideanDistance, Geometry, InteriorPoint, Point};
use geojson::{PolygonType, Position, Value};

use crate::{GeometryError, Result};

/// Parse a GeoJSON geometry into a `geo` geometry.
///
/// Positions must carry finite `[lon, lat]` numbers and polygon rings at
/// least three positions. Geometries without any coordinate are rejected.
pub fn from_geojson(value: &Value) -> Result<Geometry<f64>> {
    check_value(value)?;
    let geometry = Geometry::<f64>::try_from(value)?;
    if geometry.bounding_rect().is_none() {
        return Err(GeometryError::Empty);
    }
    Ok(geometry)
}

/// Strict planar radius test: `distance < radius_deg`.
///
/// A point inside a polygon is at distance 0, so a zero radius never
/// matches anything.
pub fn within_distance(geometry: &Geometry<f64>, point: &Point<f64>, radius_deg: f64) -> bool {
    point.euclidean_distance(geometry) < radius_deg
}

/// A point guaranteed to lie on the geometry, used to assign a feature to
/// the cell that holds it
pub fn interior_point(geometry: &Geometry<f64>) -> Option<Point<f64>> {
    geometry.interior_point()
}

pub fn centroid(geometry: &Geometry<f64>) -> Option<Point<f64>> {
    geometry.centroid()
}

fn check_value(value: &Value) -> Result<()> {
    match value {
        Value::Point(position) => check_position(position),
        Value::MultiPoint(positions) | Value::LineString(positions) => {
            positions.iter().try_for_each(check_position)
        }
        Value::MultiLineString(lines) => lines.iter().flatten().try_for_each(check_position),
        Value::Polygon(rings) => check_rings(rings),
        Value::MultiPolygon(polygons) => polygons.iter().try_for_each(check_rings),
        Value::GeometryCollection(geometries) => geometries
            .iter()
            .try_for_each(|geometry| check_value(&geometry.value)),
    }
}

fn check_rings(rings: &PolygonType) -> Result<()> {
    for ring in rings {
        if ring.len() < 3 {
            return Err(GeometryError::DegenerateRing(ring.len()));
        }
        ring.iter().try_for_each(check_position)?;
    }
    Ok(())
}

fn check_position(position: &Position) -> Result<()> {
    if position.len() < 2 || !position[0].is_finite() || !position[1].is_finite() {
        return Err(GeometryError::InvalidPosition(position.clone()));
    }
    Ok(())
}
