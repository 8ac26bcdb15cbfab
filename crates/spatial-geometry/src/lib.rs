//! Spatial Geometry
//!
//! Distance and containment primitives shared by the risk engine and the
//! shelter service.
//!
//! Two flavours of math live here:
//!
//! | Function                    | Space          | Used for                       |
//! |-----------------------------|----------------|--------------------------------|
//! | `haversine_km`              | sphere, km     | shelter distances              |
//! | `geo::Contains`             | planar degrees | grid cell / hazard zone lookup |
//! | `geo::Intersects`           | planar degrees | hazard zones over grid cells   |
//! | `planar::within_distance`   | planar degrees | building radius search         |
//!
//! Planar tests treat (lon, lat) as Cartesian. Radius searches convert metres
//! with [`METERS_PER_DEGREE`], which is exact only for latitude.

use std::f64::consts::PI;
use thiserror::Error;

pub mod planar;

pub use geo::{Geometry, Point};
pub use planar::{centroid, from_geojson, interior_point, within_distance};

/// Mean Earth radius in km
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Approximate metres per degree of latitude
pub const METERS_PER_DEGREE: f64 = 111_000.0;

#[derive(Error, Debug)]
pub enum GeometryError {
    #[error("Invalid position: expected [lon, lat] finite numbers, got {0:?}")]
    InvalidPosition(Vec<f64>),
    #[error("Ring has {0} positions, need at least 3")]
    DegenerateRing(usize),
    #[error("Empty geometry")]
    Empty,
    #[error("GeoJSON conversion error: {0}")]
    GeoJson(#[from] geojson::Error),
}

pub type Result<T> = std::result::Result<T, GeometryError>;

/// Haversine distance between two points in km
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat1_rad = lat1 * PI / 180.0;
    let lat2_rad = lat2 * PI / 180.0;
    let dlat = (lat2 - lat1) * PI / 180.0;
    let dlon = (lon2 - lon1) * PI / 180.0;

    let a = (dlat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (dlon / 2.0).sin().powi(2);
    // Rounding can push `a` a hair above 1 for antipodal points
    let c = 2.0 * a.min(1.0).sqrt().asin();

    EARTH_RADIUS_KM * c
}

/// Convert a metre radius to the planar degree threshold used by
/// [`within_distance`].
pub fn meters_to_degrees(meters: f64) -> f64 {
    meters / METERS_PER_DEGREE
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_haversine() {
        // NYC to London: ~5,570 km
        let dist = haversine_km(40.7128, -74.0060, 51.5074, -0.1278);
        assert!((dist - 5570.0).abs() < 50.0);

        // Same point: 0 km
        let dist = haversine_km(35.6598, 139.7006, 35.6598, 139.7006);
        assert_eq!(dist, 0.0);
    }

    #[test]
    fn test_haversine_shibuya_to_shinjuku() {
        // Shibuya community centre to Shinjuku emergency centre, ~4 km
        let dist = haversine_km(35.6598, 139.7006, 35.6935, 139.6917);
        assert!(dist > 3.5 && dist < 4.2, "got {}", dist);
    }

    #[test]
    fn test_haversine_antipodal_is_finite() {
        let dist = haversine_km(0.0, 0.0, 0.0, 180.0);
        assert!(dist.is_finite());
        assert!((dist - PI * EARTH_RADIUS_KM).abs() < 1e-6);
    }

    #[test]
    fn test_meters_to_degrees() {
        assert!((meters_to_degrees(111_000.0) - 1.0).abs() < 1e-12);
        assert!((meters_to_degrees(100.0) - 0.000_900_9).abs() < 1e-6);
    }

    proptest! {
        #[test]
        fn haversine_is_symmetric(
            lat1 in -90.0f64..=90.0, lon1 in -180.0f64..=180.0,
            lat2 in -90.0f64..=90.0, lon2 in -180.0f64..=180.0,
        ) {
            let ab = haversine_km(lat1, lon1, lat2, lon2);
            let ba = haversine_km(lat2, lon2, lat1, lon1);
            prop_assert!((ab - ba).abs() < 1e-9);
            prop_assert!(ab >= 0.0);
        }

        #[test]
        fn haversine_self_distance_is_zero(lat in -90.0f64..=90.0, lon in -180.0f64..=180.0) {
            prop_assert_eq!(haversine_km(lat, lon, lat, lon), 0.0);
        }
    }
}
