//! Shelters Library
//!
//! Catalogue of Tokyo ward evacuation shelters and nearest-shelter ranking
//! by great-circle distance.

use serde::{Deserialize, Serialize};
use spatial_geometry::haversine_km;
use tracing::debug;

/// Shelters returned when the caller gives no limit
pub const DEFAULT_LIMIT: usize = 3;

/// Largest limit accepted at the API boundary
pub const MAX_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shelter {
    pub id: String,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    pub capacity: u32,
}

/// A shelter with its distance from the query point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShelterResult {
    pub id: String,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    /// Rounded to 2 decimals
    pub distance_km: f64,
    pub capacity: u32,
}

pub struct ShelterCatalogue {
    shelters: Vec<Shelter>,
}

impl ShelterCatalogue {
    pub fn new(shelters: Vec<Shelter>) -> Self {
        Self { shelters }
    }

    /// Major evacuation centres across central Tokyo wards
    pub fn tokyo_wards() -> Self {
        let entries = [
            ("shelter_001", "Tokyo Metropolitan Gymnasium", 35.6762, 139.7116, 5000),
            ("shelter_002", "Shibuya City Community Center", 35.6598, 139.7006, 2500),
            ("shelter_003", "Shinjuku Park Hyatt Emergency Center", 35.6935, 139.6917, 3000),
            ("shelter_004", "Minato Ward Civic Center", 35.6584, 139.7519, 1800),
            ("shelter_005", "Chiyoda Ward Emergency Facility", 35.6938, 139.7531, 2200),
            ("shelter_006", "Taito Cultural Center", 35.7139, 139.7794, 1500),
        ];

        Self::new(
            entries
                .into_iter()
                .map(|(id, name, lat, lon, capacity)| Shelter {
                    id: id.to_string(),
                    name: name.to_string(),
                    lat,
                    lon,
                    capacity,
                })
                .collect(),
        )
    }

    pub fn shelters(&self) -> &[Shelter] {
        &self.shelters
    }

    pub fn len(&self) -> usize {
        self.shelters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shelters.is_empty()
    }

    /// The `limit` closest shelters, nearest first. Sorting uses the exact
    /// distance; equal distances keep catalogue order.
    pub fn find_nearby(&self, lat: f64, lon: f64, limit: usize) -> Vec<ShelterResult> {
        let mut ranked: Vec<(f64, &Shelter)> = self
            .shelters
            .iter()
            .map(|s| (haversine_km(lat, lon, s.lat, s.lon), s))
            .collect();

        ranked.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

        let nearest: Vec<ShelterResult> = ranked
            .into_iter()
            .take(limit)
            .map(|(distance_km, s)| ShelterResult {
                id: s.id.clone(),
                name: s.name.clone(),
                lat: s.lat,
                lon: s.lon,
                distance_km: round_2dp(distance_km),
                capacity: s.capacity,
            })
            .collect();

        debug!(
            "Nearest {} of {} shelters to ({:.4}, {:.4})",
            nearest.len(),
            self.shelters.len(),
            lat,
            lon
        );

        nearest
    }
}

impl Default for ShelterCatalogue {
    fn default() -> Self {
        Self::tokyo_wards()
    }
}

fn round_2dp(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_catalogue_has_unique_ids() {
        let catalogue = ShelterCatalogue::tokyo_wards();
        assert_eq!(catalogue.len(), 6);
        let mut ids: Vec<&str> = catalogue.shelters().iter().map(|s| s.id.as_str()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 6);
    }

    #[test]
    fn test_nearest_from_shibuya() {
        let catalogue = ShelterCatalogue::tokyo_wards();
        let nearby = catalogue.find_nearby(35.6598, 139.7006, 3);

        assert_eq!(nearby.len(), 3);
        assert_eq!(nearby[0].id, "shelter_002");
        assert_eq!(nearby[0].distance_km, 0.0);
        assert_eq!(nearby[1].id, "shelter_001");
        assert!(nearby.windows(2).all(|w| w[0].distance_km <= w[1].distance_km));
    }

    #[test]
    fn test_distance_is_rounded() {
        let catalogue = ShelterCatalogue::tokyo_wards();
        for result in catalogue.find_nearby(35.68, 139.72, 6) {
            assert_eq!(result.distance_km, (result.distance_km * 100.0).round() / 100.0);
        }
    }

    #[test]
    fn test_limit_zero_is_empty() {
        let catalogue = ShelterCatalogue::tokyo_wards();
        assert!(catalogue.find_nearby(35.68, 139.72, 0).is_empty());
    }

    #[test]
    fn test_limit_beyond_catalogue() {
        let catalogue = ShelterCatalogue::tokyo_wards();
        assert_eq!(catalogue.find_nearby(35.68, 139.72, MAX_LIMIT).len(), 6);
    }

    #[test]
    fn test_ties_keep_catalogue_order() {
        let twin = |id: &str| Shelter {
            id: id.to_string(),
            name: id.to_string(),
            lat: 35.0,
            lon: 139.0,
            capacity: 100,
        };
        let catalogue = ShelterCatalogue::new(vec![twin("b"), twin("a"), twin("c")]);
        let ids: Vec<String> = catalogue
            .find_nearby(35.1, 139.1, 3)
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
    }

    proptest! {
        #[test]
        fn results_are_sorted_and_limited(
            lat in -90.0f64..=90.0,
            lon in -180.0f64..=180.0,
            limit in 0usize..=MAX_LIMIT,
        ) {
            let catalogue = ShelterCatalogue::tokyo_wards();
            let nearby = catalogue.find_nearby(lat, lon, limit);
            prop_assert!(nearby.len() <= limit);
            prop_assert_eq!(nearby.len(), limit.min(catalogue.len()));
            prop_assert!(nearby.windows(2).all(|w| w[0].distance_km <= w[1].distance_km));
        }
    }
}
