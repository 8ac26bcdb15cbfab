use axum::{
    extract::{rejection::QueryRejection, Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use shelters::{ShelterResult, DEFAULT_LIMIT, MAX_LIMIT};

use crate::error::{validate_point, ApiError};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct NearbyQuery {
    pub lat: f64,
    pub lon: f64,
    pub limit: Option<usize>,
}

#[derive(Serialize)]
pub struct NearbySheltersResponse {
    pub shelters: Vec<ShelterResult>,
    pub lat: f64,
    pub lon: f64,
}

/// Routes under `/shelters`
pub fn router() -> Router<AppState> {
    Router::new().route("/nearby", get(get_nearby_shelters))
}

pub async fn get_nearby_shelters(
    State(state): State<AppState>,
    query: Result<Query<NearbyQuery>, QueryRejection>,
) -> Result<Json<NearbySheltersResponse>, ApiError> {
    let Query(NearbyQuery { lat, lon, limit }) = query?;
    validate_point(lat, lon)?;

    let limit = limit.unwrap_or(DEFAULT_LIMIT);
    if limit > MAX_LIMIT {
        return Err(ApiError::BadRequest(format!(
            "limit must be at most {}",
            MAX_LIMIT
        )));
    }

    Ok(Json(NearbySheltersResponse {
        shelters: state.shelters.find_nearby(lat, lon, limit),
        lat,
        lon,
    }))
}

#[cfg(test)]
mod tests {
    use crate::test_support::{body_json, get, test_app};
    use axum::http::StatusCode;

    #[tokio::test]
    async fn test_default_limit() {
        let response = get(test_app(), "/shelters/nearby?lat=35.6598&lon=139.7006").await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        let shelters = body["shelters"].as_array().unwrap();
        assert_eq!(shelters.len(), 3);
        assert_eq!(shelters[0]["id"], "shelter_002");
        assert_eq!(shelters[0]["distance_km"], 0.0);
        assert_eq!(body["lat"], 35.6598);
        assert_eq!(body["lon"], 139.7006);

        let distances: Vec<f64> = shelters
            .iter()
            .map(|s| s["distance_km"].as_f64().unwrap())
            .collect();
        assert!(distances.windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test]
    async fn test_limit_zero_is_empty() {
        let response = get(test_app(), "/shelters/nearby?lat=35.68&lon=139.7&limit=0").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_json(response).await["shelters"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_limit_above_max_is_400() {
        let response = get(test_app(), "/shelters/nearby?lat=35.68&lon=139.7&limit=11").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "limit must be at most 10");
    }

    #[tokio::test]
    async fn test_negative_limit_is_400() {
        let response = get(test_app(), "/shelters/nearby?lat=35.68&lon=139.7&limit=-1").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_invalid_latitude() {
        let response = get(test_app(), "/shelters/nearby?lat=-95&lon=139.7").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "Invalid latitude");
    }
}
