//! Risk scoring routes

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    routing::get,
    Json, Router,
};
use risk_engine::RiskScore;
use serde::Deserialize;

use crate::error::{validate_point, ApiError};
use crate::{tiles, AppState};

#[derive(Debug, Deserialize)]
pub struct PointQuery {
    pub lat: f64,
    pub lon: f64,
}

/// Routes under `/risk`
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/score", get(get_risk_score))
        .route("/heatmap/tiles/:z/:x/:file", get(tiles::get_tile))
}

/// Score a single point. Scoring runs on the blocking pool since the first
/// request may read the layer files.
pub async fn get_risk_score(
    State(state): State<AppState>,
    query: Result<Query<PointQuery>, QueryRejection>,
) -> Result<Json<RiskScore>, ApiError> {
    let Query(PointQuery { lat, lon }) = query?;
    validate_point(lat, lon)?;

    let engine = state.engine.clone();
    let score = tokio::task::spawn_blocking(move || engine.calculate_risk_score(lat, lon))
        .await
        .map_err(|e| ApiError::Internal(format!("scoring task failed: {}", e)))?
        .map_err(|e| ApiError::Internal(format!("error calculating risk: {}", e)))?;

    Ok(Json(score))
}
