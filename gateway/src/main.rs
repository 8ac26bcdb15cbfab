use anyhow::{Context, Result};
use axum::{extract::State, routing::get, Json, Router};
use risk_engine::{RiskEngine, SpatialLayerStore, WeightConfig};
use serde::Serialize;
use shelters::ShelterCatalogue;
use std::sync::Arc;
use tower_http::{
    cors::CorsLayer,
    services::{ServeDir, ServeFile},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod error;
mod risk_routes;
mod settings;
mod shelter_routes;
mod tiles;

use settings::Settings;
use tiles::{EmptyTileStore, TileStore};

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<RiskEngine>,
    pub shelters: Arc<ShelterCatalogue>,
    pub tiles: Arc<dyn TileStore>,
    pub settings: Arc<Settings>,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Serialize)]
pub struct Features {
    pub database: bool,
    pub local_mode: bool,
    pub tiles: bool,
    pub shelters: bool,
}

#[derive(Serialize)]
pub struct ConfigResponse {
    pub mode: String,
    pub version: &'static str,
    pub features: Features,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "entrapment_gateway=debug,info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::from_env()?;
    if settings.uses_database() {
        tracing::warn!(
            "   MODE=postgis (DB_URL {}): database queries are not served, using mock layers",
            if settings.db_url.is_some() { "set" } else { "unset" }
        );
    }

    let weights_path = settings.weights_path();
    let config = WeightConfig::load(&weights_path)
        .with_context(|| format!("Invalid weight config {:?}", weights_path))?;
    tracing::info!("   Weights: {} factors, {} bands", config.weights.len(), config.bands.len());

    let layers = Arc::new(SpatialLayerStore::new(&settings.mock_dir));
    if settings.preload_layers {
        let preload = layers.clone();
        tokio::task::spawn_blocking(move || preload.preload())
            .await?
            .context("Failed to preload spatial layers")?;
    } else {
        tracing::info!("   Layers load on first query from {}", settings.mock_dir.display());
    }

    let state = AppState {
        engine: Arc::new(RiskEngine::new(layers, Arc::new(config))),
        shelters: Arc::new(ShelterCatalogue::tokyo_wards()),
        tiles: Arc::new(EmptyTileStore::for_archive(&settings.tiles_path)),
        settings: Arc::new(settings),
    };
    let port = state.settings.port;
    let project_name = state.settings.project_name.clone();

    let app = build_app(state);

    let addr = format!("0.0.0.0:{}", port);
    tracing::info!("{} starting on {}", project_name, addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// API routes plus static mounts for whichever of the web and data
/// directories exist
pub fn build_app(state: AppState) -> Router {
    let web_dir = state.settings.web_dir.clone();
    let data_dir = state.settings.data_dir.clone();

    let mut app = Router::new()
        .route("/health", get(health))
        .route("/config", get(get_config))
        .nest("/risk", risk_routes::router())
        .nest("/shelters", shelter_routes::router())
        .nest("/tiles", tiles::router())
        .with_state(state);

    if web_dir.is_dir() {
        tracing::info!("   Serving web UI from {}", web_dir.display());
        app = app
            .nest_service("/static", ServeDir::new(&web_dir))
            .route_service("/", ServeFile::new(web_dir.join("index.html")));
    } else {
        tracing::warn!("   Web directory {} not found, UI disabled", web_dir.display());
    }

    if data_dir.is_dir() {
        app = app.nest_service("/data", ServeDir::new(&data_dir));
    }

    app.layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn get_config(State(state): State<AppState>) -> Json<ConfigResponse> {
    let settings = &state.settings;
    Json(ConfigResponse {
        mode: settings.mode.clone(),
        version: env!("CARGO_PKG_VERSION"),
        features: Features {
            database: settings.uses_database(),
            local_mode: settings.is_local(),
            tiles: true,
            shelters: true,
        },
    })
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::{build_app, Settings, SpatialLayerStore, WeightConfig};
    use axum::http::StatusCode;
    use risk_engine::Layer;

    #[tokio::test]
    async fn test_health() {
        let response = get(test_app(), "/health").await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn test_config_local_mode() {
        let body = body_json(get(test_app(), "/config").await).await;
        assert_eq!(body["mode"], "local");
        assert_eq!(body["features"]["local_mode"], true);
        assert_eq!(body["features"]["database"], false);
        assert_eq!(body["features"]["tiles"], true);
        assert_eq!(body["features"]["shelters"], true);
    }

    #[tokio::test]
    async fn test_config_postgis_mode() {
        let settings = Settings {
            mode: "postgis".to_string(),
            ..isolated_settings()
        };
        let layers = SpatialLayerStore::from_layers(Layer::empty(), Layer::empty(), Layer::empty());
        let app = build_app(state_with(layers, WeightConfig::default(), settings));

        let body = body_json(get(app, "/config").await).await;
        assert_eq!(body["features"]["database"], true);
        assert_eq!(body["features"]["local_mode"], false);
    }

    #[tokio::test]
    async fn test_static_mounts_when_directories_exist() {
        let root = tempfile::tempdir().unwrap();
        let web = root.path().join("web");
        let data = root.path().join("data");
        std::fs::create_dir_all(&web).unwrap();
        std::fs::create_dir_all(&data).unwrap();
        std::fs::write(web.join("index.html"), "<html>risk map</html>").unwrap();
        std::fs::write(web.join("app.js"), "console.log(1)").unwrap();
        std::fs::write(data.join("sample.geojson"), "{}").unwrap();

        let settings = Settings {
            web_dir: web,
            data_dir: data,
            ..Settings::default()
        };
        let layers = SpatialLayerStore::from_layers(Layer::empty(), Layer::empty(), Layer::empty());
        let app = build_app(state_with(layers, WeightConfig::default(), settings));

        let index = get(app.clone(), "/").await;
        assert_eq!(index.status(), StatusCode::OK);
        assert_eq!(body_bytes(index).await, b"<html>risk map</html>");

        assert_eq!(get(app.clone(), "/static/app.js").await.status(), StatusCode::OK);
        assert_eq!(get(app, "/data/sample.geojson").await.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_static_absent_without_directories() {
        assert_eq!(get(test_app(), "/").await.status(), StatusCode::NOT_FOUND);
        assert_eq!(get(test_app(), "/data/x.geojson").await.status(), StatusCode::NOT_FOUND);
    }
}
