//! Runtime settings read from the environment
//!
//! A `.env` file in the working directory is loaded first when present.

use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::path::PathBuf;

/// Weight table file name under `CONFIG_DIR`
pub const WEIGHTS_FILE: &str = "weights.json";

#[derive(Debug, Clone)]
pub struct Settings {
    /// `local` reads mock GeoJSON; `postgis` is reported but not served
    pub mode: String,
    pub port: u16,
    pub db_url: Option<String>,
    pub tiles_path: PathBuf,
    pub data_dir: PathBuf,
    pub mock_dir: PathBuf,
    pub config_dir: PathBuf,
    pub web_dir: PathBuf,
    pub project_name: String,
    /// Load every layer at startup and refuse to start on a corrupt one
    pub preload_layers: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            mode: "local".to_string(),
            port: 8000,
            db_url: None,
            tiles_path: PathBuf::from("./data/tiles/risk.pmtiles"),
            data_dir: PathBuf::from("data"),
            mock_dir: PathBuf::from("data/mock"),
            config_dir: PathBuf::from("config"),
            web_dir: PathBuf::from("web"),
            project_name: "Tokyo Disaster Anticipation API".to_string(),
            preload_layers: false,
        }
    }
}

impl Settings {
    /// Load settings from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build settings from any key lookup; unset keys keep their defaults
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let path = |key: &str, default: PathBuf| lookup(key).map(PathBuf::from).unwrap_or(default);

        Ok(Self {
            mode: lookup("MODE").unwrap_or(defaults.mode),
            port: match lookup("PORT") {
                Some(port) => port.parse().context("PORT must be a valid number")?,
                None => defaults.port,
            },
            db_url: lookup("DB_URL").filter(|url| !url.is_empty()),
            tiles_path: path("TILES_PATH", defaults.tiles_path),
            data_dir: path("DATA_DIR", defaults.data_dir),
            mock_dir: path("MOCK_DIR", defaults.mock_dir),
            config_dir: path("CONFIG_DIR", defaults.config_dir),
            web_dir: path("WEB_DIR", defaults.web_dir),
            project_name: lookup("PROJECT_NAME").unwrap_or(defaults.project_name),
            preload_layers: match lookup("PRELOAD_LAYERS") {
                Some(flag) => parse_flag(&flag).context("PRELOAD_LAYERS must be true or false")?,
                None => defaults.preload_layers,
            },
        })
    }

    pub fn weights_path(&self) -> PathBuf {
        self.config_dir.join(WEIGHTS_FILE)
    }

    pub fn is_local(&self) -> bool {
        self.mode == "local"
    }

    pub fn uses_database(&self) -> bool {
        self.mode == "postgis"
    }
}

fn parse_flag(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => anyhow::bail!("unrecognized flag value {:?}", other),
    }
}
