//! Vector tile serving
//!
//! Tiles come from a [`TileStore`]. The only store today answers every
//! in-range key with an empty tile; a PMTiles reader would slot in behind
//! the same trait.

use axum::{
    extract::{rejection::PathRejection, Path, State},
    http::header,
    response::IntoResponse,
    routing::get,
    Router,
};
use std::path::Path as FsPath;
use tracing::{debug, info, warn};

use crate::error::ApiError;
use crate::AppState;

/// Deepest zoom level served
pub const MAX_ZOOM: u32 = 22;

const EMPTY_TILE: &[u8] = b"\x00";

/// Slippy-map tile address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileKey {
    pub z: u32,
    pub x: u32,
    pub y: u32,
}

impl TileKey {
    /// Whether x and y fall inside the 2^z grid for a supported zoom
    pub fn in_range(&self) -> bool {
        if self.z > MAX_ZOOM {
            return false;
        }
        let side = 1u64 << self.z;
        (self.x as u64) < side && (self.y as u64) < side
    }
}

pub trait TileStore: Send + Sync {
    /// Raw tile bytes, `None` when the store has no such tile
    fn get(&self, key: TileKey) -> Option<Vec<u8>>;
}

/// Serves an empty tile for every valid key
#[derive(Debug, Default)]
pub struct EmptyTileStore;

impl EmptyTileStore {
    /// Store standing in for the archive at `path`
    pub fn for_archive(path: &FsPath) -> Self {
        if path.exists() {
            info!("Tile archive {} present, serving empty tiles", path.display());
        } else {
            warn!("Tile archive {} not found, serving empty tiles", path.display());
        }
        Self
    }
}

impl TileStore for EmptyTileStore {
    fn get(&self, key: TileKey) -> Option<Vec<u8>> {
        key.in_range().then(|| EMPTY_TILE.to_vec())
    }
}

/// Routes under `/tiles`
pub fn router() -> Router<AppState> {
    Router::new().route("/:z/:x/:file", get(get_tile))
}

/// Path segments `{z}/{x}/{y}.pbf` to a key; `None` for a bad file name
fn parse_key(z: u32, x: u32, file: &str) -> Option<TileKey> {
    let y = file.strip_suffix(".pbf")?.parse().ok()?;
    Some(TileKey { z, x, y })
}

pub async fn get_tile(
    State(state): State<AppState>,
    path: Result<Path<(u32, u32, String)>, PathRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Path((z, x, file)) = path?;
    let key = parse_key(z, x, &file)
        .ok_or_else(|| ApiError::NotFound(format!("Tile not found: {}/{}/{}", z, x, file)))?;

    let bytes = state
        .tiles
        .get(key)
        .ok_or_else(|| ApiError::NotFound(format!("Tile not found: {}/{}/{}", z, x, key.y)))?;

    debug!("Tile {}/{}/{}: {} bytes", key.z, key.x, key.y, bytes.len());
    Ok(([(header::CONTENT_TYPE, "application/x-protobuf")], bytes))
}
