#![doc = include_str!("../README.md")]

mod cluster;
mod input;
mod io;
mod loader;
mod lru;
mod map;
mod marker;
mod mercator;
mod position;
mod sources;
mod texture;
mod viewport;

pub use cluster::{
    ClusterStyler, DEFAULT_CLUSTER_THRESHOLD, DefaultClusterStyler, ElementVisual,
    ProjectedMarker, RenderElement, cluster,
};
pub use input::{Cursor, Pointer};
pub use io::{
    AssetKey, AssetRequest, Error as FetchError, Fetch, FetchOptions, HeaderValue, HttpFetch,
    Repaint,
};
pub use loader::Stats;
pub use lru::FixedCache;
pub use map::{Map, MapConfig};
pub use marker::{Marker, MarkerGroups, MarkerVisual};
pub use mercator::{MAX_LATITUDE, TileId, project, tile_id, total_tiles, unproject};
pub use position::{Pixels, PixelsExt, Position, lat_lon, lon_lat};
pub use sources::{Attribution, OpenStreetMap, TileSource, UrlTemplate};
pub use texture::{Canvas, Color, Rect, Texture};
pub use viewport::{
    InvalidZoom, Viewport, WHEEL_DEBOUNCE_TICKS, ZOOM_ANIMATION_TICKS, size_adaptation,
};
