//! Project the lat/lon coordinates into a 2D x/y using the Web Mercator.
//! <https://en.wikipedia.org/wiki/Web_Mercator_projection>
//! <https://wiki.openstreetmap.org/wiki/Slippy_map_tilenames>

use crate::{
    lon_lat,
    position::{Pixels, Position},
};
use std::f64::consts::PI;

// zoom level   tile coverage  number of tiles  tile size(*) in degrees
// 0            1 tile         1 tile           360° x 170.1022°
// 1            2 × 2 tiles    4 tiles          180° x 85.0511°
// 2            4 × 4 tiles    16 tiles         90° x [variable]

/// Mercator is only defined for latitudes within this range; the poles are cut off.
pub const MAX_LATITUDE: f64 = 85.05112878;

/// Zoom specifies how many pixels are in the whole map. For example, zoom 0 means that the whole
/// map is just one tile, zoom 1 means that it is 2x2 tiles, and so on.
pub(crate) fn total_pixels(zoom: f64, tile_size: u32) -> f64 {
    2f64.powf(zoom) * (tile_size as f64)
}

pub fn total_tiles(zoom: u8) -> u32 {
    2u32.pow(zoom as u32)
}

/// Project the position into the Mercator projection and normalize it to 0-1 range. Positions
/// outside the projection's validity range are clamped onto its edge.
fn mercator_normalized(position: Position) -> (f64, f64) {
    let lat = position.y().clamp(-MAX_LATITUDE, MAX_LATITUDE);
    let lon = position.x().clamp(-180., 180.);

    // Project into Mercator (cylindrical map projection).
    let x = lon.to_radians();
    let y = lat.to_radians().tan().asinh();

    // Scale both x and y to 0-1 range.
    let x = (1. + (x / PI)) / 2.;
    let y = (1. - (y / PI)) / 2.;

    (x, y)
}

/// Identifies a tile in the tile grid.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
pub struct TileId {
    /// X number of the tile.
    pub x: u32,

    /// Y number of the tile.
    pub y: u32,

    /// Zoom level, where 0 means no zoom.
    /// See: <https://wiki.openstreetmap.org/wiki/Zoom_levels>
    pub zoom: u8,
}

impl TileId {
    /// Tile position (in pixels) on the "World bitmap".
    pub fn project(&self, tile_size: f64) -> Pixels {
        Pixels::new(self.x as f64 * tile_size, self.y as f64 * tile_size)
    }

    /// The tile one zoom level coarser containing this tile.
    pub fn parent(&self) -> Option<TileId> {
        Some(TileId {
            x: self.x / 2,
            y: self.y / 2,
            zoom: self.zoom.checked_sub(1)?,
        })
    }

    /// The four tiles one zoom level finer covering this tile.
    pub fn children(&self) -> [TileId; 4] {
        let (x, y, zoom) = (self.x * 2, self.y * 2, self.zoom + 1);
        [
            TileId { x, y, zoom },
            TileId { x: x + 1, y, zoom },
            TileId { x, y: y + 1, zoom },
            TileId { x: x + 1, y: y + 1, zoom },
        ]
    }

    pub fn valid(&self) -> bool {
        self.x < total_tiles(self.zoom) && self.y < total_tiles(self.zoom)
    }
}

/// Calculate the tile coordinates for the given position.
pub fn tile_id(position: Position, zoom: u8) -> TileId {
    let (x, y) = mercator_normalized(position);

    // Map that into a big bitmap made out of web tiles.
    let number_of_tiles = 2u32.pow(zoom as u32) as f64;
    let x = ((x * number_of_tiles).floor() as u32).min(total_tiles(zoom) - 1);
    let y = ((y * number_of_tiles).floor() as u32).min(total_tiles(zoom) - 1);

    TileId { x, y, zoom }
}

/// Project geographical position into a 2D plane using Mercator.
pub fn project(position: Position, zoom: f64, tile_size: u32) -> Pixels {
    let total_pixels = total_pixels(zoom, tile_size);
    let (x, y) = mercator_normalized(position);
    Pixels::new(x * total_pixels, y * total_pixels)
}

/// Transforms world bitmap pixels back into a geographical position.
pub fn unproject(pixels: Pixels, zoom: f64, tile_size: u32) -> Position {
    let number_of_pixels = total_pixels(zoom, tile_size);

    let lon = pixels.x();
    let lon = lon / number_of_pixels;
    let lon = (lon * 2. - 1.) * PI;
    let lon = lon.to_degrees();

    let lat = pixels.y();
    let lat = lat / number_of_pixels;
    let lat = (-lat * 2. + 1.) * PI;
    let lat = lat.sinh().atan().to_degrees();

    lon_lat(lon, lat)
}
