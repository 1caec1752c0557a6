//! Tile sources. Make sure you follow the terms of usage of the particular source.

use crate::mercator::TileId;

#[derive(Debug, Clone)]
pub struct Attribution {
    pub text: &'static str,
    pub url: &'static str,
}

/// Remote tile server definition, source of the images stitched together into the map.
pub trait TileSource {
    fn tile_url(&self, tile_id: TileId) -> String;

    fn attribution(&self) -> Attribution;

    /// Size of each tile, in pixels.
    fn tile_size(&self) -> u32 {
        256
    }

    fn max_zoom(&self) -> u8 {
        19
    }
}

/// Tile source defined by a URL template with `{z}`, `{x}`, `{y}`, `{s}` (subdomain), `{r}`
/// (retina suffix) and `{ext}` (file extension) placeholders.
#[derive(Debug, Clone)]
pub struct UrlTemplate {
    template: String,
    tile_size: u32,
    max_zoom: u8,
}

// Placeholders beyond z/x/y are fixed; rotating subdomains buy nothing with HTTP/2.
const SUBDOMAIN: &str = "a";
const RETINA: &str = "";
const EXTENSION: &str = "png";

impl UrlTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            tile_size: 256,
            max_zoom: 19,
        }
    }

    pub fn with_tile_size(mut self, tile_size: u32) -> Self {
        self.tile_size = tile_size;
        self
    }

    pub fn with_max_zoom(mut self, max_zoom: u8) -> Self {
        self.max_zoom = max_zoom;
        self
    }
}

impl TileSource for UrlTemplate {
    fn tile_url(&self, tile_id: TileId) -> String {
        self.template
            .replace("{z}", &tile_id.zoom.to_string())
            .replace("{x}", &tile_id.x.to_string())
            .replace("{y}", &tile_id.y.to_string())
            .replace("{s}", SUBDOMAIN)
            .replace("{r}", RETINA)
            .replace("{ext}", EXTENSION)
    }

    fn attribution(&self) -> Attribution {
        Attribution { text: "", url: "" }
    }

    fn tile_size(&self) -> u32 {
        self.tile_size
    }

    fn max_zoom(&self) -> u8 {
        self.max_zoom
    }
}

/// <https://www.openstreetmap.org/about>
#[derive(Debug, Clone, Copy)]
pub struct OpenStreetMap;

impl TileSource for OpenStreetMap {
    fn tile_url(&self, tile_id: TileId) -> String {
        format!(
            "https://tile.openstreetmap.org/{}/{}/{}.png",
            tile_id.zoom, tile_id.x, tile_id.y
        )
    }

    fn attribution(&self) -> Attribution {
        Attribution {
            text: "OpenStreetMap contributors",
            url: "https://www.openstreetmap.org/copyright",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_substitutes_all_placeholders() {
        let source = UrlTemplate::new("https://{s}.tiles.example.org/{z}/{x}/{y}{r}.{ext}");
        let url = source.tile_url(TileId {
            x: 3,
            y: 5,
            zoom: 7,
        });
        assert_eq!(url, "https://a.tiles.example.org/7/3/5.png");
    }

    #[test]
    fn openstreetmap_urls() {
        let url = OpenStreetMap.tile_url(TileId {
            x: 1,
            y: 2,
            zoom: 3,
        });
        assert_eq!(url, "https://tile.openstreetmap.org/3/1/2.png");
    }
}
