//! Markers and marker groups.

use std::collections::BTreeMap;

use crate::position::Position;
use crate::texture::Color;

/// How a marker looks: either a raster icon fetched from a URL, or a plain filled circle.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
pub enum MarkerVisual {
    Icon(String),
    Circle(Color),
}

/// A point of interest on the map.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
pub struct Marker {
    /// Geographical position.
    pub position: Position,

    /// Visual diameter in pixels at the reference zoom; scaled down at low zoom levels.
    pub size: f64,

    pub visual: MarkerVisual,

    /// Clustering group key. Markers with different keys never merge; `None` means the marker
    /// is never clustered at all.
    pub cluster: Option<String>,

    /// Draw order; higher paints on top.
    pub priority: i32,

    pub clickable: bool,

    pub tooltip: Option<String>,

    /// CSS-style filter applied when blitting the icon, e.g. `hue-rotate(180deg)`.
    pub filter: Option<String>,
}

impl Marker {
    pub fn icon(position: Position, size: f64, url: impl Into<String>) -> Self {
        Self::new(position, size, MarkerVisual::Icon(url.into()))
    }

    pub fn circle(position: Position, size: f64, color: Color) -> Self {
        Self::new(position, size, MarkerVisual::Circle(color))
    }

    fn new(position: Position, size: f64, visual: MarkerVisual) -> Self {
        Self {
            position,
            size,
            visual,
            cluster: None,
            priority: 0,
            clickable: false,
            tooltip: None,
            filter: None,
        }
    }

    pub fn with_cluster(mut self, key: impl Into<String>) -> Self {
        self.cluster = Some(key.into());
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn clickable(mut self) -> Self {
        self.clickable = true;
        self
    }

    pub fn with_tooltip(mut self, tooltip: impl Into<String>) -> Self {
        self.tooltip = Some(tooltip.into());
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }
}

/// Named marker groups. Groups are replaced wholesale, never mutated in place, so a draw pass
/// can never observe a half-updated group.
#[derive(Debug, Default)]
pub struct MarkerGroups {
    groups: BTreeMap<String, Vec<Marker>>,
}

impl MarkerGroups {
    pub fn set(&mut self, key: impl Into<String>, markers: Vec<Marker>) {
        self.groups.insert(key.into(), markers);
    }

    pub fn clear(&mut self, key: &str) {
        self.groups.remove(key);
    }

    /// All markers across all groups, in a deterministic (group key, insertion) order.
    pub fn iter(&self) -> impl Iterator<Item = &Marker> {
        self.groups.values().flatten()
    }

    pub fn len(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.values().all(Vec::is_empty)
    }
}
