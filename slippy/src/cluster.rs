//! Marker clustering: partition projected markers into visual clusters by proximity.
//!
//! Clustering runs every frame on markers projected to the current (possibly animated) zoom,
//! since pixel distances change with the projection scale.

use crate::marker::{Marker, MarkerVisual};
use crate::position::{Pixels, PixelsExt as _};
use crate::texture::Color;

/// Default eagerness of clustering. Higher values mean markers must be closer to merge.
pub const DEFAULT_CLUSTER_THRESHOLD: f64 = 1.8;

/// What a frame actually draws for markers: either a single marker or an aggregate glyph.
/// Recomputed every frame, never persisted.
#[derive(Debug, Clone)]
pub struct RenderElement {
    /// Screen position of the element's center.
    pub pos: Pixels,

    /// Visual diameter in pixels, already adapted to the current zoom.
    pub size: f64,

    /// Draw order; higher paints on top.
    pub priority: i32,

    pub clickable: bool,

    pub visual: ElementVisual,

    /// The markers this element stands for; a single one unless this is a cluster.
    pub markers: Vec<Marker>,

    pub tooltip: Option<String>,

    pub filter: Option<String>,
}

impl RenderElement {
    pub fn is_cluster(&self) -> bool {
        self.markers.len() > 1
    }

    pub fn count(&self) -> usize {
        self.markers.len()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ElementVisual {
    Icon(String),
    Circle(Color),
    /// Aggregate glyph with a member-count label.
    Cluster { color: Color },
}

/// Styling hook for aggregate cluster glyphs. Injected at map construction.
pub trait ClusterStyler {
    /// Adjust the freshly built cluster element; `element.markers` is already populated.
    fn style(&self, element: &mut RenderElement);
}

/// Default styling: priority equals the member count, diameter grows with its logarithm.
#[derive(Debug, Clone)]
pub struct DefaultClusterStyler {
    pub color: Color,
}

impl Default for DefaultClusterStyler {
    fn default() -> Self {
        Self {
            color: Color::rgba(30, 100, 180, 230),
        }
    }
}

impl ClusterStyler for DefaultClusterStyler {
    fn style(&self, element: &mut RenderElement) {
        let count = element.count();
        element.priority = count as i32;
        element.size = 16.0 + 14.0 * (count as f64).ln();
        element.visual = ElementVisual::Cluster { color: self.color };
    }
}

/// A marker together with its projected screen position.
#[derive(Debug, Clone)]
pub struct ProjectedMarker {
    pub pos: Pixels,
    pub marker: Marker,
}

/// Partition `items` into render elements.
///
/// Sweeps the markers in x order, growing each cluster around a running centroid; two markers
/// merge when they share a cluster key and the centroid distance is below
/// `min(size_a, size_b) / threshold`. Markers without a key always stay alone. Deterministic
/// for identical input.
pub fn cluster(
    mut items: Vec<ProjectedMarker>,
    threshold: f64,
    size_factor: f64,
    styler: &dyn ClusterStyler,
) -> Vec<RenderElement> {
    items.sort_by(|a, b| {
        a.pos
            .x()
            .total_cmp(&b.pos.x())
            .then(a.pos.y().total_cmp(&b.pos.y()))
    });

    // Window for the forward scan. An optimization cutoff, not a correctness bound.
    let window = 2.0
        * items
            .iter()
            .map(|item| item.marker.size * size_factor)
            .fold(0.0, f64::max);

    let mut used = vec![false; items.len()];
    let mut elements = Vec::with_capacity(items.len());

    for i in 0..items.len() {
        if used[i] {
            continue;
        }
        used[i] = true;

        let mut members = vec![i];
        let mut centroid = items[i].pos;
        let seed_size = items[i].marker.size * size_factor;

        if let Some(key) = &items[i].marker.cluster {
            for j in (i + 1)..items.len() {
                if items[j].pos.x() - items[i].pos.x() > window {
                    break;
                }
                if used[j] || items[j].marker.cluster.as_ref() != Some(key) {
                    continue;
                }

                let candidate_size = items[j].marker.size * size_factor;
                let limit = seed_size.min(candidate_size) / threshold;
                if centroid.distance_to(items[j].pos) < limit {
                    used[j] = true;
                    members.push(j);
                    // Running mean of member positions.
                    centroid = centroid + (items[j].pos - centroid) / members.len() as f64;
                }
            }
        }

        elements.push(build_element(&items, &members, centroid, size_factor, styler));
    }

    elements
}

fn build_element(
    items: &[ProjectedMarker],
    members: &[usize],
    centroid: Pixels,
    size_factor: f64,
    styler: &dyn ClusterStyler,
) -> RenderElement {
    if let [single] = members {
        let item = &items[*single];
        let marker = item.marker.clone();
        return RenderElement {
            pos: item.pos,
            size: marker.size * size_factor,
            priority: marker.priority,
            clickable: marker.clickable,
            visual: match &marker.visual {
                MarkerVisual::Icon(url) => ElementVisual::Icon(url.clone()),
                MarkerVisual::Circle(color) => ElementVisual::Circle(*color),
            },
            tooltip: marker.tooltip.clone(),
            filter: marker.filter.clone(),
            markers: vec![marker],
        };
    }

    let markers: Vec<Marker> = members
        .iter()
        .map(|index| items[*index].marker.clone())
        .collect();

    let mut element = RenderElement {
        pos: centroid,
        size: 0.,
        priority: 0,
        clickable: markers.iter().any(|marker| marker.clickable),
        visual: ElementVisual::Cluster {
            color: Color::BLACK,
        },
        tooltip: None,
        filter: None,
        markers,
    };
    styler.style(&mut element);
    // The styler works in reference-zoom pixels; adapt afterwards like plain markers.
    element.size *= size_factor;
    element
}
