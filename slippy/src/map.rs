//! The map engine instance: ties the viewport, marker clustering, the asset loader and the
//! tile pyramid renderer together. One [`Map`] per view, no globals.

use std::sync::Arc;

use crate::{
    cluster::{
        ClusterStyler, DEFAULT_CLUSTER_THRESHOLD, DefaultClusterStyler, ElementVisual,
        ProjectedMarker, RenderElement, cluster,
    },
    input::{Cursor, Pointer},
    io::{Fetch, Repaint},
    loader::{AssetLoader, Stats},
    marker::{Marker, MarkerGroups},
    mercator::{TileId, project, total_tiles, unproject},
    position::{Pixels, Position},
    sources::{Attribution, TileSource},
    texture::{Canvas, Color, Rect},
    viewport::{InvalidZoom, Viewport, size_adaptation},
};

/// How many zoom levels below the current one are searched for cached finer tiles when the
/// exact tile is missing. Purely cache lookups, never fetches.
const DESCENDANT_FALLBACK_LEVELS: u8 = 4;

const TOOLTIP_TEXT_SIZE: f64 = 14.;
const TOOLTIP_PADDING: f64 = 6.;

/// Construction-time settings of a [`Map`].
#[derive(Debug, Clone)]
pub struct MapConfig {
    pub min_zoom: u8,
    pub max_zoom: u8,

    /// Eagerness of marker clustering; higher means markers must be closer to merge.
    pub cluster_threshold: f64,

    pub tile_cache_capacity: usize,
    pub icon_cache_capacity: usize,

    /// Initial canvas size in pixels; hosts update it via [`Map::set_canvas_size`].
    pub canvas_size: Pixels,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            min_zoom: 0,
            max_zoom: 19,
            cluster_threshold: DEFAULT_CLUSTER_THRESHOLD,
            tile_cache_capacity: 256,
            icon_cache_capacity: 64,
            canvas_size: Pixels::new(800., 600.),
        }
    }
}

/// A single interactive map view.
///
/// Hosts drive it with [`Map::update`] once per tick followed by [`Map::draw`], and keep
/// scheduling frames while [`Map::needs_frame`] holds.
pub struct Map<S: TileSource> {
    source: S,
    viewport: Viewport,
    groups: MarkerGroups,
    loader: AssetLoader,
    styler: Box<dyn ClusterStyler>,
    cluster_threshold: f64,
    on_click: Option<Box<dyn FnMut(&[Marker], bool)>>,

    /// Render elements of the current frame, sorted in draw order.
    elements: Vec<RenderElement>,

    hovered: Option<RenderElement>,
    pointer_pos: Pixels,
}

impl<S: TileSource> Map<S> {
    pub fn new(
        config: MapConfig,
        source: S,
        fetch: impl Fetch + Send + Sync + 'static,
        repaint: Option<Arc<dyn Repaint>>,
    ) -> Result<Self, InvalidZoom> {
        let max_zoom = config.max_zoom.min(source.max_zoom());
        let viewport = Viewport::new(
            config.min_zoom,
            max_zoom,
            source.tile_size(),
            config.canvas_size,
        )?;
        let loader = AssetLoader::new(
            fetch,
            repaint,
            config.tile_cache_capacity,
            config.icon_cache_capacity,
        );

        Ok(Self {
            source,
            viewport,
            groups: MarkerGroups::default(),
            loader,
            styler: Box::new(DefaultClusterStyler::default()),
            cluster_threshold: config.cluster_threshold,
            on_click: None,
            elements: Vec::new(),
            hovered: None,
            pointer_pos: Pixels::new(0., 0.),
        })
    }

    /// Replace the named marker group wholesale.
    pub fn set_markers(&mut self, key: impl Into<String>, markers: Vec<Marker>) {
        self.groups.set(key, markers);
    }

    pub fn clear_markers(&mut self, key: &str) {
        self.groups.clear(key);
    }

    pub fn set_cluster_styler(&mut self, styler: impl ClusterStyler + 'static) {
        self.styler = Box::new(styler);
    }

    /// Called with the constituent markers of a clicked element and whether that element is
    /// clickable. Tooltip-only elements are reported too, with `false`.
    pub fn on_click(&mut self, callback: impl FnMut(&[Marker], bool) + 'static) {
        self.on_click = Some(Box::new(callback));
    }

    pub fn move_to(&mut self, position: Position, zoom: Option<u8>) {
        let zoom_before = self.viewport.zoom();
        self.viewport.move_to(position, zoom);
        if self.viewport.zoom() != zoom_before {
            self.loader.invalidate();
        }
    }

    /// Zoom by `delta` steps about `anchor` (canvas center when `None`). Out-of-range targets
    /// are a no-op.
    pub fn zoom_by(&mut self, delta: i32, anchor: Option<Pixels>) -> bool {
        if self.viewport.zoom_by(delta, anchor) {
            self.loader.invalidate();
            true
        } else {
            false
        }
    }

    /// Center on the bounding box of `positions` at the finest fitting zoom. With `minimize`,
    /// the move is only accepted when it coarsens the zoom, or when the fitted view splits
    /// the markers into more clusters than the current one shows.
    pub fn reveal(&mut self, positions: &[Position], minimize: bool) -> bool {
        let Some((zoom, center)) = self.viewport.fit_zoom(positions) else {
            return false;
        };

        if minimize
            && zoom >= self.viewport.zoom()
            && self.cluster_count_at(zoom) <= self.cluster_count()
        {
            return false;
        }

        if self.viewport.apply_fit(zoom, center) {
            self.loader.invalidate();
        }
        self.rebuild_elements();
        true
    }

    /// [`Map::reveal`] over every marker currently set.
    pub fn reveal_markers(&mut self, minimize: bool) -> bool {
        let positions: Vec<Position> = self.groups.iter().map(|marker| marker.position).collect();
        self.reveal(&positions, minimize)
    }

    pub fn set_canvas_size(&mut self, size: Pixels) {
        self.viewport.set_canvas_size(size);
    }

    pub fn zoom(&self) -> u8 {
        self.viewport.zoom()
    }

    pub fn center(&self) -> Position {
        self.viewport.center_position()
    }

    pub fn attribution(&self) -> Attribution {
        self.source.attribution()
    }

    pub fn stats(&self) -> Stats {
        self.loader.stats()
    }

    /// Whether the host should keep scheduling frames: an animation is running or assets the
    /// last frame wanted are still missing.
    pub fn needs_frame(&self) -> bool {
        self.viewport.animating() || self.loader.missing_assets() > 0
    }

    /// Geographical position to canvas pixels under the current (possibly animated) view.
    pub fn coord_to_screen(&self, position: Position) -> Pixels {
        let world = project(
            position,
            self.viewport.zoom() as f64,
            self.source.tile_size(),
        );
        self.viewport.world_to_screen(world)
    }

    /// Canvas pixels back to a geographical position.
    pub fn screen_to_coord(&self, screen: Pixels) -> Position {
        unproject(
            self.viewport.screen_to_world(screen),
            self.viewport.zoom() as f64,
            self.source.tile_size(),
        )
    }

    /// Advance one tick: install fetched assets, run the pointer state machine, dispatch
    /// clicks and re-cluster markers. Returns the cursor the host should display.
    pub fn update(&mut self, pointer: &Pointer) -> Cursor {
        self.loader.begin_frame();
        self.loader.drain_arrivals();
        self.pointer_pos = pointer.pos();

        // Hit test against the elements of the previous frame; one tick of lag is invisible.
        self.hovered = self.hit_test(pointer.pos());
        let over_target = self.hovered.is_some();

        let dragging_before = self.viewport.dragging();
        let zoom_before = self.viewport.zoom();
        let cursor = self.viewport.update(pointer, over_target);

        if pointer.released() && !dragging_before {
            if let Some(element) = self.hovered.clone() {
                if let Some(on_click) = &mut self.on_click {
                    on_click(&element.markers, element.clickable);
                }
            }
        }

        // A zoom change moves to a different pixel space; everything in flight is stale.
        if self.viewport.zoom() != zoom_before {
            self.loader.invalidate();
        }

        self.rebuild_elements();
        cursor
    }

    /// Draw one frame: tile pyramid, render elements, tooltip.
    pub fn draw(&mut self, canvas: &mut dyn Canvas) {
        self.draw_tiles(canvas);
        self.draw_elements(canvas);
        self.draw_tooltip(canvas);
    }

    /// Re-cluster all markers in screen space and sort them into draw order.
    fn rebuild_elements(&mut self) {
        let zoom = self.viewport.zoom();
        let tile_size = self.source.tile_size();
        let factor = size_adaptation(zoom);

        let items: Vec<ProjectedMarker> = self
            .groups
            .iter()
            .map(|marker| ProjectedMarker {
                pos: self
                    .viewport
                    .world_to_screen(project(marker.position, zoom as f64, tile_size)),
                marker: marker.clone(),
            })
            .collect();

        let mut elements = cluster(items, self.cluster_threshold, factor, self.styler.as_ref());
        elements.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then_with(|| b.size.total_cmp(&a.size))
        });
        self.elements = elements;
    }

    /// How many of the current render elements are clusters.
    fn cluster_count(&self) -> usize {
        self.elements
            .iter()
            .filter(|element| element.is_cluster())
            .count()
    }

    /// How many clusters the markers would form at `zoom`. Clustering depends only on
    /// relative screen distances, so the view offset does not matter here.
    fn cluster_count_at(&self, zoom: u8) -> usize {
        let tile_size = self.source.tile_size();
        let items: Vec<ProjectedMarker> = self
            .groups
            .iter()
            .map(|marker| ProjectedMarker {
                pos: project(marker.position, zoom as f64, tile_size),
                marker: marker.clone(),
            })
            .collect();

        cluster(
            items,
            self.cluster_threshold,
            size_adaptation(zoom),
            self.styler.as_ref(),
        )
        .iter()
        .filter(|element| element.is_cluster())
        .count()
    }

    /// Topmost element under the pointer that can react to it.
    fn hit_test(&self, pointer: Pixels) -> Option<RenderElement> {
        self.elements
            .iter()
            .rev()
            .find(|element| {
                (element.clickable || element.tooltip.is_some()) && {
                    let offset = element.pos - pointer;
                    let radius = element.size / 2.;
                    offset.x() * offset.x() + offset.y() * offset.y() <= radius * radius
                }
            })
            .cloned()
    }

    fn draw_tiles(&mut self, canvas: &mut dyn Canvas) {
        let zoom = self.viewport.zoom();
        let tile_size = self.source.tile_size() as f64;

        let margin = 1;
        // A wider ring during the zoom animation, since the scaled view reaches beyond the
        // idle grid. Those extra tiles are drawn from cache only, never fetched.
        let extra = if self.viewport.animating() { 1 } else { 0 };

        let top_left = self.viewport.screen_to_world(Pixels::new(0., 0.));
        let bottom_right = self.viewport.screen_to_world(self.viewport.canvas_size());

        let last = total_tiles(zoom) as i64 - 1;
        let x0 = ((top_left.x() / tile_size).floor() as i64 - margin).clamp(0, last);
        let x1 = ((bottom_right.x() / tile_size).floor() as i64 + margin).clamp(0, last);
        let y0 = ((top_left.y() / tile_size).floor() as i64 - margin).clamp(0, last);
        let y1 = ((bottom_right.y() / tile_size).floor() as i64 + margin).clamp(0, last);

        for y in (y0 - extra).max(0)..=(y1 + extra).min(last) {
            for x in (x0 - extra).max(0)..=(x1 + extra).min(last) {
                let fetch = (x0..=x1).contains(&x) && (y0..=y1).contains(&y);
                self.draw_tile(
                    canvas,
                    TileId {
                        x: x as u32,
                        y: y as u32,
                        zoom,
                    },
                    fetch,
                );
            }
        }
    }

    /// Draw a single grid slot: the exact tile, else the nearest cached ancestor scaled up,
    /// overlaid with any cached finer tiles. At most the exact tile is ever fetched, and only
    /// with `fetch` set.
    fn draw_tile(&mut self, canvas: &mut dyn Canvas, tile_id: TileId, fetch: bool) {
        let dst = self.tile_screen_rect(tile_id);

        if let Some(texture) = self.loader.tile(tile_id, &self.source, fetch) {
            canvas.blit(&texture, dst, Rect::unit(), None);
            return;
        }

        // Nearest cached ancestor, its matching quadrant scaled up.
        for zoom in (0..tile_id.zoom).rev() {
            let (ancestor, uv) = interpolate_from_lower_zoom(tile_id, zoom);
            if let Some(texture) = self.loader.tile(ancestor, &self.source, false) {
                canvas.blit(&texture, dst, uv, None);
                break;
            }
        }

        self.draw_descendants(canvas, tile_id, 1);
    }

    fn draw_descendants(&mut self, canvas: &mut dyn Canvas, tile_id: TileId, depth: u8) {
        if depth > DESCENDANT_FALLBACK_LEVELS || tile_id.zoom >= self.source.max_zoom() {
            return;
        }

        for child in tile_id.children() {
            if !child.valid() {
                continue;
            }
            if let Some(texture) = self.loader.tile(child, &self.source, false) {
                let dst = self.tile_screen_rect(child);
                canvas.blit(&texture, dst, Rect::unit(), None);
            } else {
                self.draw_descendants(canvas, child, depth + 1);
            }
        }
    }

    /// Screen rectangle of a tile of any zoom level, under the animated transform.
    fn tile_screen_rect(&self, tile_id: TileId) -> Rect {
        let tile_size = self.source.tile_size() as f64;

        // Tiles from fallback levels live in a pixel space differing by powers of two.
        let level_scale = 2f64.powi(self.viewport.zoom() as i32 - tile_id.zoom as i32);

        let min = tile_id.project(tile_size) * level_scale;
        let max = min + Pixels::new(tile_size, tile_size) * level_scale;
        Rect::from_min_max(
            self.viewport.world_to_screen(min),
            self.viewport.world_to_screen(max),
        )
    }

    fn draw_elements(&mut self, canvas: &mut dyn Canvas) {
        for element in &self.elements {
            match &element.visual {
                ElementVisual::Circle(color) => {
                    canvas.fill_circle(element.pos, element.size / 2., *color);
                }
                ElementVisual::Icon(url) => {
                    if let Some(texture) = self.loader.icon(url, true) {
                        let dst = Rect::from_center_size(
                            element.pos,
                            Pixels::new(element.size, element.size),
                        );
                        canvas.blit(&texture, dst, Rect::unit(), element.filter.as_deref());
                    } else {
                        // Subdued stand-in until the icon arrives.
                        canvas.fill_circle(
                            element.pos,
                            element.size / 2.,
                            Color::rgba(128, 128, 128, 128),
                        );
                    }
                }
                ElementVisual::Cluster { color } => {
                    canvas.fill_circle(element.pos, element.size / 2., *color);

                    let label = element.count().to_string();
                    let label_size = element.size * 0.45;
                    let width = canvas.text_width(&label, label_size);
                    canvas.text(
                        element.pos - Pixels::new(width / 2., 0.),
                        &label,
                        label_size,
                        Color::WHITE,
                    );
                }
            }
        }
    }

    fn draw_tooltip(&self, canvas: &mut dyn Canvas) {
        let Some(element) = &self.hovered else {
            return;
        };
        let Some(text) = &element.tooltip else {
            return;
        };

        let width = canvas.text_width(text, TOOLTIP_TEXT_SIZE) + TOOLTIP_PADDING * 2.;
        let height = TOOLTIP_TEXT_SIZE + TOOLTIP_PADDING * 2.;
        let canvas_size = self.viewport.canvas_size();

        // Beside the pointer, pushed back inside the canvas when it would stick out.
        let min = Pixels::new(
            (self.pointer_pos.x() + 12.).clamp(0., (canvas_size.x() - width).max(0.)),
            (self.pointer_pos.y() - height / 2.).clamp(0., (canvas_size.y() - height).max(0.)),
        );
        let rect = Rect::from_min_size(min, Pixels::new(width, height));

        canvas.fill_rect(rect, Color::rgba(0, 0, 0, 180));
        canvas.text(
            Pixels::new(rect.min.x() + TOOLTIP_PADDING, rect.center().y()),
            text,
            TOOLTIP_TEXT_SIZE,
            Color::WHITE,
        );
    }
}

/// For a missing tile, find the tile id at `available_zoom` covering it and the uv
/// sub-rectangle of that coarser tile which matches the missing one.
fn interpolate_from_lower_zoom(tile_id: TileId, available_zoom: u8) -> (TileId, Rect) {
    let dzoom = 2u32.pow((tile_id.zoom - available_zoom) as u32);

    let x = tile_id.x / dzoom;
    let y = tile_id.y / dzoom;

    let size = 1. / dzoom as f64;
    let min = Pixels::new(
        (tile_id.x % dzoom) as f64 * size,
        (tile_id.y % dzoom) as f64 * size,
    );

    (
        TileId {
            x,
            y,
            zoom: available_zoom,
        },
        Rect::from_min_size(min, Pixels::new(size, size)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lat_lon;
    use crate::sources::OpenStreetMap;
    use crate::texture::{Texture, png_bytes};
    use bytes::Bytes;
    use std::sync::Mutex;
    use std::time::{Duration, Instant};

    #[derive(Debug, thiserror::Error)]
    #[error("mock fetch failed")]
    struct MockError;

    /// Records requested URLs and never completes, so cache state stays put.
    struct RecordingFetch {
        urls: Arc<Mutex<Vec<String>>>,
        max_concurrency: usize,
    }

    impl Fetch for RecordingFetch {
        type Error = MockError;

        async fn fetch(&self, url: &str) -> Result<Bytes, MockError> {
            self.urls.lock().unwrap().push(url.to_string());
            futures::future::pending().await
        }

        fn max_concurrency(&self) -> usize {
            self.max_concurrency
        }
    }

    #[derive(Default)]
    struct RecordingCanvas {
        blits: Vec<(Rect, Rect, Option<String>)>,
        rects: Vec<(Rect, Color)>,
        circles: Vec<(Pixels, f64, Color)>,
        texts: Vec<String>,
    }

    impl Canvas for RecordingCanvas {
        fn blit(&mut self, _texture: &Texture, dst: Rect, uv: Rect, filter: Option<&str>) {
            self.blits.push((dst, uv, filter.map(str::to_string)));
        }

        fn fill_rect(&mut self, rect: Rect, color: Color) {
            self.rects.push((rect, color));
        }

        fn fill_circle(&mut self, center: Pixels, radius: f64, color: Color) {
            self.circles.push((center, radius, color));
        }

        fn text(&mut self, _pos: Pixels, text: &str, _size: f64, _color: Color) {
            self.texts.push(text.to_string());
        }

        fn text_width(&self, text: &str, size: f64) -> f64 {
            text.len() as f64 * size * 0.6
        }
    }

    fn test_map() -> (Map<OpenStreetMap>, Arc<Mutex<Vec<String>>>) {
        test_map_with_config(MapConfig::default())
    }

    fn test_map_with_config(config: MapConfig) -> (Map<OpenStreetMap>, Arc<Mutex<Vec<String>>>) {
        let _ = env_logger::try_init();
        let urls = Arc::new(Mutex::new(Vec::new()));
        let fetch = RecordingFetch {
            urls: urls.clone(),
            max_concurrency: 8,
        };
        let map = Map::new(config, OpenStreetMap, fetch, None).unwrap();
        (map, urls)
    }

    fn texture() -> Arc<Texture> {
        Arc::new(Texture::from_bytes(&png_bytes(8, 8)).unwrap())
    }

    fn wait_until(mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "condition never became true");
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    #[test]
    fn missing_tile_uses_cached_ancestor_quadrant_and_requests_only_itself() {
        let (mut map, urls) = test_map();
        map.move_to(lat_lon(0., 0.), Some(5));

        let tile = TileId {
            x: 17,
            y: 11,
            zoom: 5,
        };
        let parent = TileId {
            x: 8,
            y: 5,
            zoom: 4,
        };
        map.loader.insert_tile(parent, texture());

        let mut canvas = RecordingCanvas::default();
        map.draw_tile(&mut canvas, tile, true);

        // One blit: the bottom-right quadrant of the parent, scaled up.
        assert_eq!(canvas.blits.len(), 1);
        let (_, uv, _) = &canvas.blits[0];
        assert_eq!(
            *uv,
            Rect::from_min_max(Pixels::new(0.5, 0.5), Pixels::new(1., 1.))
        );

        // The missing tile itself was requested, the ancestor was served from cache, and the
        // ancestor walk stopped there.
        assert_eq!(map.loader.tile_state(&tile), Some(false));
        assert_eq!(map.loader.tile_state(&parent), Some(true));
        assert_eq!(map.loader.tile_state(&parent.parent().unwrap()), None);

        // The IO thread saw exactly that one request.
        wait_until(|| urls.lock().unwrap().len() == 1);
        std::thread::sleep(Duration::from_millis(50));
        let urls = urls.lock().unwrap();
        assert_eq!(*urls, vec![OpenStreetMap.tile_url(tile)]);
    }

    #[test]
    fn cached_descendants_are_drawn_over_the_missing_tile() {
        let (mut map, _) = test_map();
        map.move_to(lat_lon(0., 0.), Some(5));

        let tile = TileId {
            x: 17,
            y: 11,
            zoom: 5,
        };
        let child = tile.children()[2];
        map.loader.insert_tile(child, texture());

        let mut canvas = RecordingCanvas::default();
        map.draw_tile(&mut canvas, tile, true);

        // No ancestor cached, so the only blit is the child at a quarter of the slot.
        assert_eq!(canvas.blits.len(), 1);
        let (dst, uv, _) = &canvas.blits[0];
        assert_eq!(*uv, Rect::unit());
        approx::assert_relative_eq!(dst.width(), 128.);
    }

    #[test]
    fn anchored_zoom_recenters_exactly() {
        let mut viewport = Viewport::new(0, 19, 256, Pixels::new(800., 600.)).unwrap();
        viewport.move_to(unproject(Pixels::new(1000., 1000.), 10., 256), Some(10));
        approx::assert_relative_eq!(viewport.pos().x(), 1000., epsilon = 0.01);
        approx::assert_relative_eq!(viewport.pos().y(), 1000., epsilon = 0.01);

        // Anchor at the canvas center: position doubles into the finer pixel space.
        assert!(viewport.zoom_by(1, Some(Pixels::new(400., 300.))));
        approx::assert_relative_eq!(viewport.pos().x(), 2000., epsilon = 0.02);
        approx::assert_relative_eq!(viewport.pos().y(), 2000., epsilon = 0.02);
    }

    #[test]
    fn clicking_a_marker_dispatches_it() {
        let (mut map, _) = test_map();
        map.move_to(lat_lon(0., 0.), Some(10));
        map.set_markers(
            "poi",
            vec![Marker::circle(lat_lon(0., 0.), 24., Color::BLACK).clickable()],
        );

        let clicks: Arc<Mutex<Vec<(Vec<Marker>, bool)>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = clicks.clone();
        map.on_click(move |markers, clickable| {
            sink.lock().unwrap().push((markers.to_vec(), clickable));
        });

        // The marker sits at the canvas center after move_to.
        let mut pointer = Pointer::new(400, 300);
        map.update(&pointer);

        pointer.press();
        let cursor = map.update(&pointer);
        assert_eq!(cursor, Cursor::Pointer);

        pointer.decay();
        pointer.release();
        map.update(&pointer);

        let clicks = clicks.lock().unwrap();
        assert_eq!(clicks.len(), 1);
        assert_eq!(clicks[0].0.len(), 1);
        assert!(clicks[0].1);
    }

    #[test]
    fn clicking_a_tooltip_only_marker_reports_it_as_not_clickable() {
        let (mut map, _) = test_map();
        map.move_to(lat_lon(0., 0.), Some(10));
        map.set_markers(
            "poi",
            vec![Marker::circle(lat_lon(0., 0.), 24., Color::BLACK).with_tooltip("label")],
        );

        let clicks: Arc<Mutex<Vec<(Vec<Marker>, bool)>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = clicks.clone();
        map.on_click(move |markers, clickable| {
            sink.lock().unwrap().push((markers.to_vec(), clickable));
        });

        let mut pointer = Pointer::new(400, 300);
        map.update(&pointer);
        pointer.press();
        map.update(&pointer);
        pointer.decay();
        pointer.release();
        map.update(&pointer);

        let clicks = clicks.lock().unwrap();
        assert_eq!(clicks.len(), 1);
        assert!(!clicks[0].1);
    }

    #[test]
    fn clicking_a_cluster_dispatches_all_constituents() {
        let (mut map, _) = test_map();
        map.move_to(lat_lon(0., 0.), Some(10));
        map.set_markers(
            "poi",
            vec![
                Marker::circle(lat_lon(0., 0.), 24., Color::BLACK)
                    .with_cluster("poi")
                    .clickable(),
                Marker::circle(lat_lon(0., 0.), 24., Color::BLACK)
                    .with_cluster("poi")
                    .clickable(),
            ],
        );

        let clicks: Arc<Mutex<Vec<(Vec<Marker>, bool)>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = clicks.clone();
        map.on_click(move |markers, clickable| {
            sink.lock().unwrap().push((markers.to_vec(), clickable));
        });

        let mut pointer = Pointer::new(400, 300);
        map.update(&pointer);
        pointer.press();
        map.update(&pointer);
        pointer.decay();
        pointer.release();
        map.update(&pointer);

        let clicks = clicks.lock().unwrap();
        assert_eq!(clicks.len(), 1);
        assert_eq!(clicks[0].0.len(), 2);
        assert!(clicks[0].1);
    }

    #[test]
    fn dragging_does_not_click() {
        let (mut map, _) = test_map();
        map.move_to(lat_lon(0., 0.), Some(10));

        let clicks = Arc::new(Mutex::new(0usize));
        let sink = clicks.clone();
        map.on_click(move |_, _| *sink.lock().unwrap() += 1);

        // Press on empty map, drag, release.
        let mut pointer = Pointer::new(100, 100);
        map.update(&pointer);
        pointer.press();
        map.update(&pointer);
        pointer.decay();
        pointer.x = 150;
        map.update(&pointer);
        pointer.decay();
        pointer.release();
        map.update(&pointer);

        assert_eq!(*clicks.lock().unwrap(), 0);
    }

    #[test]
    fn zoom_change_cancels_pending_tile_fetches() {
        let (mut map, _) = test_map();
        map.move_to(lat_lon(0., 0.), Some(5));

        let mut canvas = RecordingCanvas::default();
        map.update(&Pointer::default());
        map.draw(&mut canvas);
        assert!(map.loader.pending_tiles() > 0);

        assert!(map.zoom_by(1, None));
        assert_eq!(map.loader.pending_tiles(), 0);
    }

    #[test]
    fn icon_markers_request_their_texture_and_draw_a_stand_in() {
        let (mut map, _) = test_map();
        map.move_to(lat_lon(0., 0.), Some(10));
        map.set_markers(
            "poi",
            vec![Marker::icon(
                lat_lon(0., 0.),
                32.,
                "http://localhost/pin.png",
            )],
        );

        let mut canvas = RecordingCanvas::default();
        map.update(&Pointer::default());
        map.draw(&mut canvas);

        assert!(map.loader.icon_pending("http://localhost/pin.png"));
        assert!(
            canvas
                .circles
                .iter()
                .any(|(pos, _, _)| *pos == Pixels::new(400., 300.))
        );
    }

    #[test]
    fn elements_draw_in_priority_order() {
        let (mut map, _) = test_map();
        map.move_to(lat_lon(0., 0.), Some(10));
        map.set_markers(
            "poi",
            vec![
                Marker::circle(lat_lon(0., 0.1), 16., Color::WHITE).with_priority(5),
                Marker::circle(lat_lon(0., -0.1), 16., Color::BLACK).with_priority(1),
            ],
        );

        let mut canvas = RecordingCanvas::default();
        map.update(&Pointer::default());
        map.draw(&mut canvas);

        // Lower priority paints first, higher ends up on top.
        assert_eq!(canvas.circles.len(), 2);
        assert_eq!(canvas.circles[0].2, Color::BLACK);
        assert_eq!(canvas.circles[1].2, Color::WHITE);
    }

    #[test]
    fn tooltip_stays_inside_the_canvas() {
        let (mut map, _) = test_map();
        map.move_to(lat_lon(0., 0.), Some(10));

        // At the right edge, where a naive layout would stick out.
        let position = map.screen_to_coord(Pixels::new(795., 300.));
        map.set_markers(
            "poi",
            vec![Marker::circle(position, 24., Color::BLACK).with_tooltip("A rather long label")],
        );

        let pointer = Pointer::new(795, 300);
        map.update(&pointer);
        map.update(&pointer);

        let mut canvas = RecordingCanvas::default();
        map.draw(&mut canvas);

        assert_eq!(canvas.rects.len(), 1);
        let (rect, _) = canvas.rects[0];
        assert!(rect.max.x() <= 800.5);
        assert!(rect.min.x() >= 0.);
        assert!(canvas.texts.contains(&"A rather long label".to_string()));
    }

    #[test]
    fn marker_filter_is_passed_to_the_blit() {
        let (mut map, _) = test_map();
        map.move_to(lat_lon(0., 0.), Some(10));
        map.set_markers(
            "poi",
            vec![
                Marker::icon(lat_lon(0., 0.), 32., "http://localhost/pin.png")
                    .with_filter("hue-rotate(180deg)"),
            ],
        );
        map.loader
            .insert_icon("http://localhost/pin.png", texture());

        let mut canvas = RecordingCanvas::default();
        map.update(&Pointer::default());
        map.draw(&mut canvas);

        let icon_blit = canvas
            .blits
            .iter()
            .find(|(_, _, filter)| filter.is_some())
            .expect("icon blit not recorded");
        assert_eq!(icon_blit.2.as_deref(), Some("hue-rotate(180deg)"));
    }

    #[test]
    fn reveal_markers_fits_all_groups() {
        let (mut map, _) = test_map();
        map.move_to(lat_lon(0., 0.), Some(18));
        map.set_markers(
            "a",
            vec![Marker::circle(lat_lon(51.0, 16.9), 16., Color::BLACK)],
        );
        map.set_markers(
            "b",
            vec![Marker::circle(lat_lon(51.2, 17.1), 16., Color::BLACK)],
        );

        assert!(map.reveal_markers(false));
        assert!(map.zoom() < 18);

        let center = map.center();
        approx::assert_relative_eq!(center.x(), 17.0, epsilon = 0.05);
        approx::assert_relative_eq!(center.y(), 51.1, epsilon = 0.05);
    }

    #[test]
    fn minimizing_reveal_accepts_a_fit_that_splits_clusters() {
        let (mut map, _) = test_map();
        map.move_to(lat_lon(51.05, 16.95), Some(5));

        // Two tight pairs, all merged into one blob at zoom 5.
        map.set_markers(
            "poi",
            vec![
                Marker::circle(lat_lon(51.0, 16.9), 24., Color::BLACK).with_cluster("poi"),
                Marker::circle(lat_lon(51.001, 16.901), 24., Color::BLACK).with_cluster("poi"),
                Marker::circle(lat_lon(51.1, 17.0), 24., Color::BLACK).with_cluster("poi"),
                Marker::circle(lat_lon(51.101, 17.001), 24., Color::BLACK).with_cluster("poi"),
            ],
        );
        map.update(&Pointer::default());
        assert_eq!(map.cluster_count(), 1);

        // The fitting zoom is finer, but it breaks the blob into the two pairs.
        assert!(map.reveal_markers(true));
        assert!(map.zoom() > 5);
        assert_eq!(map.cluster_count(), 2);
    }

    #[test]
    fn minimizing_reveal_rejects_a_fit_without_cluster_gain() {
        let (mut map, _) = test_map();
        map.move_to(lat_lon(51.0, 16.9), Some(5));

        // One tight pair; the fitting zoom only dissolves it into singletons.
        map.set_markers(
            "poi",
            vec![
                Marker::circle(lat_lon(51.0, 16.9), 24., Color::BLACK).with_cluster("poi"),
                Marker::circle(lat_lon(51.001, 16.901), 24., Color::BLACK).with_cluster("poi"),
            ],
        );
        map.update(&Pointer::default());
        assert_eq!(map.cluster_count(), 1);

        assert!(!map.reveal_markers(true));
        assert_eq!(map.zoom(), 5);
    }

    #[test]
    fn zoom_animation_margin_is_drawn_from_cache_only() {
        let _ = env_logger::try_init();
        let urls = Arc::new(Mutex::new(Vec::new()));
        let fetch = RecordingFetch {
            urls,
            max_concurrency: 64,
        };
        let config = MapConfig {
            canvas_size: Pixels::new(10., 10.),
            ..MapConfig::default()
        };
        let mut map = Map::new(config, OpenStreetMap, fetch, None).unwrap();

        map.move_to(lat_lon(0., 0.), Some(5));
        assert!(map.zoom_by(1, None));

        let mut canvas = RecordingCanvas::default();
        map.draw(&mut canvas);

        // With the animation running, the grid spans tiles 29..=34 on both axes, but only the
        // regular 30..=33 square may fetch.
        for tile in [
            TileId {
                x: 30,
                y: 30,
                zoom: 6,
            },
            TileId {
                x: 33,
                y: 33,
                zoom: 6,
            },
        ] {
            assert_eq!(map.loader.tile_state(&tile), Some(false));
        }
        for tile in [
            TileId {
                x: 29,
                y: 29,
                zoom: 6,
            },
            TileId {
                x: 34,
                y: 31,
                zoom: 6,
            },
        ] {
            assert_eq!(map.loader.tile_state(&tile), None);
        }
        assert_eq!(map.loader.pending_tiles(), 16);
    }
}
