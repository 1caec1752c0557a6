//! The viewport state machine: pan position, zoom level, drag state and the animated zoom
//! transition.

use std::f64::consts::PI;

use crate::input::{Cursor, Pointer};
use crate::mercator::{project, total_pixels, unproject};
use crate::position::{Pixels, PixelsExt as _, Position};

/// Length of the smooth zoom transition, in ticks.
pub const ZOOM_ANIMATION_TICKS: u64 = 15;

/// One wheel notch zooms one step; further notches are ignored for this many ticks
/// (~200 ms at the nominal 60 fps tick rate).
pub const WHEEL_DEBOUNCE_TICKS: u64 = 12;

/// Fraction of the canvas a revealed bounding box may occupy.
const REVEAL_FIT: f64 = 0.9;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("invalid zoom level")]
pub struct InvalidZoom;

/// An in-flight smooth zoom transition. Replaced wholesale on each new zoom request; `from`
/// captures the previous animation's interpolated value so chained zooms stay continuous.
#[derive(Debug, Clone, PartialEq)]
pub struct ZoomAnimation {
    start_tick: u64,
    from: f64,
    to: f64,

    /// Canvas point that stays visually fixed during the transition.
    anchor: Pixels,
}

impl ZoomAnimation {
    /// The displayed, fractional zoom at `tick`, eased in and out with a cosine curve.
    fn value(&self, tick: u64) -> f64 {
        let t = tick.saturating_sub(self.start_tick).min(ZOOM_ANIMATION_TICKS) as f64
            / ZOOM_ANIMATION_TICKS as f64;
        let eased = (1. - (t * PI).cos()) / 2.;
        self.from + (self.to - self.from) * eased
    }

    fn finished(&self, tick: u64) -> bool {
        tick >= self.start_tick + ZOOM_ANIMATION_TICKS
    }
}

/// Owns pan position, zoom and drag state; advances once per tick.
///
/// `pos` is the world-pixel point at the canvas center, in the pixel space of the current
/// integer zoom. It is re-derived on every zoom change, never carried across zoom levels.
#[derive(Debug)]
pub struct Viewport {
    zoom: u8,
    min_zoom: u8,
    max_zoom: u8,
    pos: Pixels,
    grab: Option<Pixels>,
    anim: Option<ZoomAnimation>,
    tick: u64,

    /// Tick of the last accepted wheel notch; `None` until the first one.
    last_wheel_tick: Option<u64>,
    canvas_size: Pixels,
    tile_size: u32,
}

impl Viewport {
    pub fn new(
        min_zoom: u8,
        max_zoom: u8,
        tile_size: u32,
        canvas_size: Pixels,
    ) -> Result<Self, InvalidZoom> {
        if min_zoom > max_zoom {
            return Err(InvalidZoom);
        }
        let zoom = min_zoom;
        let mut viewport = Self {
            zoom,
            min_zoom,
            max_zoom,
            pos: Pixels::new(0., 0.),
            grab: None,
            anim: None,
            tick: 0,
            last_wheel_tick: None,
            canvas_size,
            tile_size,
        };
        viewport.pos = Pixels::new(
            total_pixels(zoom as f64, tile_size) / 2.,
            total_pixels(zoom as f64, tile_size) / 2.,
        );
        viewport.clamp_pos();
        Ok(viewport)
    }

    pub fn zoom(&self) -> u8 {
        self.zoom
    }

    /// The displayed zoom: fractional while a zoom animation is running.
    pub fn display_zoom(&self) -> f64 {
        self.anim
            .as_ref()
            .map(|anim| anim.value(self.tick))
            .unwrap_or(self.zoom as f64)
    }

    /// World-pixel point at the canvas center, in current-zoom space.
    pub fn pos(&self) -> Pixels {
        self.pos
    }

    pub fn center_position(&self) -> Position {
        unproject(self.pos, self.zoom as f64, self.tile_size)
    }

    pub fn canvas_size(&self) -> Pixels {
        self.canvas_size
    }

    pub fn set_canvas_size(&mut self, size: Pixels) {
        self.canvas_size = size;
        self.clamp_pos();
    }

    pub fn dragging(&self) -> bool {
        self.grab.is_some()
    }

    pub fn animating(&self) -> bool {
        self.anim.is_some()
    }

    fn canvas_center(&self) -> Pixels {
        self.canvas_size * 0.5
    }

    /// Scale of the animated transform: `2^(display_zoom - zoom)`, 1 when idle.
    pub fn scale(&self) -> f64 {
        2f64.powf(self.display_zoom() - self.zoom as f64)
    }

    fn anchor(&self) -> Pixels {
        self.anim
            .as_ref()
            .map(|anim| anim.anchor)
            .unwrap_or_else(|| self.canvas_center())
    }

    /// World pixels (current-zoom space) to canvas pixels, under the animated transform.
    pub fn world_to_screen(&self, world: Pixels) -> Pixels {
        let anchor = self.anchor();
        anchor + (world - self.pos + self.canvas_center() - anchor) * self.scale()
    }

    /// Canvas pixels back to world pixels, inverse of [`Self::world_to_screen`].
    pub fn screen_to_world(&self, screen: Pixels) -> Pixels {
        let anchor = self.anchor();
        self.pos + (screen - anchor) / self.scale() + (anchor - self.canvas_center())
    }

    /// Re-center on a geographical position, optionally at a new zoom. Cancels any running
    /// zoom animation.
    pub fn move_to(&mut self, position: Position, zoom: Option<u8>) {
        if let Some(zoom) = zoom {
            self.zoom = zoom.clamp(self.min_zoom, self.max_zoom);
        }
        self.anim = None;
        self.pos = project(position, self.zoom as f64, self.tile_size);
        self.clamp_pos();
    }

    /// Zoom by `delta` steps keeping `anchor` (canvas center when `None`) visually fixed.
    /// A no-op returning `false` when the target zoom is out of bounds; user-driven gestures
    /// routinely push past them.
    pub fn zoom_by(&mut self, delta: i32, anchor: Option<Pixels>) -> bool {
        let target = self.zoom as i32 + delta;
        if delta == 0 || target < self.min_zoom as i32 || target > self.max_zoom as i32 {
            return false;
        }

        let offset = anchor.unwrap_or_else(|| self.canvas_center()) - self.canvas_center();
        let from = self.display_zoom();

        // World pixel space doubles per zoom step; re-center so the anchor keeps pointing at
        // the same world location.
        if delta > 0 {
            for _ in 0..delta {
                self.pos = self.pos * 2. + offset;
            }
        } else {
            for _ in 0..-delta {
                self.pos = self.pos * 0.5 - offset * 0.5;
            }
        }

        self.zoom = target as u8;
        self.anim = Some(ZoomAnimation {
            start_tick: self.tick,
            from,
            to: target as f64,
            anchor: anchor.unwrap_or_else(|| self.canvas_center()),
        });
        self.clamp_pos();
        true
    }

    /// The finest zoom at which the bounding box of `positions` fits within
    /// [`REVEAL_FIT`] of the canvas, searched from the maximum zoom downward, together with
    /// the world-pixel center of the box at that zoom.
    pub(crate) fn fit_zoom(&self, positions: &[Position]) -> Option<(u8, Pixels)> {
        let first = positions.first()?;
        let mut min = *first;
        let mut max = *first;
        for position in positions {
            min = Position::new(min.x().min(position.x()), min.y().min(position.y()));
            max = Position::new(max.x().max(position.x()), max.y().max(position.y()));
        }

        for zoom in (self.min_zoom..=self.max_zoom).rev() {
            let a = project(min, zoom as f64, self.tile_size);
            let b = project(max, zoom as f64, self.tile_size);
            let fits = (b.x() - a.x()).abs() <= self.canvas_size.x() * REVEAL_FIT
                && (b.y() - a.y()).abs() <= self.canvas_size.y() * REVEAL_FIT;
            if fits {
                return Some((zoom, (a + b) * 0.5));
            }
        }

        let a = project(min, self.min_zoom as f64, self.tile_size);
        let b = project(max, self.min_zoom as f64, self.tile_size);
        Some((self.min_zoom, (a + b) * 0.5))
    }

    pub(crate) fn apply_fit(&mut self, zoom: u8, center: Pixels) -> bool {
        let changed = zoom != self.zoom;
        self.zoom = zoom;
        self.anim = None;
        self.pos = center;
        self.clamp_pos();
        changed
    }

    /// Center the viewport on the bounding box of `positions` at the finest fitting zoom.
    /// With `minimize`, only accepts the fit when it coarsens the current zoom. Returns
    /// whether the zoom level changed.
    pub fn reveal(&mut self, positions: &[Position], minimize: bool) -> bool {
        let Some((zoom, center)) = self.fit_zoom(positions) else {
            return false;
        };
        if minimize && zoom >= self.zoom {
            return false;
        }
        self.apply_fit(zoom, center)
    }

    /// Advance one tick: run the zoom animation, the wheel, and the drag state machine, then
    /// keep the viewport inside the map.
    pub fn update(&mut self, pointer: &Pointer, over_target: bool) -> Cursor {
        self.tick += 1;

        if self
            .anim
            .as_ref()
            .is_some_and(|anim| anim.finished(self.tick))
        {
            self.anim = None;
        }

        let debounced = self
            .last_wheel_tick
            .is_some_and(|last| self.tick.saturating_sub(last) < WHEEL_DEBOUNCE_TICKS);
        if pointer.wheel != 0 && !debounced {
            let step = if pointer.wheel > 0 { 1 } else { -1 };
            if self.zoom_by(step, Some(pointer.pos())) {
                self.last_wheel_tick = Some(self.tick);
            }
        }

        let cursor = if pointer.held() {
            if let Some(grab) = self.grab {
                // Translate by the pointer delta since last tick.
                self.pos = self.pos - (pointer.pos() - grab);
                self.grab = Some(pointer.pos());
                Cursor::Grabbing
            } else if pointer.pressed() && !over_target {
                self.grab = Some(pointer.pos());
                Cursor::Grabbing
            } else if over_target {
                Cursor::Pointer
            } else {
                Cursor::Grab
            }
        } else {
            self.grab = None;
            if over_target {
                Cursor::Pointer
            } else {
                Cursor::Grab
            }
        };

        self.clamp_pos();
        // Integer pixels, to avoid sub-pixel jitter in the tile blits.
        self.pos = self.pos.floored();

        cursor
    }

    /// Keep the viewport inside the map bounds whenever the map is larger than the canvas;
    /// center the axis otherwise.
    fn clamp_pos(&mut self) {
        let map = total_pixels(self.zoom as f64, self.tile_size);

        let clamp_axis = |pos: f64, canvas: f64| {
            if map > canvas {
                pos.clamp(canvas / 2., map - canvas / 2.)
            } else {
                map / 2.
            }
        };

        self.pos = Pixels::new(
            clamp_axis(self.pos.x(), self.canvas_size.x()),
            clamp_axis(self.pos.y(), self.canvas_size.y()),
        );
    }
}

/// Marker and tile glyph scale below zoom 7, so dense low-zoom views don't over-clutter.
pub fn size_adaptation(zoom: u8) -> f64 {
    if zoom < 7 {
        (zoom as f64 + 3.) / 10.
    } else {
        1.
    }
}
