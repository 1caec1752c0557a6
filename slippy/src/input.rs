//! The host input contract: a normalized pointer snapshot fed to [`crate::Map::update`] once
//! per tick.

use crate::position::Pixels;

/// Pointer state for one tick.
///
/// `left` uses edge encoding: `-1` released this tick, `0` idle, `1` pressed this tick, `2+`
/// held for that many ticks. The host updates the snapshot before `update()` and calls
/// [`Pointer::decay`] afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pointer {
    pub x: i32,
    pub y: i32,
    pub left: i32,

    /// Signed wheel notch delta for this tick; positive means zoom in.
    pub wheel: i32,
}

impl Pointer {
    pub fn new(x: i32, y: i32) -> Self {
        Self {
            x,
            y,
            left: 0,
            wheel: 0,
        }
    }

    pub fn pos(&self) -> Pixels {
        Pixels::new(self.x as f64, self.y as f64)
    }

    /// Button went down this tick.
    pub fn pressed(&self) -> bool {
        self.left == 1
    }

    /// Button is down, no matter for how long.
    pub fn held(&self) -> bool {
        self.left >= 1
    }

    /// Button went up this tick.
    pub fn released(&self) -> bool {
        self.left == -1
    }

    /// Advance edge states after a tick: wheel resets, a press becomes a hold, a release
    /// becomes idle.
    pub fn decay(&mut self) {
        self.wheel = 0;
        if self.left >= 1 {
            self.left += 1;
        } else if self.left == -1 {
            self.left = 0;
        }
    }

    pub fn press(&mut self) {
        self.left = 1;
    }

    pub fn release(&mut self) {
        self.left = -1;
    }
}

impl Default for Pointer {
    fn default() -> Self {
        Self::new(0, 0)
    }
}

/// Cursor shape the host should display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cursor {
    /// Open hand, over a draggable map.
    Grab,
    /// Closed hand, while dragging.
    Grabbing,
    /// Over a clickable element.
    Pointer,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn button_edges_decay_into_steady_states() {
        let mut pointer = Pointer::new(10, 20);
        pointer.press();
        assert!(pointer.pressed() && pointer.held());

        pointer.decay();
        assert!(!pointer.pressed() && pointer.held());
        assert_eq!(pointer.left, 2);

        pointer.release();
        assert!(pointer.released());
        pointer.decay();
        assert_eq!(pointer.left, 0);
    }

    #[test]
    fn wheel_resets_on_decay() {
        let mut pointer = Pointer::new(0, 0);
        pointer.wheel = -2;
        pointer.decay();
        assert_eq!(pointer.wheel, 0);
    }
}
