//! The host draw-surface contract and the types crossing it.

use image::ImageError;

use crate::position::Pixels;

/// A decoded raster image, ready to be blitted by the host.
#[derive(Debug, Clone)]
pub struct Texture {
    image: image::RgbaImage,
}

impl Texture {
    /// Decode from raw bytes (PNG or JPEG).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ImageError> {
        Ok(Self {
            image: image::load_from_memory(bytes)?.to_rgba8(),
        })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// The decoded pixels, for the host to upload wherever it blits from.
    pub fn image(&self) -> &image::RgbaImage {
        &self.image
    }
}

/// Axis-aligned rectangle in pixels. Also used for uv coordinates in the 0-1 range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub min: Pixels,
    pub max: Pixels,
}

impl Rect {
    pub fn from_min_max(min: Pixels, max: Pixels) -> Self {
        Self { min, max }
    }

    pub fn from_min_size(min: Pixels, size: Pixels) -> Self {
        Self {
            min,
            max: min + size,
        }
    }

    pub fn from_center_size(center: Pixels, size: Pixels) -> Self {
        Self {
            min: center - size * 0.5,
            max: center + size * 0.5,
        }
    }

    /// The whole texture, when used as uv.
    pub fn unit() -> Rect {
        Rect {
            min: Pixels::new(0., 0.),
            max: Pixels::new(1., 1.),
        }
    }

    pub fn width(&self) -> f64 {
        self.max.x() - self.min.x()
    }

    pub fn height(&self) -> f64 {
        self.max.y() - self.min.y()
    }

    pub fn center(&self) -> Pixels {
        (self.min + self.max) * 0.5
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.min.x() < other.max.x()
            && other.min.x() < self.max.x()
            && self.min.y() < other.max.y()
            && other.min.y() < self.max.y()
    }

    pub fn contains(&self, point: Pixels) -> bool {
        point.x() >= self.min.x()
            && point.x() < self.max.x()
            && point.y() >= self.min.y()
            && point.y() < self.max.y()
    }
}

/// 8-bit RGBA color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const WHITE: Color = Color::rgb(255, 255, 255);
    pub const BLACK: Color = Color::rgb(0, 0, 0);
}

/// The 2D drawing surface provided by the host. The engine never owns a window or a GPU
/// context; it describes a frame through these calls.
pub trait Canvas {
    /// Draw the `uv` sub-rectangle (0-1 range) of `texture` scaled into `dst`. `filter` is an
    /// optional CSS-style filter string, e.g. `hue-rotate(180deg)`.
    fn blit(&mut self, texture: &Texture, dst: Rect, uv: Rect, filter: Option<&str>);

    fn fill_rect(&mut self, rect: Rect, color: Color);

    fn fill_circle(&mut self, center: Pixels, radius: f64, color: Color);

    /// Draw `text` with its anchor at `pos` (left edge, vertically centered).
    fn text(&mut self, pos: Pixels, text: &str, size: f64, color: Color);

    /// Width of `text` when drawn at `size`, used to lay out tooltips.
    fn text_width(&self, text: &str, size: f64) -> f64;
}

/// In-memory PNG of the given dimensions, for tests exercising the decode path.
#[cfg(test)]
pub(crate) fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = image::RgbaImage::from_pixel(width, height, image::Rgba([0, 0, 0, 255]));
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgba8(image)
        .write_to(
            &mut std::io::Cursor::new(&mut bytes),
            image::ImageFormat::Png,
        )
        .unwrap();
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decoding_texture_from_bytes() {
        let texture = Texture::from_bytes(&png_bytes(4, 2)).unwrap();
        assert_eq!(texture.width(), 4);
        assert_eq!(texture.height(), 2);
    }

    #[test]
    fn garbage_is_not_a_texture() {
        assert!(Texture::from_bytes(b"definitely not an image").is_err());
    }

    #[test]
    fn rect_intersections() {
        let a = Rect::from_min_size(Pixels::new(0., 0.), Pixels::new(10., 10.));
        let b = Rect::from_min_size(Pixels::new(5., 5.), Pixels::new(10., 10.));
        let c = Rect::from_min_size(Pixels::new(20., 20.), Pixels::new(1., 1.));
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
        assert!(a.contains(Pixels::new(9.9, 0.)));
        assert!(!a.contains(Pixels::new(10., 0.)));
    }
}
