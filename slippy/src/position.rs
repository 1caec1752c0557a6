//! Types and functions for working with positions.

/// Geographical position with latitude and longitude.
pub type Position = geo_types::Point;

/// Construct `Position` from latitude and longitude.
pub fn lat_lon(lat: f64, lon: f64) -> Position {
    Position::new(lon, lat)
}

/// Construct `Position` from longitude and latitude. Note that it is common standard to write
/// coordinates starting with the latitude instead.
pub fn lon_lat(lon: f64, lat: f64) -> Position {
    Position::new(lon, lat)
}

/// Location projected on the screen or an abstract bitmap.
pub type Pixels = geo_types::Point;

/// Extra arithmetic for [`Pixels`] which `geo-types` does not provide.
pub trait PixelsExt {
    fn distance_to(&self, other: Pixels) -> f64;
    fn length(&self) -> f64;
    fn floored(&self) -> Pixels;
}

impl PixelsExt for Pixels {
    fn distance_to(&self, other: Pixels) -> f64 {
        (*self - other).length()
    }

    fn length(&self) -> f64 {
        self.x().hypot(self.y())
    }

    fn floored(&self) -> Pixels {
        Pixels::new(self.x().floor(), self.y().floor())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn latitude_is_y_and_longitude_is_x() {
        let position = lat_lon(51.0, 17.0);
        assert_relative_eq!(position.y(), 51.0);
        assert_relative_eq!(position.x(), 17.0);
        assert_eq!(position, lon_lat(17.0, 51.0));
    }

    #[test]
    fn pixel_distances() {
        let a = Pixels::new(1.0, 2.0);
        let b = Pixels::new(4.0, 6.0);
        assert_relative_eq!(a.distance_to(b), 5.0);
        assert_eq!(Pixels::new(1.9, -0.1).floored(), Pixels::new(1.0, -1.0));
    }
}
