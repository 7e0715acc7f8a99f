//! Web Mercator pixel projection.
//!
//! Clustering distances are measured in screen pixels at a given zoom,
//! the same space the map library draws markers in.

use std::f64::consts::PI;

use toponym_map_geometry_models::LatLng;

/// Width and height of a zoom-0 world tile in pixels.
pub const TILE_SIZE: f64 = 256.0;

/// Latitude limit of the Web Mercator projection.
pub const MAX_LATITUDE: f64 = 85.051_128_779_806_59;

/// Projects `point` to global pixel coordinates `[x, y]` at `zoom`.
///
/// Latitudes beyond [`MAX_LATITUDE`] are clamped.
#[must_use]
pub fn project(point: LatLng, zoom: f64) -> [f64; 2] {
    let scale = TILE_SIZE * zoom.exp2();
    let lat = point.lat.clamp(-MAX_LATITUDE, MAX_LATITUDE).to_radians();
    let x = (point.lon + 180.0) / 360.0 * scale;
    let y = (1.0 - lat.tan().asinh() / PI) / 2.0 * scale;
    [x, y]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_maps_to_the_center_of_the_world_tile() {
        let [x, y] = project(LatLng::new(0.0, 0.0), 0.0);
        assert!((x - 128.0).abs() < 1e-9);
        assert!((y - 128.0).abs() < 1e-9);
    }

    #[test]
    fn pixel_distances_double_per_zoom_level() {
        let a = LatLng::new(49.19, 16.60);
        let b = LatLng::new(49.20, 16.62);
        let dx = |zoom| project(b, zoom)[0] - project(a, zoom)[0];
        assert!((dx(11.0) / dx(10.0) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn north_is_up() {
        let south = project(LatLng::new(48.0, 16.0), 5.0);
        let north = project(LatLng::new(50.0, 16.0), 5.0);
        assert!(north[1] < south[1]);
    }

    #[test]
    fn poles_are_clamped() {
        let [_, y] = project(LatLng::new(90.0, 0.0), 0.0);
        assert!(y.is_finite());
        assert!(y.abs() < 1e-6);
    }
}
