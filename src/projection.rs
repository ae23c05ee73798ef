//! Planar km-plane projection keyed to Japan.
//!
//! Every distance in the engine is computed on this plane, so wave fronts
//! stay true circles and the two-way transform is cheap and analytic.
//! Longitude maps linearly; latitude goes through a scaled Mercator y.

use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};

/// Reference longitude (degrees); maps to x = 0.
pub const REF_LON: f64 = 138.0;

/// Reference latitude (degrees); maps to y = 0.
pub const REF_LAT: f64 = 37.0;

/// km of x per degree of longitude.
pub const X_KM_PER_DEG: f64 = 89.2;

/// km of y per unit of Mercator y. The ratio is 180/π to six digits, so the
/// scale is 89.22 km per degree of Mercator latitude.
pub const MERCATOR_Y_SCALE: f64 = 89.22 * (5_473_695.0 / 95_534.0);

/// Mercator y (dimensionless) for a latitude in degrees.
fn mercator_y(lat_deg: f64) -> f64 {
    (FRAC_PI_4 + lat_deg.to_radians() / 2.0).tan().ln()
}

/// Project (lat, lon) in degrees onto the km-plane.
#[must_use]
pub fn latlon_to_xy_km(lat: f64, lon: f64) -> (f64, f64) {
    let x = (lon - REF_LON) * X_KM_PER_DEG;
    let y = (mercator_y(lat) - mercator_y(REF_LAT)) * MERCATOR_Y_SCALE;
    (x, y)
}

/// Exact inverse of [`latlon_to_xy_km`].
#[must_use]
pub fn xy_km_to_latlon(x: f64, y: f64) -> (f64, f64) {
    let lon = x / X_KM_PER_DEG + REF_LON;
    let merc = y / MERCATOR_Y_SCALE + mercator_y(REF_LAT);
    let lat = (2.0 * merc.exp().atan() - FRAC_PI_2).to_degrees();
    (lat, lon)
}

/// Planar distance in km between two geographic points.
#[must_use]
pub fn distance_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (x1, y1) = latlon_to_xy_km(lat1, lon1);
    let (x2, y2) = latlon_to_xy_km(lat2, lon2);
    (x2 - x1).hypot(y2 - y1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_point_is_origin() {
        let (x, y) = latlon_to_xy_km(REF_LAT, REF_LON);
        assert!(x.abs() < 1e-9);
        assert!(y.abs() < 1e-9);
    }

    #[test]
    fn test_longitude_is_linear() {
        let (x, _) = latlon_to_xy_km(37.0, 139.0);
        assert!((x - X_KM_PER_DEG).abs() < 1e-9);
        let (x, _) = latlon_to_xy_km(24.0, 136.0);
        assert!((x + 2.0 * X_KM_PER_DEG).abs() < 1e-9);
    }

    #[test]
    fn test_round_trip() {
        // Spread over the Japan map bounds
        for &(lat, lon) in &[
            (24.0, 122.0),
            (35.68, 139.77),
            (37.0, 138.0),
            (43.06, 141.35),
            (46.0, 154.0),
        ] {
            let (x, y) = latlon_to_xy_km(lat, lon);
            let (lat2, lon2) = xy_km_to_latlon(x, y);
            assert!((lat - lat2).abs() < 1e-6, "lat {lat} -> {lat2}");
            assert!((lon - lon2).abs() < 1e-6, "lon {lon} -> {lon2}");
        }
    }

    #[test]
    fn test_distance_symmetric() {
        let d1 = distance_km(35.7, 139.7, 34.7, 135.5);
        let d2 = distance_km(34.7, 135.5, 35.7, 139.7);
        assert!((d1 - d2).abs() < 1e-9);
        assert!(d1 > 300.0 && d1 < 500.0, "Tokyo-Osaka plane distance {d1}");
    }

    #[test]
    fn test_distance_zero_at_same_point() {
        assert!(distance_km(36.0, 140.0, 36.0, 140.0).abs() < 1e-12);
    }
}
