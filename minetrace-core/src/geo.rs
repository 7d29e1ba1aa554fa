//! Spherical-earth geodesy helpers

use serde::{Deserialize, Serialize};

/// Mean earth radius in meters
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Geodetic position (degrees, meters)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GeoPosition {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
}

impl GeoPosition {
    pub const fn new(latitude: f64, longitude: f64, altitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            altitude,
        }
    }

    /// Great-circle distance to `other` in meters
    pub fn distance_to(&self, other: &GeoPosition) -> f64 {
        haversine_distance(self, other)
    }

    /// Forward azimuth toward `other` in degrees [0, 360)
    pub fn bearing_to(&self, other: &GeoPosition) -> f64 {
        initial_bearing(self, other)
    }

    /// Point reached by travelling `distance` meters along `bearing`
    pub fn offset(&self, bearing: f64, distance: f64) -> GeoPosition {
        let delta = distance / EARTH_RADIUS_M;
        let theta = bearing.to_radians();
        let phi1 = self.latitude.to_radians();
        let lambda1 = self.longitude.to_radians();

        let phi2 = (phi1.sin() * delta.cos() + phi1.cos() * delta.sin() * theta.cos()).asin();
        let lambda2 = lambda1
            + (theta.sin() * delta.sin() * phi1.cos()).atan2(delta.cos() - phi1.sin() * phi2.sin());

        GeoPosition {
            latitude: phi2.to_degrees(),
            longitude: lambda2.to_degrees(),
            altitude: self.altitude,
        }
    }
}

/// Normalize any bearing into [0, 360)
pub fn normalize_bearing(bearing: f64) -> f64 {
    let normalized = ((bearing % 360.0) + 360.0) % 360.0;
    // -0.0 and values that round up to 360.0 both collapse to 0
    if normalized >= 360.0 || normalized == 0.0 {
        0.0
    } else {
        normalized
    }
}

/// Haversine great-circle distance in meters
pub fn haversine_distance(from: &GeoPosition, to: &GeoPosition) -> f64 {
    let phi1 = from.latitude.to_radians();
    let phi2 = to.latitude.to_radians();
    let d_phi = (to.latitude - from.latitude).to_radians();
    let d_lambda = (to.longitude - from.longitude).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * c
}

/// Initial bearing (forward azimuth) from `from` to `to`, degrees [0, 360)
pub fn initial_bearing(from: &GeoPosition, to: &GeoPosition) -> f64 {
    let phi1 = from.latitude.to_radians();
    let phi2 = to.latitude.to_radians();
    let d_lambda = (to.longitude - from.longitude).to_radians();

    let y = d_lambda.sin() * phi2.cos();
    let x = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * d_lambda.cos();

    normalize_bearing(y.atan2(x).to_degrees())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_bearing() {
        assert_eq!(normalize_bearing(-30.0), 330.0);
        assert_eq!(normalize_bearing(370.0), 10.0);
        assert_eq!(normalize_bearing(360.0), 0.0);
        assert_eq!(normalize_bearing(-720.0), 0.0);
        assert_eq!(normalize_bearing(45.0), 45.0);
    }

    #[test]
    fn test_cardinal_bearings() {
        let origin = GeoPosition::new(0.0, 0.0, 0.0);
        let north = GeoPosition::new(1.0, 0.0, 0.0);
        let east = GeoPosition::new(0.0, 1.0, 0.0);
        let south = GeoPosition::new(-1.0, 0.0, 0.0);
        let west = GeoPosition::new(0.0, -1.0, 0.0);

        assert!((initial_bearing(&origin, &north) - 0.0).abs() < 1e-9);
        assert!((initial_bearing(&origin, &east) - 90.0).abs() < 1e-9);
        assert!((initial_bearing(&origin, &south) - 180.0).abs() < 1e-9);
        assert!((initial_bearing(&origin, &west) - 270.0).abs() < 1e-9);
    }

    #[test]
    fn test_haversine_one_degree_latitude() {
        let a = GeoPosition::new(33.0, 46.0, 0.0);
        let b = GeoPosition::new(34.0, 46.0, 0.0);
        // 1 degree of arc on a 6371 km sphere
        let expected = EARTH_RADIUS_M * 1.0_f64.to_radians();
        assert!((haversine_distance(&a, &b) - expected).abs() < 1e-6);
        assert_eq!(haversine_distance(&a, &a), 0.0);
    }

    #[test]
    fn test_offset_round_trip() {
        let start = GeoPosition::new(33.63, 46.42, 1200.0);
        let target = start.offset(135.0, 250.0);

        assert!((start.distance_to(&target) - 250.0).abs() < 0.01);
        assert!((start.bearing_to(&target) - 135.0).abs() < 0.01);
        assert_eq!(target.altitude, 1200.0);
    }
}
