//! WGS84 coordinates and great-circle distance.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Mean earth radius in metres (IUGG).
pub const EARTH_RADIUS_METERS: f64 = 6_371_008.8;

/// A latitude/longitude pair in WGS84 degrees.
///
/// # Examples
/// ```
/// use route_panorama::domain::Coordinate;
///
/// let edinburgh = Coordinate::new(55.9533, -3.1883);
/// assert!(edinburgh.is_valid());
/// assert_eq!(edinburgh.distance_to(&edinburgh), 0.0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    /// Latitude in degrees, within `[-90, 90]`.
    pub latitude: f64,
    /// Longitude in degrees, within `[-180, 180]`.
    pub longitude: f64,
}

impl Coordinate {
    /// Build a coordinate from latitude and longitude in degrees.
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Whether both components are finite and inside their WGS84 ranges.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }

    /// Haversine distance to `other` in metres.
    pub fn distance_to(&self, other: &Self) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let d_lat = (other.latitude - self.latitude).to_radians();
        let d_lon = (other.longitude - self.longitude).to_radians();

        let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().clamp(0.0, 1.0).asin();
        EARTH_RADIUS_METERS * c
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6},{:.6}", self.latitude, self.longitude)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn one_degree_of_latitude_is_about_111_km() {
        let a = Coordinate::new(0.0, 0.0);
        let b = Coordinate::new(1.0, 0.0);
        let distance = a.distance_to(&b);
        assert!((distance - 111_195.0).abs() < 5.0, "got {distance}");
    }

    #[rstest]
    fn distance_is_symmetric() {
        let a = Coordinate::new(55.9533, -3.1883);
        let b = Coordinate::new(51.5072, -0.1276);
        assert!((a.distance_to(&b) - b.distance_to(&a)).abs() < 1e-6);
    }

    #[rstest]
    #[case(Coordinate::new(91.0, 0.0))]
    #[case(Coordinate::new(0.0, -181.0))]
    #[case(Coordinate::new(f64::NAN, 0.0))]
    #[case(Coordinate::new(0.0, f64::INFINITY))]
    fn out_of_range_coordinates_are_invalid(#[case] coordinate: Coordinate) {
        assert!(!coordinate.is_valid());
    }

    #[rstest]
    fn display_uses_six_decimals() {
        assert_eq!(
            Coordinate::new(55.9533, -3.1883).to_string(),
            "55.953300,-3.188300"
        );
    }
}
