//! Domain cache key type shared by the panorama and address caches.
use std::fmt;

use crate::domain::Coordinate;

/// Number of decimal digits retained by default (about one metre).
pub const DEFAULT_KEY_PRECISION: u8 = 5;

/// Largest supported precision; beyond this the scaled value loses meaning.
const MAX_KEY_PRECISION: u8 = 9;

/// Cache key derived from a coordinate rounded to a fixed decimal precision.
///
/// Rounded values are stored as scaled integers so that equality and hashing
/// are exact: coordinates that round to the same value collapse onto one key.
///
/// # Examples
/// ```
/// use route_panorama::domain::Coordinate;
/// use route_panorama::domain::ports::CoordinateCacheKey;
///
/// let a = CoordinateCacheKey::new(Coordinate::new(55.953_301, -3.188_304));
/// let b = CoordinateCacheKey::new(Coordinate::new(55.953_298, -3.188_296));
/// assert_eq!(a, b);
/// assert_eq!(a.to_string(), "55.95330,-3.18830");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CoordinateCacheKey {
    latitude_scaled: i64,
    longitude_scaled: i64,
    precision: u8,
}

impl CoordinateCacheKey {
    /// Build a key using [`DEFAULT_KEY_PRECISION`].
    pub fn new(coordinate: Coordinate) -> Self {
        Self::with_precision(coordinate, DEFAULT_KEY_PRECISION)
    }

    /// Build a key rounding to `precision` decimal digits (capped at nine).
    pub fn with_precision(coordinate: Coordinate, precision: u8) -> Self {
        let precision = precision.min(MAX_KEY_PRECISION);
        let scale = scale_for(precision);
        Self {
            latitude_scaled: scaled(coordinate.latitude, scale),
            longitude_scaled: scaled(coordinate.longitude, scale),
            precision,
        }
    }

    /// Rounded latitude in degrees.
    pub fn latitude(&self) -> f64 {
        self.latitude_scaled as f64 / scale_for(self.precision)
    }

    /// Rounded longitude in degrees.
    pub fn longitude(&self) -> f64 {
        self.longitude_scaled as f64 / scale_for(self.precision)
    }

    /// Decimal digits retained by this key.
    pub fn precision(&self) -> u8 {
        self.precision
    }

    /// The rounded coordinate this key represents.
    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude(), self.longitude())
    }
}

fn scale_for(precision: u8) -> f64 {
    10_f64.powi(i32::from(precision))
}

fn scaled(value: f64, scale: f64) -> i64 {
    // Saturating float-to-int cast; NaN maps to zero.
    (value * scale).round() as i64
}

impl fmt::Display for CoordinateCacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = usize::from(self.precision);
        write!(
            f,
            "{:.digits$},{:.digits$}",
            self.latitude(),
            self.longitude()
        )
    }
}
