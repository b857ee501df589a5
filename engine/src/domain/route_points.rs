//! Route point sampling along a continuous travel path.

use thiserror::Error;

use super::Coordinate;
use super::ports::PanoramaScene;

/// Default minimum arc length between sampled points, in metres.
pub const DEFAULT_POINT_INTERVAL_METERS: f64 = 30.0;

/// A sampled position along the route and its panorama state.
///
/// Points are created by [`extract_route_points`] and mutated only by the
/// prefetcher that owns the loaded route.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutePoint {
    /// Dense, zero-based position in the route.
    pub index: usize,
    /// Sampled path vertex.
    pub coordinate: Coordinate,
    /// Panorama resolved for this point, once fetched.
    pub scene: Option<PanoramaScene>,
    /// True until the first fetch attempt for this point resolves.
    pub is_loading: bool,
    /// Whether the fetch attempt failed (as opposed to finding no coverage).
    pub fetch_failed: bool,
}

impl RoutePoint {
    /// Build an unresolved point.
    pub fn new(index: usize, coordinate: Coordinate) -> Self {
        Self {
            index,
            coordinate,
            scene: None,
            is_loading: true,
            fetch_failed: false,
        }
    }

    /// Whether a fetch attempt has completed, successfully or not.
    pub fn is_resolved(&self) -> bool {
        !self.is_loading
    }

    /// Whether imagery is available for this point.
    pub fn has_scene(&self) -> bool {
        self.scene.is_some()
    }
}

/// Reasons a path cannot be sampled.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RouteExtractionError {
    /// The sampling interval is zero, negative, or not finite.
    #[error("point interval must be a positive finite distance (got {interval})")]
    InvalidInterval {
        /// Rejected interval in metres.
        interval: f64,
    },
    /// A path vertex lies outside WGS84 bounds.
    #[error("path coordinate at position {position} is not a valid WGS84 location")]
    InvalidCoordinate {
        /// Position of the offending vertex in the input path.
        position: usize,
    },
}

/// Sample `path` into route points spaced at least `interval_meters` apart.
///
/// Distance accumulates along path segments; each time it reaches the
/// interval the current vertex is emitted and the accumulator resets. The
/// first and last vertices are always emitted.
///
/// # Examples
/// ```
/// use route_panorama::domain::{Coordinate, extract_route_points};
///
/// let path = [
///     Coordinate::new(55.9500, -3.1900),
///     Coordinate::new(55.9505, -3.1900),
///     Coordinate::new(55.9510, -3.1900),
/// ];
/// let points = extract_route_points(&path, 30.0)?;
/// assert_eq!(points.len(), 3);
/// assert_eq!(points[2].coordinate, path[2]);
/// # Ok::<(), route_panorama::domain::RouteExtractionError>(())
/// ```
pub fn extract_route_points(
    path: &[Coordinate],
    interval_meters: f64,
) -> Result<Vec<RoutePoint>, RouteExtractionError> {
    if !interval_meters.is_finite() || interval_meters <= 0.0 {
        return Err(RouteExtractionError::InvalidInterval {
            interval: interval_meters,
        });
    }
    if let Some(position) = path.iter().position(|coordinate| !coordinate.is_valid()) {
        return Err(RouteExtractionError::InvalidCoordinate { position });
    }

    let (Some(first), Some(last)) = (path.first(), path.last()) else {
        return Ok(Vec::new());
    };

    let mut points = vec![RoutePoint::new(0, *first)];
    let mut accumulated = 0.0;
    let mut last_emitted = 0;

    for (segment, pair) in path.windows(2).enumerate() {
        let [from, to] = pair else { continue };
        accumulated += from.distance_to(to);
        if accumulated >= interval_meters {
            points.push(RoutePoint::new(points.len(), *to));
            accumulated = 0.0;
            last_emitted = segment + 1;
        }
    }

    let final_position = path.len() - 1;
    if final_position > 0 && last_emitted != final_position {
        points.push(RoutePoint::new(points.len(), *last));
    }

    Ok(points)
}

#[cfg(test)]
mod tests {
    //! Sampling properties and degenerate inputs.
    use super::*;
    use crate::test_support::straight_path;
    use rstest::rstest;

    #[rstest]
    fn empty_path_yields_no_points() {
        let points = extract_route_points(&[], 30.0).expect("valid interval");
        assert!(points.is_empty());
    }

    #[rstest]
    fn single_coordinate_yields_one_point() {
        let only = Coordinate::new(1.0, 2.0);
        let points = extract_route_points(&[only], 30.0).expect("valid input");
        assert_eq!(points, vec![RoutePoint::new(0, only)]);
    }

    #[rstest]
    fn vertices_fifty_metres_apart_each_cross_a_threshold() {
        let path = straight_path(5, 50.0);
        let points = extract_route_points(&path, 30.0).expect("valid input");

        let emitted: Vec<_> = points.iter().map(|point| point.coordinate).collect();
        assert_eq!(emitted, path);
        assert!(points.iter().all(|point| point.is_loading && !point.fetch_failed));
    }

    #[rstest]
    fn final_vertex_is_forced_once() {
        // Spacing of 10.5 m: thresholds land on vertices 3 and 6; vertex 7
        // is forced as the final point.
        let path = straight_path(8, 10.5);
        let points = extract_route_points(&path, 30.0).expect("valid input");

        let emitted: Vec<_> = points.iter().map(|point| point.coordinate).collect();
        assert_eq!(emitted, vec![path[0], path[3], path[6], path[7]]);
    }

    #[rstest]
    fn natural_final_emission_is_not_duplicated() {
        let path = straight_path(7, 10.5);
        let points = extract_route_points(&path, 30.0).expect("valid input");
        let emitted: Vec<_> = points.iter().map(|point| point.coordinate).collect();
        assert_eq!(emitted, vec![path[0], path[3], path[6]]);
    }

    #[rstest]
    #[case(5, 50.0, 30.0)]
    #[case(40, 7.5, 30.0)]
    #[case(25, 13.0, 45.0)]
    #[case(3, 100.0, 1_000.0)]
    fn sampling_properties_hold(
        #[case] vertices: usize,
        #[case] spacing: f64,
        #[case] interval: f64,
    ) {
        let path = straight_path(vertices, spacing);
        let points = extract_route_points(&path, interval).expect("valid input");

        assert_eq!(points.first().map(|p| p.coordinate), path.first().copied());
        assert_eq!(points.last().map(|p| p.coordinate), path.last().copied());
        for (expected, point) in points.iter().enumerate() {
            assert_eq!(point.index, expected, "indices are dense and ordered");
        }
        // Every gap except the one before the forced final point spans at
        // least the interval along the path.
        let gaps = points.len().saturating_sub(2);
        for pair in points.windows(2).take(gaps) {
            let along_path = path_distance_between(&path, pair[0].coordinate, pair[1].coordinate);
            assert!(along_path + 1e-6 >= interval, "gap {along_path} < {interval}");
        }
    }

    #[rstest]
    #[case(0.0)]
    #[case(-5.0)]
    #[case(f64::NAN)]
    #[case(f64::INFINITY)]
    fn invalid_intervals_are_rejected(#[case] interval: f64) {
        let err = extract_route_points(&straight_path(3, 10.0), interval)
            .expect_err("interval rejected");
        assert!(matches!(err, RouteExtractionError::InvalidInterval { .. }));
    }

    #[rstest]
    fn invalid_coordinates_are_rejected() {
        let mut path = straight_path(3, 10.0);
        path[1] = Coordinate::new(120.0, 0.0);
        let err = extract_route_points(&path, 30.0).expect_err("coordinate rejected");
        assert_eq!(err, RouteExtractionError::InvalidCoordinate { position: 1 });
    }

    fn path_distance_between(path: &[Coordinate], from: Coordinate, to: Coordinate) -> f64 {
        let start = path.iter().position(|c| *c == from).expect("from on path");
        let end = path.iter().position(|c| *c == to).expect("to on path");
        path[start..=end]
            .windows(2)
            .map(|pair| pair[0].distance_to(&pair[1]))
            .sum()
    }
}
