//! Per-route bookkeeping for the prefetcher.

use super::{Generation, PointResolution};
use crate::domain::{Coordinate, RoutePoint};

/// Points of the loaded route and which of them have been requested.
#[derive(Debug, Default)]
pub(super) struct RouteTrack {
    generation: Generation,
    points: Vec<RoutePoint>,
    requested: Vec<bool>,
}

impl RouteTrack {
    /// Install a new route, invalidating every earlier generation.
    pub(super) fn replace(&mut self, points: Vec<RoutePoint>) -> Generation {
        self.generation = self.generation.next();
        self.requested = vec![false; points.len()];
        self.points = points;
        self.generation
    }

    /// Mark `index` as requested if it belongs to `generation` and has not
    /// been requested yet, returning the coordinate to fetch.
    pub(super) fn claim(&mut self, generation: Generation, index: usize) -> Option<Coordinate> {
        if generation != self.generation {
            return None;
        }
        let requested = self.requested.get_mut(index)?;
        if *requested {
            return None;
        }
        *requested = true;
        self.points.get(index).map(|point| point.coordinate)
    }

    /// Store a fetch result. Returns `false` for stale or out-of-range
    /// results, which are dropped.
    pub(super) fn apply(&mut self, resolution: &PointResolution) -> bool {
        if resolution.generation != self.generation {
            return false;
        }
        let Some(point) = self.points.get_mut(resolution.index) else {
            return false;
        };
        point.scene.clone_from(&resolution.scene);
        point.is_loading = false;
        point.fetch_failed = resolution.failed;
        true
    }

    pub(super) fn generation(&self) -> Generation {
        self.generation
    }

    pub(super) fn points(&self) -> &[RoutePoint] {
        &self.points
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn track_with(len: usize) -> (RouteTrack, Generation) {
        let mut track = RouteTrack::default();
        let points = (0..len)
            .map(|index| RoutePoint::new(index, Coordinate::new(0.0, 0.0)))
            .collect();
        let generation = track.replace(points);
        (track, generation)
    }

    #[rstest]
    fn each_point_is_claimed_once() {
        let (mut track, generation) = track_with(2);
        assert!(track.claim(generation, 1).is_some());
        assert!(track.claim(generation, 1).is_none());
        assert!(track.claim(generation, 2).is_none());
    }

    #[rstest]
    fn replacing_the_route_invalidates_old_claims_and_results() {
        let (mut track, old) = track_with(2);
        let current = track.replace(vec![RoutePoint::new(0, Coordinate::new(1.0, 1.0))]);
        assert!(current > old);

        assert!(track.claim(old, 0).is_none());
        let stale = PointResolution {
            generation: old,
            index: 0,
            scene: None,
            failed: true,
        };
        assert!(!track.apply(&stale));
        assert!(track.points()[0].is_loading);
    }

    #[rstest]
    fn applying_marks_the_point_resolved() {
        let (mut track, generation) = track_with(1);
        let failed = PointResolution {
            generation,
            index: 0,
            scene: None,
            failed: true,
        };
        assert!(track.apply(&failed));
        let point = &track.points()[0];
        assert!(point.is_resolved());
        assert!(point.fetch_failed);
    }
}
