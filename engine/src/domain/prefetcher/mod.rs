//! Progressive panorama prefetching along a loaded route.
//!
//! The prefetcher owns the route points for one route at a time. An initial
//! batch is fetched up front and awaited; afterwards a lookahead window ahead
//! of the playback position is kept requested through background tasks.
//!
//! Every route load bumps a [`Generation`]. In-flight tasks from the previous
//! route are aborted, and any result that still arrives is compared against
//! the current generation and dropped when stale.

mod track;

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use futures_util::stream::{FuturesUnordered, StreamExt};
use tokio::task::AbortHandle;
use tracing::{debug, warn};

use self::track::RouteTrack;
use super::ports::PanoramaScene;
use super::{Coordinate, PanoramaService, RoutePoint};

/// Route-load token used to discard results from replaced routes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(u64);

impl Generation {
    fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outcome of one route point fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct PointResolution {
    /// Route the point belongs to.
    pub generation: Generation,
    /// Index of the point within the route.
    pub index: usize,
    /// Scene found for the point, if any.
    pub scene: Option<PanoramaScene>,
    /// Whether the fetch failed rather than finding no coverage.
    pub failed: bool,
}

/// Callback invoked once per resolved point of the current route.
pub type PointCallback = Arc<dyn Fn(PointResolution) + Send + Sync>;

struct Inner {
    service: Arc<PanoramaService>,
    track: Mutex<RouteTrack>,
    tasks: Mutex<Vec<AbortHandle>>,
}

impl Inner {
    fn track(&self) -> MutexGuard<'_, RouteTrack> {
        self.track.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn tasks(&self) -> MutexGuard<'_, Vec<AbortHandle>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn abort_tasks(&self) {
        let handles = std::mem::take(&mut *self.tasks());
        if !handles.is_empty() {
            debug!(count = handles.len(), "aborting in-flight prefetch tasks");
        }
        for handle in handles {
            handle.abort();
        }
    }

    fn deliver(&self, resolution: PointResolution, callback: &PointCallback) {
        let applied = self.track().apply(&resolution);
        if applied {
            callback(resolution);
        } else {
            debug!(
                generation = %resolution.generation,
                index = resolution.index,
                "dropping stale prefetch result"
            );
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.abort_tasks();
    }
}

/// Fetches panoramas for route points ahead of playback.
///
/// Cloning is cheap and shares the same route state.
#[derive(Clone)]
pub struct ProgressivePrefetcher {
    inner: Arc<Inner>,
}

impl ProgressivePrefetcher {
    /// Build a prefetcher with an empty route.
    pub fn new(service: Arc<PanoramaService>) -> Self {
        Self {
            inner: Arc::new(Inner {
                service,
                track: Mutex::new(RouteTrack::default()),
                tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Replace the route, aborting fetches for the previous one.
    pub fn load(&self, points: Vec<RoutePoint>) -> Generation {
        self.inner.abort_tasks();
        let count = points.len();
        let generation = self.inner.track().replace(points);
        debug!(%generation, points = count, "route loaded into prefetcher");
        generation
    }

    /// Discard the route, aborting outstanding fetches.
    pub fn clear(&self) -> Generation {
        self.load(Vec::new())
    }

    /// Fetch the first `count` points concurrently and wait for all of them.
    ///
    /// `callback` runs as each point resolves, once per point, while
    /// `generation` is still current. Returns how many of those points have a scene.
    pub async fn prefetch_initial(
        &self,
        generation: Generation,
        count: usize,
        callback: &PointCallback,
    ) -> usize {
        let claimed: Vec<(usize, Coordinate)> = {
            let mut track = self.inner.track();
            (0..count)
                .filter_map(|index| track.claim(generation, index).map(|c| (index, c)))
                .collect()
        };

        let service = &self.inner.service;
        let mut pending: FuturesUnordered<_> = claimed
            .into_iter()
            .map(|(index, coordinate)| resolve(service, generation, index, coordinate))
            .collect();

        let mut with_scene = 0;
        while let Some(resolution) = pending.next().await {
            let found = resolution.scene.is_some();
            let applied = self.inner.track().apply(&resolution);
            if !applied {
                continue;
            }
            if found {
                with_scene += 1;
            }
            callback(resolution);
        }
        debug!(%generation, requested = count, with_scene, "initial prefetch finished");
        with_scene
    }

    /// Ensure points `current..=current + lookahead` have been requested,
    /// spawning a background fetch for each one that has not.
    ///
    /// Must be called from within a tokio runtime. Returns the number of
    /// fetches started.
    pub fn top_up(
        &self,
        generation: Generation,
        current: usize,
        lookahead: usize,
        callback: &PointCallback,
    ) -> usize {
        let claimed: Vec<(usize, Coordinate)> = {
            let mut track = self.inner.track();
            let len = track.points().len();
            (current..=current.saturating_add(lookahead))
                .take_while(|index| *index < len)
                .filter_map(|index| track.claim(generation, index).map(|c| (index, c)))
                .collect()
        };
        if claimed.is_empty() {
            return 0;
        }

        let started = claimed.len();
        let mut tasks = self.inner.tasks();
        tasks.retain(|handle| !handle.is_finished());
        for (index, coordinate) in claimed {
            let service = Arc::clone(&self.inner.service);
            let inner: Weak<Inner> = Arc::downgrade(&self.inner);
            let callback = Arc::clone(callback);
            let handle = tokio::spawn(async move {
                let resolution = resolve(&service, generation, index, coordinate).await;
                if let Some(inner) = inner.upgrade() {
                    inner.deliver(resolution, &callback);
                }
            });
            tasks.push(handle.abort_handle());
        }
        debug!(%generation, current, lookahead, started, "lookahead top-up");
        started
    }

    /// Whether the point at `index` has finished its first fetch attempt.
    pub fn is_resolved(&self, index: usize) -> bool {
        self.inner
            .track()
            .points()
            .get(index)
            .is_some_and(RoutePoint::is_resolved)
    }

    /// Snapshot of the point at `index`.
    pub fn point(&self, index: usize) -> Option<RoutePoint> {
        self.inner.track().points().get(index).cloned()
    }

    /// Snapshot of every point in the current route.
    pub fn points(&self) -> Vec<RoutePoint> {
        self.inner.track().points().to_vec()
    }

    /// Number of points in the current route.
    pub fn len(&self) -> usize {
        self.inner.track().points().len()
    }

    /// Whether no route is loaded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Token of the currently loaded route.
    pub fn generation(&self) -> Generation {
        self.inner.track().generation()
    }

    /// Background fetches that have not yet finished.
    pub fn in_flight(&self) -> usize {
        let mut tasks = self.inner.tasks();
        tasks.retain(|handle| !handle.is_finished());
        tasks.len()
    }
}

async fn resolve(
    service: &PanoramaService,
    generation: Generation,
    index: usize,
    coordinate: Coordinate,
) -> PointResolution {
    match service.try_fetch(coordinate).await {
        Ok(lookup) => PointResolution {
            generation,
            index,
            scene: lookup.into_scene(),
            failed: false,
        },
        Err(error) => {
            warn!(%generation, index, %coordinate, %error, "route point fetch failed");
            PointResolution {
                generation,
                index,
                scene: None,
                failed: true,
            }
        }
    }
}
