//! Route playback controller.
//!
//! The controller drives a tick timer over the route points held by a
//! [`ProgressivePrefetcher`]. It starts playing once the initial batch has
//! resolved, keeps the lookahead window topped up as it advances, and drops
//! into [`PlaybackState::Buffering`] when the next point is not ready yet.
//!
//! Observers read state through a `watch` channel of [`PlaybackSnapshot`]s
//! and a `broadcast` channel of [`PlaybackEvent`]s.
//!
//! Lock order: the session mutex may be held while calling into the
//! prefetcher, never the reverse. Prefetch callbacks run without prefetcher
//! locks held.

mod state;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::{broadcast, watch};
use tokio::task::AbortHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, info, trace, warn};

pub use self::state::{
    ParsePlaybackSpeedError, PlaybackConfig, PlaybackError, PlaybackEvent, PlaybackSnapshot,
    PlaybackSpeed, PlaybackState,
};
use super::ports::PathProvider;
use super::{
    Coordinate, Generation, PanoramaService, PointCallback, PointResolution,
    ProgressivePrefetcher, RoutePoint, extract_route_points,
};

const EVENT_CAPACITY: usize = 64;

struct Session {
    generation: Generation,
    state: PlaybackState,
    current_index: usize,
    point_count: usize,
    speed: PlaybackSpeed,
    ticker: Option<AbortHandle>,
    tick_token: u64,
    init: Option<AbortHandle>,
}

impl Session {
    fn snapshot(&self) -> PlaybackSnapshot {
        PlaybackSnapshot {
            state: self.state.clone(),
            current_index: self.current_index,
            point_count: self.point_count,
            speed: self.speed,
        }
    }

    fn stop_ticker(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
    }

    fn cancel_tasks(&mut self) {
        self.stop_ticker();
        if let Some(init) = self.init.take() {
            init.abort();
        }
    }

    fn next_index(&self) -> Option<usize> {
        let next = self.current_index + 1;
        (next < self.point_count).then_some(next)
    }
}

struct ControllerInner {
    prefetcher: ProgressivePrefetcher,
    config: PlaybackConfig,
    session: Mutex<Session>,
    snapshots: watch::Sender<PlaybackSnapshot>,
    events: broadcast::Sender<PlaybackEvent>,
}

impl ControllerInner {
    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, session: &Session) {
        self.snapshots.send_replace(session.snapshot());
    }

    fn emit(&self, event: PlaybackEvent) {
        if let Err(unsent) = self.events.send(event) {
            trace!(event = ?unsent.0, "no playback event subscribers");
        }
    }

    fn transition(&self, session: &mut Session, to: PlaybackState) {
        if session.state == to {
            return;
        }
        let from = std::mem::replace(&mut session.state, to.clone());
        debug!(generation = %session.generation, %from, %to, "playback state changed");
        self.emit(PlaybackEvent::StateChanged { from, to });
        self.publish(session);
    }

    fn advance(self: &Arc<Self>, session: &mut Session, next: usize) {
        session.current_index = next;
        self.emit(PlaybackEvent::IndexAdvanced { index: next });
        self.publish(session);
        self.prefetcher.top_up(
            session.generation,
            next,
            self.config.prefetch_lookahead,
            &self.point_callback(),
        );
    }

    fn fail(&self, session: &mut Session, message: String) {
        session.cancel_tasks();
        warn!(generation = %session.generation, %message, "playback failed");
        self.transition(session, PlaybackState::Failed { message });
    }

    fn point_callback(self: &Arc<Self>) -> PointCallback {
        let weak = Arc::downgrade(self);
        Arc::new(move |resolution| {
            if let Some(inner) = weak.upgrade() {
                inner.on_point_resolved(resolution);
            }
        })
    }

    fn start_ticker(self: &Arc<Self>, session: &mut Session) {
        session.stop_ticker();
        session.tick_token = session.tick_token.wrapping_add(1);
        let token = session.tick_token;
        let generation = session.generation;
        let period = session.speed.interval();
        let weak = Arc::downgrade(self);

        let handle = tokio::spawn(async move {
            let mut ticks = interval_at(Instant::now() + period, period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticks.tick().await;
                let Some(inner) = weak.upgrade() else { break };
                if !inner.on_tick(generation, token) {
                    break;
                }
            }
        });
        session.ticker = Some(handle.abort_handle());
    }

    /// Handle one timer tick. Returns whether the ticker should keep running.
    fn on_tick(self: &Arc<Self>, generation: Generation, token: u64) -> bool {
        let mut session = self.session();
        if session.generation != generation || session.tick_token != token {
            return false;
        }

        let state = session.state.clone();
        match state {
            PlaybackState::Playing => {
                let Some(next) = session.next_index() else {
                    session.ticker = None;
                    info!(%generation, points = session.point_count, "playback completed");
                    self.transition(&mut session, PlaybackState::Completed);
                    return false;
                };
                if self.prefetcher.is_resolved(next) {
                    self.advance(&mut session, next);
                } else {
                    debug!(%generation, next, "next point unresolved; buffering");
                    self.transition(&mut session, PlaybackState::Buffering);
                    self.prefetcher.top_up(generation, next, 0, &self.point_callback());
                }
            }
            PlaybackState::Buffering => match session.next_index() {
                Some(next) if self.prefetcher.is_resolved(next) => {
                    self.transition(&mut session, PlaybackState::Playing);
                    self.advance(&mut session, next);
                }
                _ => {}
            },
            _ => {}
        }
        true
    }

    fn on_point_resolved(self: &Arc<Self>, resolution: PointResolution) {
        let mut session = self.session();
        if session.generation != resolution.generation {
            return;
        }
        self.emit(PlaybackEvent::PointResolved {
            index: resolution.index,
            has_scene: resolution.scene.is_some(),
            failed: resolution.failed,
        });

        let state = session.state.clone();
        match state {
            PlaybackState::Initializing {
                fetched_count,
                required_count,
            } => {
                self.transition(
                    &mut session,
                    PlaybackState::Initializing {
                        fetched_count: fetched_count + 1,
                        required_count,
                    },
                );
            }
            PlaybackState::Buffering if session.next_index() == Some(resolution.index) => {
                debug!(index = resolution.index, "buffered point resolved");
                self.transition(&mut session, PlaybackState::Playing);
                self.advance(&mut session, resolution.index);
                // The point resolved between ticks; give it a full interval.
                self.start_ticker(&mut session);
            }
            _ => {}
        }
    }

    fn finish_initializing(self: &Arc<Self>, generation: Generation, with_scene: usize) {
        let mut session = self.session();
        if session.generation != generation || !session.state.is_initializing() {
            return;
        }
        session.init = None;
        info!(
            %generation,
            with_scene,
            points = session.point_count,
            "initial prefetch complete; starting playback"
        );
        self.transition(&mut session, PlaybackState::Playing);
        self.start_ticker(&mut session);
        self.prefetcher.top_up(
            generation,
            session.current_index,
            self.config.prefetch_lookahead,
            &self.point_callback(),
        );
    }
}

impl Drop for ControllerInner {
    fn drop(&mut self) {
        self.session
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel_tasks();
    }
}

/// Drives route playback over prefetched panoramas.
///
/// Operations that start background work (`load`, `play`, `resume`,
/// `set_speed`) must be called from within a tokio runtime.
pub struct PlaybackController {
    inner: Arc<ControllerInner>,
}

impl PlaybackController {
    /// Build an idle controller fetching through `service`.
    pub fn new(service: Arc<PanoramaService>, config: PlaybackConfig) -> Self {
        let session = Session {
            generation: Generation::default(),
            state: PlaybackState::Idle,
            current_index: 0,
            point_count: 0,
            speed: PlaybackSpeed::default(),
            ticker: None,
            tick_token: 0,
            init: None,
        };
        let (snapshots, _) = watch::channel(session.snapshot());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(ControllerInner {
                prefetcher: ProgressivePrefetcher::new(service),
                config,
                session: Mutex::new(session),
                snapshots,
                events,
            }),
        }
    }

    /// Sample `path` and start a new session at `speed`.
    ///
    /// Any previous session is cancelled. The controller moves to
    /// `Initializing` and starts playing once the initial batch resolves.
    ///
    /// # Errors
    ///
    /// Returns [`PlaybackError::RouteRejected`] when the path is empty or
    /// invalid; the controller is left in `Failed`.
    pub fn load(&self, path: &[Coordinate], speed: PlaybackSpeed) -> Result<(), PlaybackError> {
        let inner = &self.inner;
        let mut session = inner.session();
        session.cancel_tasks();
        session.speed = speed;
        session.current_index = 0;
        inner.transition(&mut session, PlaybackState::Idle);

        let points = match extract_route_points(path, inner.config.point_interval_meters) {
            Ok(points) if points.is_empty() => Err("route has no points".to_owned()),
            Ok(points) => Ok(points),
            Err(error) => Err(error.to_string()),
        };
        let points: Vec<RoutePoint> = match points {
            Ok(points) => points,
            Err(message) => {
                session.generation = inner.prefetcher.clear();
                session.point_count = 0;
                inner.fail(&mut session, message.clone());
                return Err(PlaybackError::RouteRejected { message });
            }
        };

        let point_count = points.len();
        let required_count = inner.config.initial_fetch_count.min(point_count);
        let generation = inner.prefetcher.load(points);
        session.generation = generation;
        session.point_count = point_count;
        info!(%generation, points = point_count, %speed, "route loaded");
        inner.transition(
            &mut session,
            PlaybackState::Initializing {
                fetched_count: 0,
                required_count,
            },
        );

        let prefetcher = inner.prefetcher.clone();
        let callback = inner.point_callback();
        let weak: Weak<ControllerInner> = Arc::downgrade(inner);
        let handle = tokio::spawn(async move {
            let with_scene = prefetcher
                .prefetch_initial(generation, required_count, &callback)
                .await;
            if let Some(inner) = weak.upgrade() {
                inner.finish_initializing(generation, with_scene);
            }
        });
        session.init = Some(handle.abort_handle());
        Ok(())
    }

    /// Load the path offered by `provider` and start a session.
    ///
    /// # Errors
    ///
    /// Returns [`PlaybackError::RouteRejected`] when the provider fails or the
    /// path is unusable; the controller is left in `Failed`.
    pub async fn load_from(
        &self,
        provider: &dyn PathProvider,
        speed: PlaybackSpeed,
    ) -> Result<(), PlaybackError> {
        match provider.load_path().await {
            Ok(path) => self.load(&path, speed),
            Err(error) => {
                let message = error.to_string();
                let inner = &self.inner;
                let mut session = inner.session();
                session.generation = inner.prefetcher.clear();
                session.point_count = 0;
                session.current_index = 0;
                inner.fail(&mut session, message.clone());
                Err(PlaybackError::RouteRejected { message })
            }
        }
    }

    /// Start or restart playback.
    ///
    /// Resumes from `Paused`, rewinds to the first point from `Completed`,
    /// and does nothing while already playing.
    ///
    /// # Errors
    ///
    /// Returns [`PlaybackError::InvalidTransition`] from any other state.
    pub fn play(&self) -> Result<(), PlaybackError> {
        let inner = &self.inner;
        let mut session = inner.session();
        let state = session.state.clone();
        match state {
            PlaybackState::Playing => Ok(()),
            PlaybackState::Paused => {
                inner.transition(&mut session, PlaybackState::Playing);
                inner.start_ticker(&mut session);
                Ok(())
            }
            PlaybackState::Completed => {
                session.current_index = 0;
                inner.emit(PlaybackEvent::IndexAdvanced { index: 0 });
                inner.transition(&mut session, PlaybackState::Playing);
                inner.start_ticker(&mut session);
                inner.prefetcher.top_up(
                    session.generation,
                    0,
                    inner.config.prefetch_lookahead,
                    &inner.point_callback(),
                );
                Ok(())
            }
            state => Err(PlaybackError::InvalidTransition {
                action: "play",
                state,
            }),
        }
    }

    /// Suspend playback, freezing the current position.
    ///
    /// # Errors
    ///
    /// Returns [`PlaybackError::InvalidTransition`] unless playing, buffering,
    /// or already paused.
    pub fn pause(&self) -> Result<(), PlaybackError> {
        let inner = &self.inner;
        let mut session = inner.session();
        let state = session.state.clone();
        match state {
            PlaybackState::Paused => Ok(()),
            PlaybackState::Playing | PlaybackState::Buffering => {
                session.stop_ticker();
                inner.transition(&mut session, PlaybackState::Paused);
                Ok(())
            }
            state => Err(PlaybackError::InvalidTransition {
                action: "pause",
                state,
            }),
        }
    }

    /// Continue a paused session.
    ///
    /// # Errors
    ///
    /// Returns [`PlaybackError::InvalidTransition`] unless paused or already
    /// playing.
    pub fn resume(&self) -> Result<(), PlaybackError> {
        let inner = &self.inner;
        let mut session = inner.session();
        let state = session.state.clone();
        match state {
            PlaybackState::Playing => Ok(()),
            PlaybackState::Paused => {
                inner.transition(&mut session, PlaybackState::Playing);
                inner.start_ticker(&mut session);
                Ok(())
            }
            state => Err(PlaybackError::InvalidTransition {
                action: "resume",
                state,
            }),
        }
    }

    /// End the session, discarding the route and any outstanding fetches.
    pub fn stop(&self) {
        let inner = &self.inner;
        let mut session = inner.session();
        session.cancel_tasks();
        session.generation = inner.prefetcher.clear();
        session.current_index = 0;
        session.point_count = 0;
        info!(generation = %session.generation, "playback stopped");
        inner.transition(&mut session, PlaybackState::Idle);
        inner.publish(&session);
    }

    /// Change the tick rate. A running timer restarts at the new rate.
    pub fn set_speed(&self, speed: PlaybackSpeed) {
        let inner = &self.inner;
        let mut session = inner.session();
        if session.speed == speed {
            return;
        }
        session.speed = speed;
        if matches!(
            session.state,
            PlaybackState::Playing | PlaybackState::Buffering
        ) {
            inner.start_ticker(&mut session);
        }
        debug!(%speed, "playback speed changed");
        inner.publish(&session);
    }

    /// Receiver of the latest [`PlaybackSnapshot`].
    pub fn subscribe(&self) -> watch::Receiver<PlaybackSnapshot> {
        self.inner.snapshots.subscribe()
    }

    /// Receiver of [`PlaybackEvent`]s emitted from now on.
    pub fn events(&self) -> broadcast::Receiver<PlaybackEvent> {
        self.inner.events.subscribe()
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> PlaybackSnapshot {
        self.inner.session().snapshot()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> PlaybackState {
        self.inner.session().state.clone()
    }

    /// The point at the current position, if a route is loaded.
    pub fn current_point(&self) -> Option<RoutePoint> {
        let session = self.inner.session();
        if session.point_count == 0 {
            return None;
        }
        self.inner.prefetcher.point(session.current_index)
    }

    /// The point at `index`, if it exists.
    pub fn point(&self, index: usize) -> Option<RoutePoint> {
        self.inner.prefetcher.point(index)
    }

    /// Every point of the loaded route.
    pub fn points(&self) -> Vec<RoutePoint> {
        self.inner.prefetcher.points()
    }
}
