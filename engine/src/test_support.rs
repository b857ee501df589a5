//! Test utilities for the engine crate.
//!
//! Shared by unit tests (in `src/`) and integration tests (in `tests/`). Only
//! compiled for tests or with the `test-support` feature.

use std::collections::{HashMap, HashSet};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use cap_std::{ambient_authority, fs::Dir};
use chrono::{DateTime, Local, TimeDelta, TimeZone, Utc};
use mockable::Clock;
use tempfile::TempDir;
use tokio::sync::Notify;

use crate::domain::ports::{
    CoordinateCacheKey, PanoramaScene, PanoramaSource, PanoramaSourceError,
};
use crate::domain::{Coordinate, EARTH_RADIUS_METERS, Sleeper};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A fixed instant used as the starting point for test clocks.
pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0)
        .single()
        .unwrap_or(DateTime::UNIX_EPOCH)
}

/// Manually advanced clock.
#[derive(Debug)]
pub struct MutableClock(Mutex<DateTime<Utc>>);

impl MutableClock {
    /// Start the clock at `now`.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self(Mutex::new(now))
    }

    /// Move the clock forward by `delta`.
    pub fn advance(&self, delta: Duration) {
        let delta = match TimeDelta::from_std(delta) {
            Ok(delta) => delta,
            Err(error) => {
                panic!("failed to convert Duration to TimeDelta: {error}; delta={delta:?}")
            }
        };
        *lock(&self.0) += delta;
    }
}

impl Clock for MutableClock {
    fn local(&self) -> DateTime<Local> {
        self.utc().with_timezone(&Local)
    }

    fn utc(&self) -> DateTime<Utc> {
        *lock(&self.0)
    }
}

/// Sleeper that returns immediately.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImmediateSleeper;

#[async_trait]
impl Sleeper for ImmediateSleeper {
    async fn sleep(&self, _duration: Duration) {}
}

/// Sleeper that advances a [`MutableClock`] instead of waiting, recording
/// each requested duration.
pub struct ClockAdvancingSleeper {
    clock: Arc<MutableClock>,
    recorded: Mutex<Vec<Duration>>,
}

impl ClockAdvancingSleeper {
    /// Drive `clock` forward on every sleep.
    pub fn new(clock: Arc<MutableClock>) -> Self {
        Self {
            clock,
            recorded: Mutex::new(Vec::new()),
        }
    }

    /// Durations passed to [`Sleeper::sleep`], in call order.
    pub fn recorded(&self) -> Vec<Duration> {
        lock(&self.recorded).clone()
    }
}

#[async_trait]
impl Sleeper for ClockAdvancingSleeper {
    async fn sleep(&self, duration: Duration) {
        lock(&self.recorded).push(duration);
        self.clock.advance(duration);
    }
}

/// Straight northbound path of `vertices` points spaced `spacing_meters`
/// apart, starting in central Edinburgh.
pub fn straight_path(vertices: usize, spacing_meters: f64) -> Vec<Coordinate> {
    let degrees_per_meter = 180.0 / (std::f64::consts::PI * EARTH_RADIUS_METERS);
    (0..vertices)
        .map(|step| {
            let offset = f64::from(u32::try_from(step).unwrap_or(u32::MAX)) * spacing_meters;
            Coordinate::new(55.9500 + offset * degrees_per_meter, -3.1900)
        })
        .collect()
}

#[derive(Default)]
struct Script {
    gates: HashMap<CoordinateCacheKey, Arc<Notify>>,
    failing: HashSet<CoordinateCacheKey>,
    unavailable: HashSet<CoordinateCacheKey>,
}

/// Panorama source whose responses can be held back, failed, or reported as
/// missing per coordinate.
///
/// Coordinates without a script entry resolve immediately with a scene.
/// Gated coordinates wait until [`ScriptedPanoramaSource::release`] is called.
#[derive(Default)]
pub struct ScriptedPanoramaSource {
    script: Mutex<Script>,
    calls: AtomicUsize,
}

impl ScriptedPanoramaSource {
    /// Source that resolves every coordinate immediately.
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold fetches for `coordinate` until released.
    pub fn gate(&self, coordinate: Coordinate) {
        lock(&self.script)
            .gates
            .entry(CoordinateCacheKey::new(coordinate))
            .or_insert_with(|| Arc::new(Notify::new()));
    }

    /// Let one held (or future) fetch for `coordinate` complete.
    pub fn release(&self, coordinate: Coordinate) {
        let gate = lock(&self.script)
            .gates
            .get(&CoordinateCacheKey::new(coordinate))
            .cloned();
        if let Some(gate) = gate {
            gate.notify_one();
        }
    }

    /// Make fetches for `coordinate` fail with a transport error.
    pub fn fail_at(&self, coordinate: Coordinate) {
        lock(&self.script)
            .failing
            .insert(CoordinateCacheKey::new(coordinate));
    }

    /// Make fetches for `coordinate` report no coverage.
    pub fn unavailable_at(&self, coordinate: Coordinate) {
        lock(&self.script)
            .unavailable
            .insert(CoordinateCacheKey::new(coordinate));
    }

    /// Number of fetches started.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PanoramaSource for ScriptedPanoramaSource {
    async fn fetch_scene(
        &self,
        coordinate: Coordinate,
    ) -> Result<Option<PanoramaScene>, PanoramaSourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let key = CoordinateCacheKey::new(coordinate);
        let gate = lock(&self.script).gates.get(&key).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let script = lock(&self.script);
        if script.failing.contains(&key) {
            return Err(PanoramaSourceError::transport(format!(
                "scripted failure at {key}"
            )));
        }
        if script.unavailable.contains(&key) {
            return Ok(None);
        }
        Ok(Some(PanoramaScene {
            pano_id: format!("scripted:{key}"),
            location: key.coordinate(),
            date: Some("2024-06".to_owned()),
            copyright: None,
        }))
    }
}

/// Write `contents` to `file_name` inside a fresh temporary directory.
///
/// The directory is removed when the returned [`TempDir`] is dropped.
pub fn write_temp_file(file_name: &str, contents: &str) -> io::Result<(TempDir, PathBuf)> {
    let dir = TempDir::new()?;
    let handle = Dir::open_ambient_dir(dir.path(), ambient_authority())?;
    handle.write(file_name, contents)?;
    let path = dir.path().join(file_name);
    Ok((dir, path))
}
