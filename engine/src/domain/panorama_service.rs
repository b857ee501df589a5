//! Cache-first, admission-controlled panorama lookups.
//!
//! Every fetch goes through the same pipeline: the panorama cache, a
//! concurrency permit, the shared rate limiter, then the source under a
//! timeout. Both "scene found" and "no coverage" outcomes are cached; errors
//! are not, so a later request retries the provider.

use std::sync::Arc;
use std::time::Duration;

use mockable::Clock;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use super::ports::{
    CoordinateCacheKey, DEFAULT_KEY_PRECISION, PanoramaScene, PanoramaSource, PanoramaSourceError,
};
use super::{
    BoundedTtlCache, CacheConfiguration, CacheStatistics, Coordinate, RateLimiter,
    RateLimiterConfig, Sleeper, TokioSleeper,
};

/// Cached outcome of a panorama lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum PanoramaLookup {
    /// The provider has imagery for the coordinate.
    Available(PanoramaScene),
    /// The provider reported no coverage.
    Unavailable,
}

impl PanoramaLookup {
    /// Consume the lookup, returning the scene if one was found.
    pub fn into_scene(self) -> Option<PanoramaScene> {
        match self {
            Self::Available(scene) => Some(scene),
            Self::Unavailable => None,
        }
    }

    /// Whether imagery exists for the coordinate.
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available(_))
    }
}

impl From<Option<PanoramaScene>> for PanoramaLookup {
    fn from(scene: Option<PanoramaScene>) -> Self {
        scene.map_or(Self::Unavailable, Self::Available)
    }
}

/// Tuning for [`PanoramaService`].
#[derive(Debug, Clone, PartialEq)]
pub struct PanoramaServiceConfig {
    /// Panorama cache sizing and expiry.
    pub cache: CacheConfiguration,
    /// Provider request budget.
    pub rate_limit: RateLimiterConfig,
    /// Upper bound on concurrent provider calls.
    pub max_concurrent_fetches: usize,
    /// Per-call provider timeout.
    pub fetch_timeout: Duration,
    /// Decimal digits kept in cache keys.
    pub key_precision: u8,
}

impl Default for PanoramaServiceConfig {
    fn default() -> Self {
        Self {
            cache: CacheConfiguration::panorama(),
            rate_limit: RateLimiterConfig::default(),
            max_concurrent_fetches: 4,
            fetch_timeout: Duration::from_secs(10),
            key_precision: DEFAULT_KEY_PRECISION,
        }
    }
}

/// Failures of a single uncached lookup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PanoramaFetchError {
    /// The source returned an error.
    #[error(transparent)]
    Source(#[from] PanoramaSourceError),
    /// The source did not answer within the configured timeout.
    #[error("panorama lookup timed out after {after:?}")]
    TimedOut {
        /// Timeout that elapsed.
        after: Duration,
    },
    /// The service is shutting down and no longer admits fetches.
    #[error("panorama service is closed")]
    Closed,
}

/// Shared panorama lookup pipeline.
pub struct PanoramaService {
    source: Arc<dyn PanoramaSource>,
    cache: BoundedTtlCache<CoordinateCacheKey, PanoramaLookup>,
    limiter: RateLimiter,
    permits: Semaphore,
    sleeper: Arc<dyn Sleeper>,
    fetch_timeout: Duration,
    key_precision: u8,
}

impl PanoramaService {
    /// Build a service that waits on the tokio timer when rate limited.
    pub fn new(
        source: Arc<dyn PanoramaSource>,
        clock: Arc<dyn Clock>,
        config: PanoramaServiceConfig,
    ) -> Self {
        Self::with_sleeper(source, clock, Arc::new(TokioSleeper), config)
    }

    /// Build a service with an explicit sleeper for rate-limit deferral.
    pub fn with_sleeper(
        source: Arc<dyn PanoramaSource>,
        clock: Arc<dyn Clock>,
        sleeper: Arc<dyn Sleeper>,
        config: PanoramaServiceConfig,
    ) -> Self {
        Self {
            source,
            cache: BoundedTtlCache::new(config.cache, Arc::clone(&clock)),
            limiter: RateLimiter::new(config.rate_limit, clock),
            permits: Semaphore::new(config.max_concurrent_fetches.max(1)),
            sleeper,
            fetch_timeout: config.fetch_timeout,
            key_precision: config.key_precision,
        }
    }

    /// Resolve `coordinate`, absorbing failures into `None`.
    pub async fn fetch(&self, coordinate: Coordinate) -> Option<PanoramaScene> {
        match self.try_fetch(coordinate).await {
            Ok(lookup) => lookup.into_scene(),
            Err(error) => {
                warn!(%coordinate, %error, "panorama lookup failed");
                None
            }
        }
    }

    /// Resolve `coordinate`, surfacing provider failures.
    ///
    /// # Errors
    ///
    /// Returns [`PanoramaFetchError`] when the source fails, times out, or the
    /// service has been closed. Failed lookups are not cached.
    pub async fn try_fetch(
        &self,
        coordinate: Coordinate,
    ) -> Result<PanoramaLookup, PanoramaFetchError> {
        let key = CoordinateCacheKey::with_precision(coordinate, self.key_precision);
        if let Some(hit) = self.cache.get(&key) {
            debug!(%key, available = hit.is_available(), "panorama cache hit");
            return Ok(hit);
        }

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| PanoramaFetchError::Closed)?;

        // A concurrent fetch for the same key may have landed while queued.
        if let Some(hit) = self.cache.get(&key) {
            return Ok(hit);
        }

        self.limiter.acquire(self.sleeper.as_ref()).await;

        let scene = tokio::time::timeout(self.fetch_timeout, self.source.fetch_scene(coordinate))
            .await
            .map_err(|_| PanoramaFetchError::TimedOut {
                after: self.fetch_timeout,
            })??;

        let lookup = PanoramaLookup::from(scene);
        debug!(%key, available = lookup.is_available(), "panorama fetched");
        self.cache.put(key, lookup.clone());
        Ok(lookup)
    }

    /// Stop admitting new fetches. Calls already holding a permit finish.
    pub fn close(&self) {
        self.permits.close();
    }

    /// Drop every cached lookup.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Panorama cache occupancy.
    pub fn cache_statistics(&self) -> CacheStatistics {
        self.cache.statistics()
    }

    /// Provider requests still admissible in the current window.
    pub fn remaining_requests(&self) -> u32 {
        self.limiter.remaining_requests()
    }
}
