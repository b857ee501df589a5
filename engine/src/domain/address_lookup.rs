//! Cache-first reverse geocoding for route points.

use std::sync::Arc;

use mockable::Clock;
use tracing::{debug, warn};

use super::ports::{CoordinateCacheKey, DEFAULT_KEY_PRECISION, ReverseGeocoder};
use super::{
    BoundedTtlCache, CacheConfiguration, CacheStatistics, Coordinate, RateLimiter,
    RateLimiterConfig, Sleeper, TokioSleeper,
};

/// Tuning for [`AddressLookupService`].
#[derive(Debug, Clone, PartialEq)]
pub struct AddressLookupConfig {
    /// Address cache sizing and expiry.
    pub cache: CacheConfiguration,
    /// Optional request budget; public Nominatim allows one request per
    /// second.
    pub rate_limit: Option<RateLimiterConfig>,
    /// Decimal digits kept in cache keys.
    pub key_precision: u8,
}

impl Default for AddressLookupConfig {
    fn default() -> Self {
        Self {
            cache: CacheConfiguration::address(),
            rate_limit: Some(RateLimiterConfig {
                max_requests: 1,
                window: std::time::Duration::from_secs(1),
            }),
            key_precision: DEFAULT_KEY_PRECISION,
        }
    }
}

/// Coordinate-to-address lookups backed by the address cache.
///
/// Both found and unknown addresses are cached. Geocoder failures are logged
/// and yield `None` without caching.
pub struct AddressLookupService {
    geocoder: Arc<dyn ReverseGeocoder>,
    cache: BoundedTtlCache<CoordinateCacheKey, Option<String>>,
    limiter: Option<RateLimiter>,
    sleeper: Arc<dyn Sleeper>,
    key_precision: u8,
}

impl AddressLookupService {
    /// Build a service over `geocoder`.
    pub fn new(
        geocoder: Arc<dyn ReverseGeocoder>,
        clock: Arc<dyn Clock>,
        config: AddressLookupConfig,
    ) -> Self {
        Self::with_sleeper(geocoder, clock, Arc::new(TokioSleeper), config)
    }

    /// Build a service with an explicit sleeper for rate-limit deferral.
    pub fn with_sleeper(
        geocoder: Arc<dyn ReverseGeocoder>,
        clock: Arc<dyn Clock>,
        sleeper: Arc<dyn Sleeper>,
        config: AddressLookupConfig,
    ) -> Self {
        Self {
            geocoder,
            cache: BoundedTtlCache::new(config.cache, Arc::clone(&clock)),
            limiter: config
                .rate_limit
                .map(|rate_limit| RateLimiter::new(rate_limit, clock)),
            sleeper,
            key_precision: config.key_precision,
        }
    }

    /// Display address for `coordinate`, if the geocoder knows one.
    pub async fn address_for(&self, coordinate: Coordinate) -> Option<String> {
        let key = CoordinateCacheKey::with_precision(coordinate, self.key_precision);
        if let Some(cached) = self.cache.get(&key) {
            debug!(%key, "address cache hit");
            return cached;
        }

        if let Some(limiter) = &self.limiter {
            limiter.acquire(self.sleeper.as_ref()).await;
        }

        match self.geocoder.reverse(coordinate).await {
            Ok(address) => {
                self.cache.put(key, address.clone());
                address
            }
            Err(error) => {
                warn!(%coordinate, %error, "reverse geocoding failed");
                None
            }
        }
    }

    /// Address cache occupancy.
    pub fn cache_statistics(&self) -> CacheStatistics {
        self.cache.statistics()
    }

    /// Drop every cached address.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::{MockReverseGeocoder, ReverseGeocoderError};
    use crate::test_support::{ClockAdvancingSleeper, MutableClock, fixed_now};
    use rstest::rstest;

    const HERE: Coordinate = Coordinate::new(51.5007, -0.1246);

    fn service_with(
        geocoder: MockReverseGeocoder,
        sleeper: Arc<dyn Sleeper>,
        clock: Arc<MutableClock>,
    ) -> AddressLookupService {
        AddressLookupService::with_sleeper(
            Arc::new(geocoder),
            clock,
            sleeper,
            AddressLookupConfig::default(),
        )
    }

    #[rstest]
    #[tokio::test]
    async fn addresses_are_cached_including_unknowns() {
        let mut geocoder = MockReverseGeocoder::new();
        geocoder
            .expect_reverse()
            .times(2)
            .returning(|coordinate| {
                Ok((coordinate.latitude > 0.0).then(|| "Westminster, London".to_owned()))
            });
        let clock = Arc::new(MutableClock::new(fixed_now()));
        let sleeper = Arc::new(ClockAdvancingSleeper::new(Arc::clone(&clock)));
        let service = service_with(geocoder, Arc::clone(&sleeper) as Arc<dyn Sleeper>, clock);

        for _ in 0..2 {
            assert_eq!(
                service.address_for(HERE).await.as_deref(),
                Some("Westminster, London")
            );
            assert_eq!(service.address_for(Coordinate::new(-10.0, 0.0)).await, None);
        }
        assert_eq!(service.cache_statistics().entry_count, 2);
        // Only the second uncached lookup waited for the window.
        assert_eq!(sleeper.recorded(), vec![std::time::Duration::from_secs(1)]);
    }

    #[rstest]
    #[tokio::test]
    async fn failures_are_not_cached() {
        let mut geocoder = MockReverseGeocoder::new();
        geocoder
            .expect_reverse()
            .times(2)
            .returning(|_| Err(ReverseGeocoderError::rate_limited("slow down")));
        let clock = Arc::new(MutableClock::new(fixed_now()));
        let sleeper = Arc::new(ClockAdvancingSleeper::new(Arc::clone(&clock)));
        let service = service_with(geocoder, Arc::clone(&sleeper) as Arc<dyn Sleeper>, clock);

        assert_eq!(service.address_for(HERE).await, None);
        assert_eq!(service.address_for(HERE).await, None);
        assert_eq!(service.cache_statistics().entry_count, 0);
        assert_eq!(sleeper.recorded().len(), 1);
    }

    #[rstest]
    #[tokio::test]
    async fn lookups_are_spaced_by_the_rate_limit() {
        let mut geocoder = MockReverseGeocoder::new();
        geocoder
            .expect_reverse()
            .times(2)
            .returning(|_| Ok(Some("somewhere".to_owned())));
        let clock = Arc::new(MutableClock::new(fixed_now()));
        let sleeper = Arc::new(ClockAdvancingSleeper::new(Arc::clone(&clock)));
        let service = service_with(geocoder, Arc::clone(&sleeper) as Arc<dyn Sleeper>, clock);

        service.address_for(HERE).await;
        service.address_for(Coordinate::new(0.0, 0.0)).await;

        assert_eq!(sleeper.recorded(), vec![std::time::Duration::from_secs(1)]);
    }
}
