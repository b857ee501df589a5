//! Domain primitives, services, and the playback state machine.
//!
//! Purpose: keep route sampling, panorama caching, admission control,
//! prefetching, and playback free of transport concerns. Outbound adapters
//! implement the traits in [`ports`]; everything else in this module is
//! adapter agnostic.
//!
//! Public surface:
//! - [`Coordinate`] and [`extract_route_points`] for route sampling.
//! - [`BoundedTtlCache`] and [`RateLimiter`] for bounded shared state.
//! - [`PanoramaService`] and [`AddressLookupService`] for cached lookups.
//! - [`ProgressivePrefetcher`] and [`PlaybackController`] for playback.

mod address_lookup;
mod coordinate;
mod panorama_service;
pub mod playback;
pub mod ports;
mod prefetcher;
mod rate_limiter;
mod route_points;
mod runtime;
mod ttl_cache;

pub use self::address_lookup::{AddressLookupConfig, AddressLookupService};
pub use self::coordinate::{Coordinate, EARTH_RADIUS_METERS};
pub use self::panorama_service::{
    PanoramaFetchError, PanoramaLookup, PanoramaService, PanoramaServiceConfig,
};
pub use self::playback::{
    PlaybackConfig, PlaybackController, PlaybackError, PlaybackEvent, PlaybackSnapshot,
    PlaybackSpeed, PlaybackState,
};
pub use self::prefetcher::{Generation, PointCallback, PointResolution, ProgressivePrefetcher};
pub use self::rate_limiter::{RateLimiter, RateLimiterConfig};
pub use self::route_points::{
    DEFAULT_POINT_INTERVAL_METERS, RouteExtractionError, RoutePoint, extract_route_points,
};
pub use self::runtime::{Sleeper, TokioSleeper};
pub use self::ttl_cache::{BoundedTtlCache, CacheConfiguration, CacheStatistics};
