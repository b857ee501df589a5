//! Route-following panorama prefetch and playback engine.
//!
//! The engine samples a travel path into evenly spaced route points, prefetches
//! street-level panorama metadata for those points through a rate-limited and
//! cached outbound source, and drives a playback state machine that advances a
//! virtual camera along the route at a configurable speed.
//!
//! The crate follows a hexagonal layout:
//!
//! - [`domain`] owns route sampling, caching, rate limiting, prefetching, and
//!   the playback controller, and declares ports for its collaborators.
//! - [`outbound`] holds adapters for those ports (Street View metadata,
//!   Nominatim reverse geocoding, path files on disk).
//! - [`settings`] loads layered configuration with `ortho_config`.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use mockable::DefaultClock;
//! use route_panorama::domain::ports::FixturePanoramaSource;
//! use route_panorama::domain::{
//!     Coordinate, PanoramaService, PanoramaServiceConfig, PlaybackConfig, PlaybackController,
//!     PlaybackSpeed,
//! };
//!
//! # async fn demo() {
//! let service = PanoramaService::new(
//!     Arc::new(FixturePanoramaSource),
//!     Arc::new(DefaultClock),
//!     PanoramaServiceConfig::default(),
//! );
//! let controller = PlaybackController::new(Arc::new(service), PlaybackConfig::default());
//! let path = [
//!     Coordinate::new(55.9533, -3.1883),
//!     Coordinate::new(55.9540, -3.1890),
//! ];
//! controller.load(&path, PlaybackSpeed::Fast).expect("valid route");
//! let mut snapshots = controller.subscribe();
//! let _ = snapshots.wait_for(|snapshot| snapshot.state.is_playing()).await;
//! # }
//! ```

pub mod domain;
pub mod outbound;
pub mod settings;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
