//! Domain ports and supporting types for the playback engine.
//!
//! Each port is a trait that outbound adapters implement. Fixture
//! implementations live next to the traits so the engine can run without
//! network access.

mod macros;
pub(crate) use macros::define_port_error;

mod cache_key;
mod panorama_source;
mod path_provider;
mod reverse_geocoder;

pub use cache_key::{CoordinateCacheKey, DEFAULT_KEY_PRECISION};
#[cfg(test)]
pub use panorama_source::MockPanoramaSource;
pub use panorama_source::{
    FixturePanoramaSource, PanoramaScene, PanoramaSource, PanoramaSourceError,
};
pub use path_provider::{PathProvider, PathProviderError, StaticPathProvider};
#[cfg(test)]
pub use reverse_geocoder::MockReverseGeocoder;
pub use reverse_geocoder::{FixtureReverseGeocoder, ReverseGeocoder, ReverseGeocoderError};
