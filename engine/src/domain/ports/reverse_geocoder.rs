//! Driven port for turning a coordinate into a human-readable address.

use async_trait::async_trait;

use super::define_port_error;
use crate::domain::Coordinate;

define_port_error! {
    /// Errors surfaced by reverse geocoding adapters.
    pub enum ReverseGeocoderError {
        /// Network transport failed before receiving a response.
        Transport { message: String } => "reverse geocoder transport failed: {message}",
        /// The geocoder throttled the request.
        RateLimited { message: String } => "reverse geocoder rate limited request: {message}",
        /// The geocoder response could not be decoded.
        Decode { message: String } => "reverse geocoder response decode failed: {message}",
    }
}

/// Port for reverse geocoding lookups.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReverseGeocoder: Send + Sync {
    /// Resolve a display address for `coordinate`; `Ok(None)` when nothing is
    /// known about the location.
    async fn reverse(&self, coordinate: Coordinate)
    -> Result<Option<String>, ReverseGeocoderError>;
}

/// Fixture implementation that formats the coordinate as its own address.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixtureReverseGeocoder;

#[async_trait]
impl ReverseGeocoder for FixtureReverseGeocoder {
    async fn reverse(
        &self,
        coordinate: Coordinate,
    ) -> Result<Option<String>, ReverseGeocoderError> {
        Ok(Some(format!("Near {coordinate}")))
    }
}
