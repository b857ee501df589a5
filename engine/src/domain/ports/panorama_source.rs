//! Driven port for resolving street-level panorama coverage at a coordinate.
//!
//! The domain owns the scene shape so prefetching and caching stay adapter
//! agnostic. Adapters report "no coverage here" as `Ok(None)` and reserve
//! errors for transport or provider failures.

use async_trait::async_trait;

use super::define_port_error;
use crate::domain::Coordinate;

/// Street-level panorama metadata for one location.
#[derive(Debug, Clone, PartialEq)]
pub struct PanoramaScene {
    /// Provider-issued panorama identifier.
    pub pano_id: String,
    /// Location the provider snapped the request to.
    pub location: Coordinate,
    /// Capture date as reported by the provider (for example `2019-05`).
    pub date: Option<String>,
    /// Attribution text that must accompany the imagery.
    pub copyright: Option<String>,
}

define_port_error! {
    /// Errors surfaced while resolving panorama coverage.
    pub enum PanoramaSourceError {
        /// Network transport failed before receiving a response.
        Transport { message: String } =>
            "panorama transport failed: {message}",
        /// The provider call exceeded its timeout.
        Timeout { message: String } =>
            "panorama request timed out: {message}",
        /// The provider throttled the request.
        RateLimited { message: String } =>
            "panorama provider rate limited request: {message}",
        /// The provider response could not be decoded.
        Decode { message: String } =>
            "panorama response decode failed: {message}",
        /// The provider refused the request (bad key, invalid parameters).
        Rejected { message: String } =>
            "panorama request rejected: {message}",
    }
}

/// Port for looking up panorama coverage.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PanoramaSource: Send + Sync {
    /// Resolve the panorama nearest to `coordinate`, if any.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use route_panorama::domain::Coordinate;
    /// use route_panorama::domain::ports::{FixturePanoramaSource, PanoramaSource};
    ///
    /// # async fn demo() -> Result<(), route_panorama::domain::ports::PanoramaSourceError> {
    /// let scene = FixturePanoramaSource
    ///     .fetch_scene(Coordinate::new(55.9533, -3.1883))
    ///     .await?;
    /// assert_eq!(
    ///     scene.map(|scene| scene.pano_id).as_deref(),
    ///     Some("fixture:55.95330,-3.18830")
    /// );
    /// # Ok(())
    /// # }
    /// ```
    async fn fetch_scene(
        &self,
        coordinate: Coordinate,
    ) -> Result<Option<PanoramaScene>, PanoramaSourceError>;
}

/// Fixture implementation that reports coverage everywhere.
///
/// Scene identifiers are derived from the rounded coordinate so repeated
/// lookups are stable.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixturePanoramaSource;

#[async_trait]
impl PanoramaSource for FixturePanoramaSource {
    async fn fetch_scene(
        &self,
        coordinate: Coordinate,
    ) -> Result<Option<PanoramaScene>, PanoramaSourceError> {
        let key = super::CoordinateCacheKey::new(coordinate);
        Ok(Some(PanoramaScene {
            pano_id: format!("fixture:{key}"),
            location: key.coordinate(),
            date: None,
            copyright: None,
        }))
    }
}
