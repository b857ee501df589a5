//! Driven port supplying the travel path a playback session follows.
//!
//! Route calculation itself happens elsewhere; the engine only consumes the
//! resulting ordered coordinates.

use async_trait::async_trait;

use super::define_port_error;
use crate::domain::Coordinate;

define_port_error! {
    /// Errors surfaced while obtaining a travel path.
    pub enum PathProviderError {
        /// The path could not be read from its backing store.
        Io { message: String } => "path could not be read: {message}",
        /// The path document was malformed.
        Parse { message: String } => "path document is invalid: {message}",
        /// The provider has no path to offer.
        NoPath => "no travel path is available",
    }
}

/// Port for loading an ordered travel path.
#[async_trait]
pub trait PathProvider: Send + Sync {
    /// Load the path as ordered coordinates from start to destination.
    async fn load_path(&self) -> Result<Vec<Coordinate>, PathProviderError>;
}

/// Provider that serves a path held in memory.
///
/// # Examples
/// ```rust
/// use route_panorama::domain::Coordinate;
/// use route_panorama::domain::ports::{PathProvider, StaticPathProvider};
///
/// # async fn demo() -> Result<(), route_panorama::domain::ports::PathProviderError> {
/// let provider = StaticPathProvider::new(vec![Coordinate::new(1.0, 2.0)]);
/// assert_eq!(provider.load_path().await?.len(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StaticPathProvider {
    path: Vec<Coordinate>,
}

impl StaticPathProvider {
    /// Wrap an in-memory path.
    pub fn new(path: Vec<Coordinate>) -> Self {
        Self { path }
    }
}

#[async_trait]
impl PathProvider for StaticPathProvider {
    async fn load_path(&self) -> Result<Vec<Coordinate>, PathProviderError> {
        if self.path.is_empty() {
            return Err(PathProviderError::no_path());
        }
        Ok(self.path.clone())
    }
}
