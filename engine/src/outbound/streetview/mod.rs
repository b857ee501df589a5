//! Street View outbound adapters.
//!
//! This module provides a thin HTTP implementation of the `PanoramaSource`
//! port over the Street View Static API metadata endpoint, which reports
//! coverage without consuming image quota.

mod dto;
mod http_source;

pub use http_source::{DEFAULT_STREET_VIEW_ENDPOINT, StreetViewConfig, StreetViewHttpSource};
