//! Nominatim outbound adapters.
//!
//! This module provides a thin HTTP implementation of the `ReverseGeocoder`
//! port against a Nominatim `/reverse` endpoint.

mod http_geocoder;

pub use http_geocoder::{DEFAULT_NOMINATIM_ENDPOINT, NominatimHttpGeocoder};
