//! Outbound adapters implementing domain ports.
//!
//! Adapters translate between domain types and provider representations and
//! hold no playback logic:
//!
//! - **streetview**: Street View metadata lookups for [`PanoramaSource`].
//! - **nominatim**: reverse geocoding for [`ReverseGeocoder`].
//! - **path_file**: JSON and GeoJSON path documents for [`PathProvider`].
//!
//! [`PanoramaSource`]: crate::domain::ports::PanoramaSource
//! [`ReverseGeocoder`]: crate::domain::ports::ReverseGeocoder
//! [`PathProvider`]: crate::domain::ports::PathProvider

pub mod nominatim;
pub mod path_file;
pub mod streetview;

/// Collapse a response body into a short single-line preview for errors.
pub(crate) fn body_preview(body: &[u8]) -> String {
    const PREVIEW_CHAR_LIMIT: usize = 160;

    let compact = String::from_utf8_lossy(body)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    let preview = compact.chars().take(PREVIEW_CHAR_LIMIT).collect::<String>();
    if compact.chars().count() > PREVIEW_CHAR_LIMIT {
        format!("{preview}...")
    } else {
        preview
    }
}

/// Format an HTTP status and body preview as an error message.
pub(crate) fn status_message(status: reqwest::StatusCode, body: &[u8]) -> String {
    let preview = body_preview(body);
    if preview.is_empty() {
        format!("status {}", status.as_u16())
    } else {
        format!("status {}: {preview}", status.as_u16())
    }
}
