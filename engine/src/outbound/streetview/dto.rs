//! DTOs for decoding Street View metadata responses.

use serde::Deserialize;

use crate::domain::Coordinate;
use crate::domain::ports::{PanoramaScene, PanoramaSourceError};

#[derive(Debug, Deserialize)]
pub(super) struct MetadataDto {
    pub(super) status: String,
    pub(super) pano_id: Option<String>,
    pub(super) location: Option<LatLngDto>,
    pub(super) date: Option<String>,
    pub(super) copyright: Option<String>,
    pub(super) error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct LatLngDto {
    pub(super) lat: f64,
    pub(super) lng: f64,
}

impl MetadataDto {
    /// Map the provider status onto the port contract: coverage becomes a
    /// scene, "nothing here" becomes `None`, everything else an error.
    pub(super) fn into_scene(self) -> Result<Option<PanoramaScene>, PanoramaSourceError> {
        let detail = || {
            self.error_message
                .as_deref()
                .map_or_else(|| self.status.clone(), |m| format!("{}: {m}", self.status))
        };
        match self.status.as_str() {
            "OK" => {}
            "ZERO_RESULTS" | "NOT_FOUND" => return Ok(None),
            "OVER_QUERY_LIMIT" => return Err(PanoramaSourceError::rate_limited(detail())),
            "REQUEST_DENIED" | "INVALID_REQUEST" => {
                return Err(PanoramaSourceError::rejected(detail()));
            }
            _ => return Err(PanoramaSourceError::transport(detail())),
        }

        let (Some(pano_id), Some(location)) = (self.pano_id, self.location) else {
            return Err(PanoramaSourceError::decode(
                "OK metadata response missing pano_id or location",
            ));
        };
        let location = Coordinate::new(location.lat, location.lng);
        if !location.is_valid() {
            return Err(PanoramaSourceError::decode(format!(
                "metadata location {location} is outside WGS84 bounds"
            )));
        }
        Ok(Some(PanoramaScene {
            pano_id,
            location,
            date: self.date,
            copyright: self.copyright,
        }))
    }
}
