//! Reqwest-backed Street View metadata adapter.
//!
//! This adapter owns transport details only: URL construction, timeout and
//! HTTP error mapping, and JSON decoding into domain scenes.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use tracing::debug;

use super::dto::MetadataDto;
use crate::domain::Coordinate;
use crate::domain::ports::{PanoramaScene, PanoramaSource, PanoramaSourceError};
use crate::outbound::status_message;

/// Public Street View metadata endpoint.
pub const DEFAULT_STREET_VIEW_ENDPOINT: &str =
    "https://maps.googleapis.com/maps/api/streetview/metadata";

const DEFAULT_SEARCH_RADIUS_METERS: u32 = 50;

/// Request settings for [`StreetViewHttpSource`].
#[derive(Debug, Clone)]
pub struct StreetViewConfig {
    /// Metadata endpoint URL.
    pub endpoint: Url,
    /// API key appended to every request.
    pub api_key: String,
    /// Search radius around each coordinate, in metres.
    pub radius_meters: u32,
    /// Restrict results to outdoor panoramas.
    pub outdoor_only: bool,
}

impl StreetViewConfig {
    /// Settings for `endpoint` with the default radius and outdoor filter.
    pub fn new(endpoint: Url, api_key: impl Into<String>) -> Self {
        Self {
            endpoint,
            api_key: api_key.into(),
            radius_meters: DEFAULT_SEARCH_RADIUS_METERS,
            outdoor_only: true,
        }
    }
}

/// Panorama source adapter that queries the Street View metadata endpoint.
pub struct StreetViewHttpSource {
    client: Client,
    config: StreetViewConfig,
}

impl StreetViewHttpSource {
    /// Build an adapter using a reqwest client with an explicit request timeout.
    /// ```rust,ignore
    /// let source = StreetViewHttpSource::new(config, Duration::from_secs(10))?;
    /// ```
    /// # Errors
    ///
    /// Returns an error when the reqwest client cannot be constructed.
    pub fn new(config: StreetViewConfig, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, config })
    }

    fn metadata_url(&self, coordinate: Coordinate) -> Url {
        build_metadata_url(&self.config, coordinate)
    }
}

#[async_trait]
impl PanoramaSource for StreetViewHttpSource {
    async fn fetch_scene(
        &self,
        coordinate: Coordinate,
    ) -> Result<Option<PanoramaScene>, PanoramaSourceError> {
        let response = self
            .client
            .get(self.metadata_url(coordinate))
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        let body = response.bytes().await.map_err(map_transport_error)?;
        if !status.is_success() {
            return Err(map_status_error(status, body.as_ref()));
        }

        let scene = parse_metadata(body.as_ref())?;
        debug!(%coordinate, found = scene.is_some(), "street view metadata resolved");
        Ok(scene)
    }
}

fn build_metadata_url(config: &StreetViewConfig, coordinate: Coordinate) -> Url {
    let mut url = config.endpoint.clone();
    {
        let mut query = url.query_pairs_mut();
        query.append_pair(
            "location",
            &format!("{},{}", coordinate.latitude, coordinate.longitude),
        );
        query.append_pair("radius", &config.radius_meters.to_string());
        if config.outdoor_only {
            query.append_pair("source", "outdoor");
        }
        query.append_pair("key", &config.api_key);
    }
    url
}

fn parse_metadata(body: &[u8]) -> Result<Option<PanoramaScene>, PanoramaSourceError> {
    let decoded: MetadataDto = serde_json::from_slice(body).map_err(|error| {
        PanoramaSourceError::decode(format!("invalid metadata JSON payload: {error}"))
    })?;
    decoded.into_scene()
}

fn map_transport_error(error: reqwest::Error) -> PanoramaSourceError {
    // The key travels in the query string; keep it out of error text.
    let error = error.without_url();
    if error.is_timeout() {
        PanoramaSourceError::timeout(error.to_string())
    } else {
        PanoramaSourceError::transport(error.to_string())
    }
}

fn map_status_error(status: StatusCode, body: &[u8]) -> PanoramaSourceError {
    let message = status_message(status, body);
    match status {
        StatusCode::TOO_MANY_REQUESTS => PanoramaSourceError::rate_limited(message),
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
            PanoramaSourceError::timeout(message)
        }
        _ if status.is_client_error() => PanoramaSourceError::rejected(message),
        _ => PanoramaSourceError::transport(message),
    }
}

#[cfg(test)]
mod tests {
    //! Regression coverage for non-network metadata helpers.

    use super::*;
    use rstest::rstest;

    fn config() -> StreetViewConfig {
        StreetViewConfig::new(
            Url::parse(DEFAULT_STREET_VIEW_ENDPOINT).expect("endpoint parses"),
            "test-key",
        )
    }

    #[rstest]
    fn builds_metadata_url_with_location_and_key() {
        let url = build_metadata_url(&config(), Coordinate::new(55.9533, -3.1883));
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("location".to_owned(), "55.9533,-3.1883".to_owned()),
                ("radius".to_owned(), "50".to_owned()),
                ("source".to_owned(), "outdoor".to_owned()),
                ("key".to_owned(), "test-key".to_owned()),
            ]
        );
        assert_eq!(url.path(), "/maps/api/streetview/metadata");
    }

    #[rstest]
    fn indoor_panoramas_drop_the_source_filter() {
        let mut config = config();
        config.outdoor_only = false;
        let url = build_metadata_url(&config, Coordinate::new(0.0, 0.0));
        assert!(url.query_pairs().all(|(name, _)| name != "source"));
    }

    #[rstest]
    fn decodes_ok_metadata_into_a_scene() {
        let body = br#"{
            "copyright": "(c) Google",
            "date": "2023-07",
            "location": { "lat": 55.95331, "lng": -3.18829 },
            "pano_id": "CAoSLEFGMVFpcE",
            "status": "OK"
        }"#;
        let scene = parse_metadata(body)
            .expect("metadata decodes")
            .expect("coverage present");
        assert_eq!(scene.pano_id, "CAoSLEFGMVFpcE");
        assert_eq!(scene.location, Coordinate::new(55.95331, -3.18829));
        assert_eq!(scene.date.as_deref(), Some("2023-07"));
        assert_eq!(scene.copyright.as_deref(), Some("(c) Google"));
    }

    #[rstest]
    #[case::zero_results(r#"{"status":"ZERO_RESULTS"}"#)]
    #[case::not_found(r#"{"status":"NOT_FOUND"}"#)]
    fn missing_coverage_is_not_an_error(#[case] body: &str) {
        assert_eq!(parse_metadata(body.as_bytes()), Ok(None));
    }

    #[rstest]
    #[case::quota(r#"{"status":"OVER_QUERY_LIMIT"}"#, "RateLimited")]
    #[case::denied(
        r#"{"status":"REQUEST_DENIED","error_message":"The provided API key is invalid."}"#,
        "Rejected"
    )]
    #[case::invalid(r#"{"status":"INVALID_REQUEST"}"#, "Rejected")]
    #[case::unknown(r#"{"status":"UNKNOWN_ERROR"}"#, "Transport")]
    #[case::incomplete(r#"{"status":"OK"}"#, "Decode")]
    #[case::garbage("<html>", "Decode")]
    fn provider_statuses_map_to_domain_errors(#[case] body: &str, #[case] expected: &str) {
        let error = parse_metadata(body.as_bytes()).expect_err("status should fail");
        let matched = match expected {
            "RateLimited" => matches!(error, PanoramaSourceError::RateLimited { .. }),
            "Rejected" => matches!(error, PanoramaSourceError::Rejected { .. }),
            "Transport" => matches!(error, PanoramaSourceError::Transport { .. }),
            "Decode" => matches!(error, PanoramaSourceError::Decode { .. }),
            _ => panic!("unsupported test expectation: {expected}"),
        };
        assert!(matched, "{body} should map to {expected}, got {error:?}");
    }

    #[rstest]
    fn denial_messages_are_preserved() {
        let body = br#"{"status":"REQUEST_DENIED","error_message":"key expired"}"#;
        let error = parse_metadata(body).expect_err("denied");
        assert_eq!(
            error.to_string(),
            "panorama request rejected: REQUEST_DENIED: key expired"
        );
    }

    #[rstest]
    #[case::rate_limited(StatusCode::TOO_MANY_REQUESTS, "RateLimited")]
    #[case::gateway_timeout(StatusCode::GATEWAY_TIMEOUT, "Timeout")]
    #[case::forbidden(StatusCode::FORBIDDEN, "Rejected")]
    #[case::server_error(StatusCode::INTERNAL_SERVER_ERROR, "Transport")]
    fn maps_http_statuses_to_domain_errors(#[case] status: StatusCode, #[case] expected: &str) {
        let error = map_status_error(status, b"{\"error\":\"backend unavailable\"}");
        let matched = match expected {
            "RateLimited" => matches!(error, PanoramaSourceError::RateLimited { .. }),
            "Timeout" => matches!(error, PanoramaSourceError::Timeout { .. }),
            "Rejected" => matches!(error, PanoramaSourceError::Rejected { .. }),
            "Transport" => matches!(error, PanoramaSourceError::Transport { .. }),
            _ => panic!("unsupported test expectation: {expected}"),
        };
        assert!(matched, "{status} should map to {expected}");
    }
}
