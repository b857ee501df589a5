//! Reqwest-backed Nominatim reverse geocoder.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;

use crate::domain::Coordinate;
use crate::domain::ports::{ReverseGeocoder, ReverseGeocoderError};
use crate::outbound::status_message;

/// Public OpenStreetMap Nominatim reverse endpoint.
pub const DEFAULT_NOMINATIM_ENDPOINT: &str = "https://nominatim.openstreetmap.org/reverse";

const DEFAULT_ZOOM: u8 = 18;

#[derive(Debug, Deserialize)]
struct ReverseDto {
    display_name: Option<String>,
    error: Option<String>,
}

/// Reverse geocoder adapter that performs HTTP GET requests against one
/// Nominatim endpoint.
///
/// Nominatim's usage policy requires an identifying user agent.
pub struct NominatimHttpGeocoder {
    client: Client,
    endpoint: Url,
}

impl NominatimHttpGeocoder {
    /// Build an adapter identifying itself as `user_agent`.
    /// ```rust,ignore
    /// let geocoder = NominatimHttpGeocoder::new(endpoint, "route-preview/0.1", timeout)?;
    /// ```
    /// # Errors
    ///
    /// Returns an error when the reqwest client cannot be constructed.
    pub fn new(
        endpoint: Url,
        user_agent: &str,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;
        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl ReverseGeocoder for NominatimHttpGeocoder {
    async fn reverse(
        &self,
        coordinate: Coordinate,
    ) -> Result<Option<String>, ReverseGeocoderError> {
        let response = self
            .client
            .get(build_reverse_url(&self.endpoint, coordinate))
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|error| ReverseGeocoderError::transport(error.to_string()))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|error| ReverseGeocoderError::transport(error.to_string()))?;
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ReverseGeocoderError::rate_limited(status_message(
                status,
                body.as_ref(),
            )));
        }
        if !status.is_success() {
            return Err(ReverseGeocoderError::transport(status_message(
                status,
                body.as_ref(),
            )));
        }
        parse_reverse(body.as_ref())
    }
}

fn build_reverse_url(endpoint: &Url, coordinate: Coordinate) -> Url {
    let mut url = endpoint.clone();
    url.query_pairs_mut()
        .append_pair("format", "jsonv2")
        .append_pair("lat", &coordinate.latitude.to_string())
        .append_pair("lon", &coordinate.longitude.to_string())
        .append_pair("zoom", &DEFAULT_ZOOM.to_string())
        .append_pair("addressdetails", "0");
    url
}

fn parse_reverse(body: &[u8]) -> Result<Option<String>, ReverseGeocoderError> {
    let decoded: ReverseDto = serde_json::from_slice(body).map_err(|error| {
        ReverseGeocoderError::decode(format!("invalid reverse geocoding payload: {error}"))
    })?;
    // Nominatim answers "nothing here" with 200 and an `error` field.
    if decoded.error.is_some() {
        return Ok(None);
    }
    Ok(decoded
        .display_name
        .map(|name| name.trim().to_owned())
        .filter(|name| !name.is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn builds_jsonv2_reverse_url() {
        let endpoint = Url::parse(DEFAULT_NOMINATIM_ENDPOINT).expect("endpoint parses");
        let url = build_reverse_url(&endpoint, Coordinate::new(51.5007, -0.1246));
        assert_eq!(
            url.as_str(),
            "https://nominatim.openstreetmap.org/reverse?format=jsonv2&lat=51.5007&lon=-0.1246&zoom=18&addressdetails=0"
        );
    }

    #[rstest]
    #[case::found(
        r#"{"place_id":1,"display_name":"Westminster, London, UK"}"#,
        Some("Westminster, London, UK")
    )]
    #[case::unable(r#"{"error":"Unable to geocode"}"#, None)]
    #[case::blank(r#"{"display_name":"  "}"#, None)]
    fn decodes_reverse_payloads(#[case] body: &str, #[case] expected: Option<&str>) {
        let address = parse_reverse(body.as_bytes()).expect("payload decodes");
        assert_eq!(address.as_deref(), expected);
    }

    #[rstest]
    fn malformed_payloads_are_decode_errors() {
        let error = parse_reverse(b"[1,2").expect_err("decode fails");
        assert!(matches!(error, ReverseGeocoderError::Decode { .. }));
    }
}
