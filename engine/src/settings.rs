//! Engine configuration loaded via OrthoConfig.
//!
//! Values layer defaults, configuration files, and `PANORAMA_*` environment
//! variables. The speed carries a loader default so an empty environment
//! still yields settings; the remaining fields are optional and their
//! accessors supply defaults while converting into the domain configuration
//! structs.

use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::domain::playback::ParsePlaybackSpeedError;
use crate::domain::{
    AddressLookupConfig, PanoramaServiceConfig, PlaybackConfig, PlaybackSpeed, RateLimiterConfig,
};
use crate::outbound::nominatim::DEFAULT_NOMINATIM_ENDPOINT;
use crate::outbound::streetview::DEFAULT_STREET_VIEW_ENDPOINT;

const DEFAULT_SPEED: &str = "normal";
const DEFAULT_USER_AGENT: &str = concat!("route-panorama/", env!("CARGO_PKG_VERSION"));

/// Errors raised while interpreting loaded settings.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SettingsError {
    /// The configured speed name is unknown.
    #[error(transparent)]
    Speed(#[from] ParsePlaybackSpeedError),
    /// An endpoint is not a valid absolute URL.
    #[error("{field} is not a valid URL: {message}")]
    InvalidUrl {
        /// Setting that failed to parse.
        field: &'static str,
        /// Parser message.
        message: String,
    },
    /// A numeric setting is outside its accepted range.
    #[error("{field} must be {requirement}")]
    OutOfRange {
        /// Setting that was rejected.
        field: &'static str,
        /// Accepted range, in words.
        requirement: &'static str,
    },
}

/// Configuration values for the playback engine and its adapters.
#[derive(Debug, Clone, Deserialize, OrthoConfig)]
#[ortho_config(prefix = "PANORAMA")]
pub struct EngineSettings {
    /// Playback speed: `slow`, `normal`, or `fast`.
    #[ortho_config(default = String::from(DEFAULT_SPEED))]
    pub speed: Option<String>,
    /// Points fetched before playback starts.
    pub initial_fetch_count: Option<usize>,
    /// Points kept requested ahead of the playback position.
    pub prefetch_lookahead: Option<usize>,
    /// Minimum spacing of sampled route points, in metres.
    pub point_interval_meters: Option<f64>,
    /// Panorama requests admitted per rate-limit window.
    pub rate_limit_requests: Option<u32>,
    /// Rate-limit window length, in seconds.
    pub rate_limit_window_secs: Option<u64>,
    /// Upper bound on concurrent panorama requests.
    pub max_concurrent_fetches: Option<usize>,
    /// Per-request panorama timeout, in seconds.
    pub fetch_timeout_secs: Option<u64>,
    /// Street View metadata endpoint override.
    pub street_view_endpoint: Option<String>,
    /// Street View API key. Without one the fixture source is used.
    pub street_view_api_key: Option<String>,
    /// Nominatim reverse endpoint override.
    pub nominatim_endpoint: Option<String>,
    /// User agent sent to outbound providers.
    pub user_agent: Option<String>,
}

impl EngineSettings {
    /// Return the configured playback speed, falling back to normal.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::Speed`] for unknown speed names.
    pub fn speed(&self) -> Result<PlaybackSpeed, SettingsError> {
        Ok(self
            .speed
            .as_deref()
            .map(str::parse::<PlaybackSpeed>)
            .transpose()?
            .unwrap_or_default())
    }

    /// Return the playback prefetch configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::OutOfRange`] when the point interval is not a
    /// positive finite distance.
    pub fn playback_config(&self) -> Result<PlaybackConfig, SettingsError> {
        let defaults = PlaybackConfig::default();
        let point_interval_meters = self
            .point_interval_meters
            .unwrap_or(defaults.point_interval_meters);
        if !point_interval_meters.is_finite() || point_interval_meters <= 0.0 {
            return Err(SettingsError::OutOfRange {
                field: "point_interval_meters",
                requirement: "a positive distance",
            });
        }
        Ok(PlaybackConfig {
            initial_fetch_count: self
                .initial_fetch_count
                .unwrap_or(defaults.initial_fetch_count),
            prefetch_lookahead: self
                .prefetch_lookahead
                .unwrap_or(defaults.prefetch_lookahead),
            point_interval_meters,
        })
    }

    /// Return the panorama service configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::OutOfRange`] for a zero-length rate-limit
    /// window or fetch timeout.
    pub fn panorama_service_config(&self) -> Result<PanoramaServiceConfig, SettingsError> {
        let defaults = PanoramaServiceConfig::default();
        let window = match self.rate_limit_window_secs {
            Some(0) => {
                return Err(SettingsError::OutOfRange {
                    field: "rate_limit_window_secs",
                    requirement: "at least one second",
                });
            }
            Some(secs) => Duration::from_secs(secs),
            None => defaults.rate_limit.window,
        };
        let fetch_timeout = match self.fetch_timeout_secs {
            Some(0) => {
                return Err(SettingsError::OutOfRange {
                    field: "fetch_timeout_secs",
                    requirement: "at least one second",
                });
            }
            Some(secs) => Duration::from_secs(secs),
            None => defaults.fetch_timeout,
        };
        Ok(PanoramaServiceConfig {
            rate_limit: RateLimiterConfig {
                max_requests: self
                    .rate_limit_requests
                    .unwrap_or(defaults.rate_limit.max_requests),
                window,
            },
            max_concurrent_fetches: self
                .max_concurrent_fetches
                .unwrap_or(defaults.max_concurrent_fetches),
            fetch_timeout,
            ..defaults
        })
    }

    /// Return the address lookup configuration.
    pub fn address_lookup_config(&self) -> AddressLookupConfig {
        AddressLookupConfig::default()
    }

    /// Return the Street View metadata endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::InvalidUrl`] when the override does not parse.
    pub fn street_view_endpoint(&self) -> Result<Url, SettingsError> {
        parse_endpoint(
            "street_view_endpoint",
            self.street_view_endpoint.as_deref(),
            DEFAULT_STREET_VIEW_ENDPOINT,
        )
    }

    /// Return the Street View API key, treating blank values as absent.
    pub fn street_view_api_key(&self) -> Option<&str> {
        self.street_view_api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }

    /// Return the Nominatim reverse endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::InvalidUrl`] when the override does not parse.
    pub fn nominatim_endpoint(&self) -> Result<Url, SettingsError> {
        parse_endpoint(
            "nominatim_endpoint",
            self.nominatim_endpoint.as_deref(),
            DEFAULT_NOMINATIM_ENDPOINT,
        )
    }

    /// Return the outbound user agent, falling back to the crate name.
    pub fn user_agent(&self) -> &str {
        self.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT)
    }
}

fn parse_endpoint(
    field: &'static str,
    configured: Option<&str>,
    default: &str,
) -> Result<Url, SettingsError> {
    Url::parse(configured.unwrap_or(default)).map_err(|error| SettingsError::InvalidUrl {
        field,
        message: error.to_string(),
    })
}

#[cfg(test)]
mod tests {
    //! Unit tests for engine configuration parsing.

    use super::*;
    use std::ffi::OsString;

    use env_lock::lock_env;
    use rstest::rstest;

    const VARS: [&str; 12] = [
        "PANORAMA_SPEED",
        "PANORAMA_INITIAL_FETCH_COUNT",
        "PANORAMA_PREFETCH_LOOKAHEAD",
        "PANORAMA_POINT_INTERVAL_METERS",
        "PANORAMA_RATE_LIMIT_REQUESTS",
        "PANORAMA_RATE_LIMIT_WINDOW_SECS",
        "PANORAMA_MAX_CONCURRENT_FETCHES",
        "PANORAMA_FETCH_TIMEOUT_SECS",
        "PANORAMA_STREET_VIEW_ENDPOINT",
        "PANORAMA_STREET_VIEW_API_KEY",
        "PANORAMA_NOMINATIM_ENDPOINT",
        "PANORAMA_USER_AGENT",
    ];

    fn load_from_empty_args() -> EngineSettings {
        EngineSettings::load_from_iter([OsString::from("route-preview")])
            .expect("config should load")
    }

    fn env_with(overrides: &[(&str, &str)]) -> Vec<(&'static str, Option<String>)> {
        VARS.iter()
            .map(|name| {
                let value = overrides
                    .iter()
                    .find(|(key, _)| key == name)
                    .map(|(_, value)| (*value).to_owned());
                (*name, value)
            })
            .collect()
    }

    #[rstest]
    fn default_values_are_used_when_missing() {
        let _guard = lock_env(env_with(&[]));

        let settings = load_from_empty_args();
        assert_eq!(settings.speed.as_deref(), Some(DEFAULT_SPEED));
        assert_eq!(settings.speed(), Ok(PlaybackSpeed::Normal));
        assert_eq!(settings.playback_config(), Ok(PlaybackConfig::default()));
        assert_eq!(
            settings.panorama_service_config(),
            Ok(PanoramaServiceConfig::default())
        );
        assert_eq!(
            settings.street_view_endpoint().map(String::from),
            Ok(DEFAULT_STREET_VIEW_ENDPOINT.to_owned())
        );
        assert!(settings.street_view_api_key().is_none());
        assert_eq!(settings.user_agent(), DEFAULT_USER_AGENT);
    }

    #[rstest]
    fn environment_overrides_are_respected() {
        let _guard = lock_env(env_with(&[
            ("PANORAMA_SPEED", "fast"),
            ("PANORAMA_INITIAL_FETCH_COUNT", "4"),
            ("PANORAMA_PREFETCH_LOOKAHEAD", "8"),
            ("PANORAMA_POINT_INTERVAL_METERS", "25.5"),
            ("PANORAMA_RATE_LIMIT_REQUESTS", "10"),
            ("PANORAMA_RATE_LIMIT_WINDOW_SECS", "30"),
            ("PANORAMA_FETCH_TIMEOUT_SECS", "5"),
            ("PANORAMA_STREET_VIEW_API_KEY", "abc123"),
            ("PANORAMA_NOMINATIM_ENDPOINT", "http://localhost:8088/reverse"),
            ("PANORAMA_USER_AGENT", "tests/1.0"),
        ]));

        let settings = load_from_empty_args();
        assert_eq!(settings.speed(), Ok(PlaybackSpeed::Fast));
        assert_eq!(
            settings.playback_config(),
            Ok(PlaybackConfig {
                initial_fetch_count: 4,
                prefetch_lookahead: 8,
                point_interval_meters: 25.5,
            })
        );
        let service = settings
            .panorama_service_config()
            .expect("service config");
        assert_eq!(
            service.rate_limit,
            RateLimiterConfig {
                max_requests: 10,
                window: Duration::from_secs(30),
            }
        );
        assert_eq!(service.fetch_timeout, Duration::from_secs(5));
        assert_eq!(service.max_concurrent_fetches, 4);
        assert_eq!(settings.street_view_api_key(), Some("abc123"));
        assert_eq!(
            settings.nominatim_endpoint().map(String::from),
            Ok("http://localhost:8088/reverse".to_owned())
        );
        assert_eq!(settings.user_agent(), "tests/1.0");
    }

    #[rstest]
    fn invalid_values_are_reported() {
        let settings = EngineSettings {
            speed: Some("warp".to_owned()),
            initial_fetch_count: None,
            prefetch_lookahead: None,
            point_interval_meters: Some(0.0),
            rate_limit_requests: None,
            rate_limit_window_secs: None,
            max_concurrent_fetches: None,
            fetch_timeout_secs: Some(0),
            street_view_endpoint: Some("not a url".to_owned()),
            street_view_api_key: Some("   ".to_owned()),
            nominatim_endpoint: None,
            user_agent: None,
        };

        assert!(matches!(settings.speed(), Err(SettingsError::Speed(_))));
        assert!(matches!(
            settings.playback_config(),
            Err(SettingsError::OutOfRange { field: "point_interval_meters", .. })
        ));
        assert!(matches!(
            settings.panorama_service_config(),
            Err(SettingsError::OutOfRange { field: "fetch_timeout_secs", .. })
        ));
        assert!(matches!(
            settings.street_view_endpoint(),
            Err(SettingsError::InvalidUrl { .. })
        ));
        assert!(settings.street_view_api_key().is_none());
    }
}
