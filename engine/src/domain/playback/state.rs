//! Playback state, speed, and observation types.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::domain::DEFAULT_POINT_INTERVAL_METERS;

/// Tick rate of route playback.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum PlaybackSpeed {
    /// One point every five seconds.
    Slow,
    /// One point every three seconds.
    #[default]
    Normal,
    /// One point every one and a half seconds.
    Fast,
}

impl PlaybackSpeed {
    /// Time between playback ticks.
    pub const fn interval(self) -> Duration {
        match self {
            Self::Slow => Duration::from_secs(5),
            Self::Normal => Duration::from_secs(3),
            Self::Fast => Duration::from_millis(1_500),
        }
    }

    /// Lowercase name as accepted by [`FromStr`].
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Slow => "slow",
            Self::Normal => "normal",
            Self::Fast => "fast",
        }
    }
}

impl fmt::Display for PlaybackSpeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown speed name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown playback speed `{0}` (expected slow, normal, or fast)")]
pub struct ParsePlaybackSpeedError(pub String);

impl FromStr for PlaybackSpeed {
    type Err = ParsePlaybackSpeedError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "slow" => Ok(Self::Slow),
            "normal" => Ok(Self::Normal),
            "fast" => Ok(Self::Fast),
            _ => Err(ParsePlaybackSpeedError(value.to_owned())),
        }
    }
}

/// Where a playback session is in its lifecycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum PlaybackState {
    /// No route loaded.
    #[default]
    Idle,
    /// The initial batch of panoramas is being fetched.
    Initializing {
        /// Initial points resolved so far.
        fetched_count: usize,
        /// Initial points that must resolve before playback starts.
        required_count: usize,
    },
    /// Bulk progress view of initialization. See [`PlaybackState::as_loading`].
    Loading {
        /// Fraction complete in `[0, 1]`.
        progress: f64,
        /// Points resolved.
        fetched: usize,
        /// Points required.
        total: usize,
    },
    /// The tick timer is advancing the route.
    Playing,
    /// The tick timer is suspended and the position frozen.
    Paused,
    /// Waiting for the next point to resolve before advancing.
    Buffering,
    /// The final point has been reached.
    Completed,
    /// The session hit an unrecoverable error.
    Failed {
        /// User-facing description of the failure.
        message: String,
    },
}

impl PlaybackState {
    /// Whether the tick timer is advancing the route.
    pub fn is_playing(&self) -> bool {
        matches!(self, Self::Playing)
    }

    /// Whether the initial batch is still in flight.
    pub fn is_initializing(&self) -> bool {
        matches!(self, Self::Initializing { .. } | Self::Loading { .. })
    }

    /// Whether playback is waiting on the next point.
    pub fn is_buffering(&self) -> bool {
        matches!(self, Self::Buffering)
    }

    /// Whether playback is paused.
    pub fn is_paused(&self) -> bool {
        matches!(self, Self::Paused)
    }

    /// Whether the route has been played to the end.
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Whether the session failed.
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// Whether a session is in progress: anything except idle, completed,
    /// or failed.
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Idle | Self::Completed | Self::Failed { .. })
    }

    /// Express an `Initializing` state as `Loading` progress. Other states
    /// are returned unchanged.
    ///
    /// # Examples
    /// ```
    /// use route_panorama::domain::PlaybackState;
    ///
    /// let state = PlaybackState::Initializing { fetched_count: 1, required_count: 4 };
    /// assert_eq!(
    ///     state.as_loading(),
    ///     PlaybackState::Loading { progress: 0.25, fetched: 1, total: 4 }
    /// );
    /// ```
    pub fn as_loading(&self) -> Self {
        match self {
            Self::Initializing {
                fetched_count,
                required_count,
            } => {
                let progress = if *required_count == 0 {
                    1.0
                } else {
                    (*fetched_count as f64 / *required_count as f64).min(1.0)
                };
                Self::Loading {
                    progress,
                    fetched: *fetched_count,
                    total: *required_count,
                }
            }
            other => other.clone(),
        }
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Initializing {
                fetched_count,
                required_count,
            } => write!(f, "initializing ({fetched_count}/{required_count})"),
            Self::Loading {
                progress,
                fetched,
                total,
            } => write!(f, "loading ({fetched}/{total}, {:.0}%)", progress * 100.0),
            Self::Playing => f.write_str("playing"),
            Self::Paused => f.write_str("paused"),
            Self::Buffering => f.write_str("buffering"),
            Self::Completed => f.write_str("completed"),
            Self::Failed { message } => write!(f, "failed: {message}"),
        }
    }
}

/// Prefetch sizing for a playback session.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackConfig {
    /// Points fetched before playback starts.
    pub initial_fetch_count: usize,
    /// Points kept requested ahead of the current position.
    pub prefetch_lookahead: usize,
    /// Minimum spacing of sampled route points, in metres.
    pub point_interval_meters: f64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            initial_fetch_count: 3,
            prefetch_lookahead: 5,
            point_interval_meters: DEFAULT_POINT_INTERVAL_METERS,
        }
    }
}

/// Latest observable controller state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaybackSnapshot {
    /// Current lifecycle state.
    pub state: PlaybackState,
    /// Index of the point being shown.
    pub current_index: usize,
    /// Points in the loaded route.
    pub point_count: usize,
    /// Active tick rate.
    pub speed: PlaybackSpeed,
}

/// Discrete playback notifications.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    /// The lifecycle state changed.
    StateChanged {
        /// Previous state.
        from: PlaybackState,
        /// New state.
        to: PlaybackState,
    },
    /// The current position moved.
    IndexAdvanced {
        /// New current index.
        index: usize,
    },
    /// A route point finished its fetch.
    PointResolved {
        /// Index of the resolved point.
        index: usize,
        /// Whether imagery was found.
        has_scene: bool,
        /// Whether the fetch failed.
        failed: bool,
    },
}

/// Errors returned by controller operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlaybackError {
    /// The operation is not valid in the current state.
    #[error("cannot {action} while {state}")]
    InvalidTransition {
        /// Operation that was attempted.
        action: &'static str,
        /// State at the time of the attempt.
        state: PlaybackState,
    },
    /// The route could not be loaded; the controller is now `Failed`.
    #[error("route rejected: {message}")]
    RouteRejected {
        /// Reason the route was rejected.
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(PlaybackSpeed::Slow, 5_000)]
    #[case(PlaybackSpeed::Normal, 3_000)]
    #[case(PlaybackSpeed::Fast, 1_500)]
    fn speed_intervals(#[case] speed: PlaybackSpeed, #[case] millis: u64) {
        assert_eq!(speed.interval(), Duration::from_millis(millis));
        assert_eq!(speed.as_str().parse::<PlaybackSpeed>(), Ok(speed));
    }

    #[rstest]
    fn speed_parsing_is_case_insensitive_and_strict() {
        assert_eq!(" FAST ".parse::<PlaybackSpeed>(), Ok(PlaybackSpeed::Fast));
        assert!("ludicrous".parse::<PlaybackSpeed>().is_err());
    }

    #[rstest]
    #[case(PlaybackState::Idle, false)]
    #[case(PlaybackState::Initializing { fetched_count: 0, required_count: 3 }, true)]
    #[case(PlaybackState::Loading { progress: 0.5, fetched: 1, total: 2 }, true)]
    #[case(PlaybackState::Playing, true)]
    #[case(PlaybackState::Paused, true)]
    #[case(PlaybackState::Buffering, true)]
    #[case(PlaybackState::Completed, false)]
    #[case(PlaybackState::Failed { message: "no path".into() }, false)]
    fn active_states(#[case] state: PlaybackState, #[case] active: bool) {
        assert_eq!(state.is_active(), active);
    }

    #[rstest]
    fn predicates_match_single_states() {
        assert!(PlaybackState::Playing.is_playing());
        assert!(!PlaybackState::Buffering.is_playing());
        assert!(PlaybackState::Buffering.is_buffering());
        assert!(
            PlaybackState::Initializing {
                fetched_count: 0,
                required_count: 1
            }
            .is_initializing()
        );
    }

    #[rstest]
    fn as_loading_handles_empty_batches() {
        let state = PlaybackState::Initializing {
            fetched_count: 0,
            required_count: 0,
        };
        assert_eq!(
            state.as_loading(),
            PlaybackState::Loading {
                progress: 1.0,
                fetched: 0,
                total: 0
            }
        );
        assert_eq!(PlaybackState::Paused.as_loading(), PlaybackState::Paused);
    }

    #[rstest]
    fn states_render_for_logs() {
        let loading = PlaybackState::Initializing {
            fetched_count: 1,
            required_count: 2,
        }
        .as_loading();
        assert_eq!(loading.to_string(), "loading (1/2, 50%)");
        let error = PlaybackError::InvalidTransition {
            action: "play",
            state: PlaybackState::Idle,
        };
        assert_eq!(error.to_string(), "cannot play while idle");
    }
}
