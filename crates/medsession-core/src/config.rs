//! Session timing and endpoint configuration.
//!
//! All timings are independently tunable. The idle-probe cadence and skip
//! threshold in particular are NOT derived from the client idle timeout: the
//! backend may enforce a much shorter inactivity window than the 15 minute
//! client-side timeout, and the probe loop exists to notice that.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default client-side idle timeout.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(15 * 60);

/// Default proactive refresh interval (shorter than the 5 minute token).
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(4 * 60);

/// Default idle-probe interval.
pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(12);

/// Default "recently acknowledged" window in which probes are skipped.
pub const DEFAULT_PROBE_SKIP_THRESHOLD: Duration = Duration::from_secs(8);

/// Default minimum spacing between activity notifications.
pub const DEFAULT_ACTIVITY_COOLDOWN: Duration = Duration::from_secs(3);

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A duration that must be positive was zero.
    #[error("{field} must be greater than zero")]
    ZeroDuration {
        /// Name of the offending field.
        field: &'static str,
    },

    /// An endpoint path was empty or not absolute.
    #[error("endpoint {name} must be an absolute path, got {path:?}")]
    InvalidEndpoint {
        /// Endpoint name.
        name: &'static str,
        /// Configured path.
        path: String,
    },
}

/// Timings for the session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Silence after which the session expires client-side.
    #[serde(rename = "idle_timeout_ms", with = "duration_ms")]
    pub idle_timeout: Duration,

    /// Cadence of the proactive notify + refresh loop.
    #[serde(rename = "refresh_interval_ms", with = "duration_ms")]
    pub refresh_interval: Duration,

    /// Cadence of the idle-probe loop.
    #[serde(rename = "probe_interval_ms", with = "duration_ms")]
    pub probe_interval: Duration,

    /// Probes are skipped when the last server acknowledgment is younger
    /// than this.
    #[serde(rename = "probe_skip_threshold_ms", with = "duration_ms")]
    pub probe_skip_threshold: Duration,

    /// Minimum spacing between activity notifications.
    #[serde(rename = "activity_cooldown_ms", with = "duration_ms")]
    pub activity_cooldown: Duration,

    /// Whether client-side idle detection runs at all.
    pub idle_detection: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            probe_interval: DEFAULT_PROBE_INTERVAL,
            probe_skip_threshold: DEFAULT_PROBE_SKIP_THRESHOLD,
            activity_cooldown: DEFAULT_ACTIVITY_COOLDOWN,
            idle_detection: true,
        }
    }
}

impl SessionConfig {
    /// Reject configurations the loops cannot run with.
    ///
    /// The skip threshold and cooldown may be zero (meaning "never skip" and
    /// "never throttle"); the three timers may not.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("idle_timeout", self.idle_timeout),
            ("refresh_interval", self.refresh_interval),
            ("probe_interval", self.probe_interval),
        ];

        for (field, value) in required {
            if value.is_zero() {
                return Err(ConfigError::ZeroDuration { field });
            }
        }

        Ok(())
    }
}

/// Backend endpoint paths the coordinator depends on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    /// Credential exchange.
    pub login: String,
    /// Best-effort session teardown.
    pub logout: String,
    /// Access-token refresh.
    pub refresh: String,
    /// Activity acknowledgment.
    pub activity: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            login: "/auth/login".to_string(),
            logout: "/auth/logout".to_string(),
            refresh: "/session/refresh".to_string(),
            activity: "/session/activity".to_string(),
        }
    }
}

impl Endpoints {
    /// Every path must be absolute.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let paths = [
            ("login", &self.login),
            ("logout", &self.logout),
            ("refresh", &self.refresh),
            ("activity", &self.activity),
        ];

        for (name, path) in paths {
            if !path.starts_with('/') {
                return Err(ConfigError::InvalidEndpoint { name, path: path.clone() });
            }
        }

        Ok(())
    }

    /// Whether `path` is one of the endpoints a 401 must never be recovered
    /// from (login or refresh).
    pub fn is_credential_endpoint(&self, path: &str) -> bool {
        let path = path.split('?').next().unwrap_or(path);
        path == self.login || path == self.refresh
    }
}

/// Serde adapter storing a `Duration` as integer milliseconds.
pub mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    /// Serialize as milliseconds.
    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let millis = u64::try_from(value.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(millis)
    }

    /// Deserialize from milliseconds.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
