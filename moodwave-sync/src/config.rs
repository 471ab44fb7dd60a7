use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Queue items are dropped after this many failed attempts.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Interval of the background sync timer.
pub const DEFAULT_PERIODIC_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// Timeout for a single remote call.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Sync engine configuration.
///
/// Durations are written as whole seconds in config files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Base URL of the remote service, e.g. `https://api.moodwave.app/v1`.
    pub base_url: String,
    /// Failed attempts after which an item is discarded. At least 1.
    pub max_retries: u32,
    #[serde(rename = "periodic_interval_secs", with = "duration_secs")]
    pub periodic_interval: Duration,
    #[serde(rename = "request_timeout_secs", with = "duration_secs")]
    pub request_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.moodwave.app/v1".to_string(),
            max_retries: DEFAULT_MAX_RETRIES,
            periodic_interval: DEFAULT_PERIODIC_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// Credentials and refresh endpoint for [`HttpTokenProvider`](crate::HttpTokenProvider).
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Endpoint that exchanges a refresh token for a new access token.
    pub refresh_url: String,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("refresh_url", &self.refresh_url)
            .field("access_token", &self.access_token.as_ref().map(|_| "[REDACTED]"))
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = SyncConfig::default();
        assert_eq!(cfg.max_retries, 5);
        assert_eq!(cfg.periodic_interval, Duration::from_secs(900));
        assert_eq!(cfg.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn durations_are_seconds() {
        let cfg: SyncConfig =
            serde_json::from_str(r#"{"base_url":"http://x","periodic_interval_secs":60}"#).unwrap();
        assert_eq!(cfg.periodic_interval, Duration::from_secs(60));
        assert_eq!(cfg.max_retries, DEFAULT_MAX_RETRIES);

        let json = serde_json::to_value(&cfg).unwrap();
        assert_eq!(json["request_timeout_secs"], 30);
    }

    #[test]
    fn auth_debug_is_redacted() {
        let cfg = AuthConfig {
            refresh_url: "http://x/refresh".into(),
            access_token: Some("secret-access".into()),
            refresh_token: Some("secret-refresh".into()),
        };
        let debug = format!("{cfg:?}");
        assert!(debug.contains("http://x/refresh"));
        assert!(!debug.contains("secret"));
    }
}
