//! Sync session configuration

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::Result;
use crate::history::DEFAULT_HISTORY_CAPACITY;

/// Tunables for a sync session.
///
/// Loadable from YAML with durations written as fractional seconds:
///
/// ```rust
/// use std::time::Duration;
/// use downlink::SyncConfig;
///
/// let config = SyncConfig::from_yaml_str("stale_interval: 2.5\n").unwrap();
/// assert_eq!(config.stale_interval, Duration::from_millis(2500));
/// assert_eq!(config.history_capacity, 600);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Silence after which the session is reported stale.
    #[serde(serialize_with = "as_seconds", deserialize_with = "from_seconds")]
    pub stale_interval: Duration,
    /// How long one snapshot fetch may take before it counts as failed.
    #[serde(serialize_with = "as_seconds", deserialize_with = "from_seconds")]
    pub snapshot_timeout: Duration,
    /// Entries kept per packet in history.
    pub history_capacity: usize,
    /// Consecutive transport errors tolerated before closing.
    pub max_transport_errors: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            stale_interval: Duration::from_secs(5),
            snapshot_timeout: Duration::from_secs(10),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            max_transport_errors: 10,
        }
    }
}

impl SyncConfig {
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        Ok(serde_yaml_ng::from_str(text)?)
    }

    pub fn with_stale_interval(mut self, interval: Duration) -> Self {
        self.stale_interval = interval;
        self
    }

    pub fn with_snapshot_timeout(mut self, timeout: Duration) -> Self {
        self.snapshot_timeout = timeout;
        self
    }

    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }
}

fn as_seconds<S: Serializer>(duration: &Duration, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64())
}

fn from_seconds<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Duration, D::Error> {
    let seconds = f64::deserialize(deserializer)?;
    Duration::try_from_secs_f64(seconds).map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.stale_interval, Duration::from_secs(5));
        assert_eq!(config.snapshot_timeout, Duration::from_secs(10));
        assert_eq!(config.history_capacity, 600);
        assert_eq!(config.max_transport_errors, 10);
    }

    #[test]
    fn yaml_overrides_and_rejects_negative_durations() {
        let config = SyncConfig::from_yaml_str("history_capacity: 10\nmax_transport_errors: 3\n").unwrap();
        assert_eq!(config.history_capacity, 10);
        assert_eq!(config.max_transport_errors, 3);
        assert_eq!(config.stale_interval, Duration::from_secs(5));

        assert!(SyncConfig::from_yaml_str("stale_interval: -1\n").is_err());

        let config = SyncConfig::from_yaml_str("snapshot_timeout: 0.5\n").unwrap();
        assert_eq!(config.snapshot_timeout, Duration::from_millis(500));
    }
}
