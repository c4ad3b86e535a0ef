//! Session configuration.
//!
//! A dashboard session is configured once at start-up with the retention
//! bounds, the tracked parameters and entities, and the render cadence. The
//! configuration is plain JSON:
//!
//! ```json
//! {
//!   "base_topic": "bess/telemetria",
//!   "window_secs": 60,
//!   "max_points": 100,
//!   "parameters": ["potencia", "tensao", "corrente"],
//!   "entities": ["natal"],
//!   "poll_interval_ms": 1000
//! }
//! ```
//!
//! Every field except `parameters` has a default. Setting `window_secs` or
//! `max_points` to `null` disables that bound; disabling both is rejected.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::error::{ConfigError, Result};
use crate::retention::{DEFAULT_MAX_POINTS, DEFAULT_WINDOW, RetentionPolicy};
use crate::store::SeriesStore;
use crate::topic::TopicRouter;

/// Default render/poll cadence in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// Configuration for one dashboard session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Topic prefix shared by all telemetry topics.
    #[serde(default)]
    pub base_topic: String,

    /// Retention window in seconds; `None` disables the age bound.
    #[serde(default = "default_window_secs")]
    pub window_secs: Option<u64>,

    /// Per-series point cap; `None` disables the length bound.
    #[serde(default = "default_max_points")]
    pub max_points: Option<usize>,

    /// Tracked parameter names.
    pub parameters: Vec<String>,

    /// Tracked entities; empty selects single-entity mode.
    #[serde(default)]
    pub entities: Vec<String>,

    /// Render/poll cadence in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_window_secs() -> Option<u64> {
    Some(DEFAULT_WINDOW.as_secs())
}

fn default_max_points() -> Option<usize> {
    Some(DEFAULT_MAX_POINTS)
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

impl SessionConfig {
    /// Creates a configuration with default bounds for `parameters` under
    /// `base_topic`, in single-entity mode.
    pub fn new<P: Into<String>>(
        base_topic: impl Into<String>,
        parameters: impl IntoIterator<Item = P>,
    ) -> Self {
        Self {
            base_topic: base_topic.into(),
            window_secs: default_window_secs(),
            max_points: default_max_points(),
            parameters: parameters.into_iter().map(Into::into).collect(),
            entities: Vec::new(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }

    /// Loads and validates a configuration file.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::Read`] if the file cannot be read
    /// - [`ConfigError::Parse`] if it is not a valid configuration
    /// - any error from [`SessionConfig::validate`]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&json).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;

        tracing::debug!(
            path = %path.display(),
            parameters = config.parameters.len(),
            entities = config.entities.len(),
            "loaded session config"
        );
        Ok(config)
    }

    /// Checks every field.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for missing parameters, invalid names, zero or
    /// missing bounds, or a zero poll interval.
    pub fn validate(&self) -> Result<()> {
        self.router()?;
        self.retention()?;
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::ZeroPollInterval.into());
        }
        Ok(())
    }

    /// Builds the topic router for the configured selection.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the parameter or entity names are invalid.
    pub fn router(&self) -> Result<TopicRouter> {
        TopicRouter::new(
            self.base_topic.as_str(),
            self.entities.iter().map(String::as_str),
            self.parameters.iter().map(String::as_str),
        )
    }

    /// Builds the retention policy.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a bound is zero or both are missing.
    pub fn retention(&self) -> Result<RetentionPolicy> {
        RetentionPolicy::new(self.window_secs.map(Duration::from_secs), self.max_points)
    }

    /// The render/poll cadence.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Builds a store on the system clock.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the configuration is invalid.
    pub fn build_store(&self) -> Result<SeriesStore> {
        self.validate()?;
        Ok(SeriesStore::new(self.router()?, self.retention()?))
    }

    /// Builds a store on a specific clock.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the configuration is invalid.
    pub fn build_store_with_clock(&self, clock: Arc<dyn Clock>) -> Result<SeriesStore> {
        self.validate()?;
        Ok(SeriesStore::with_clock(self.router()?, self.retention()?, clock))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TeleseriesError;

    #[test]
    fn test_defaults_from_minimal_json() {
        let config: SessionConfig = serde_json::from_str(r#"{"parameters": ["energia"]}"#).unwrap();
        assert_eq!(config, SessionConfig::new("", ["energia"]));
        assert_eq!(config.window_secs, Some(60));
        assert_eq!(config.max_points, Some(100));
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
        config.validate().unwrap();
    }

    #[test]
    fn test_null_bound_disables_it() {
        let config: SessionConfig =
            serde_json::from_str(r#"{"parameters": ["p"], "window_secs": null}"#).unwrap();
        let retention = config.retention().unwrap();
        assert_eq!(retention.window_duration(), None);
        assert_eq!(retention.point_cap(), Some(100));
    }

    #[test]
    fn test_validate_rejects_bad_configs() {
        let mut config = SessionConfig::new("bess", ["p"]);
        config.window_secs = None;
        config.max_points = None;
        assert!(matches!(
            config.validate(),
            Err(TeleseriesError::Config(ConfigError::Unbounded))
        ));

        let mut config = SessionConfig::new("bess", ["p"]);
        config.poll_interval_ms = 0;
        assert!(matches!(
            config.validate(),
            Err(TeleseriesError::Config(ConfigError::ZeroPollInterval))
        ));

        let config = SessionConfig::new("bess", Vec::<String>::new());
        assert!(matches!(
            config.validate(),
            Err(TeleseriesError::Config(ConfigError::NoParameters))
        ));

        let mut config = SessionConfig::new("bess", ["p"]);
        config.entities = vec!["bad/name".to_string()];
        assert!(config.validate().is_err());

        let config = SessionConfig::new("bess/+", ["energia"]);
        assert!(matches!(
            config.validate(),
            Err(TeleseriesError::Config(ConfigError::InvalidName { kind: "base", .. }))
        ));
    }

    #[test]
    fn test_round_trips_through_json() {
        let mut config = SessionConfig::new("bess/telemetria", ["potencia", "tensao"]);
        config.entities = vec!["natal".to_string()];
        let json = serde_json::to_string(&config).unwrap();
        let back: SessionConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
