//! Error types for the teleseries telemetry buffer.
//!
//! The hot path (`append`, `snapshot`, `on_message`) never returns an error.
//! Errors only arise when a session is configured: bad retention bounds,
//! unusable parameter/entity names, or malformed topic filters.

use std::path::PathBuf;

use thiserror::Error;

/// The main error type for all teleseries operations that can fail.
#[derive(Error, Debug)]
pub enum TeleseriesError {
    /// Error validating or loading a session configuration.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// Error parsing a topic filter.
    #[error("topic error: {0}")]
    Topic(#[from] TopicError),

    /// The poller thread could not be started.
    #[error("failed to spawn poller thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Errors that can occur when building or loading a session configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// No tracked parameters were supplied.
    #[error("at least one parameter must be tracked")]
    NoParameters,

    /// A parameter or entity name cannot appear as a single topic level, or
    /// the base path cannot prefix a published topic.
    #[error("invalid {kind} name '{name}': {reason}")]
    InvalidName {
        /// What kind of name was rejected ("parameter", "entity" or "base").
        kind: &'static str,
        /// The rejected name.
        name: String,
        /// Why the name is invalid.
        reason: &'static str,
    },

    /// The retention window is zero.
    #[error("retention window must be greater than zero")]
    ZeroWindow,

    /// The point cap is zero.
    #[error("max_points must be greater than zero")]
    ZeroMaxPoints,

    /// Neither a retention window nor a point cap was configured.
    #[error("retention needs a window, a point cap, or both")]
    Unbounded,

    /// The poll cadence is zero.
    #[error("poll interval must be greater than zero")]
    ZeroPollInterval,

    /// The configuration file could not be read.
    #[error("failed to read config '{}': {source}", path.display())]
    Read {
        /// The config file path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid JSON for a session config.
    #[error("failed to parse config '{}': {source}", path.display())]
    Parse {
        /// The config file path.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
}

/// Errors that can occur when parsing a topic filter.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum TopicError {
    /// The filter string is empty.
    #[error("topic filter is empty")]
    Empty,

    /// A wildcard is used somewhere MQTT filter syntax does not allow it.
    #[error("invalid wildcard in filter '{filter}': {reason}")]
    InvalidWildcard {
        /// The rejected filter.
        filter: String,
        /// Why the wildcard placement is invalid.
        reason: &'static str,
    },
}

/// Reasons an inbound payload is discarded before it reaches the store.
///
/// These never propagate out of the ingestion adapter; they are logged and
/// counted.
#[derive(Error, Debug, PartialEq)]
pub enum PayloadError {
    /// The payload bytes are not valid UTF-8.
    #[error("payload is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    /// The payload text is not a decimal number.
    #[error("payload is not a number: {0}")]
    InvalidNumber(#[from] std::num::ParseFloatError),

    /// The payload parsed to NaN or an infinity.
    #[error("payload value {0} is not finite")]
    NonFinite(f64),
}

/// Type alias for `Result<T, TeleseriesError>`.
pub type Result<T> = std::result::Result<T, TeleseriesError>;
