//! Retention policy for telemetry series.
//!
//! A [`RetentionPolicy`] bounds every series by age, by length, or by both.
//! It is applied on every append and again when a snapshot is copied out,
//! so a series that stops receiving data still reads as empty once its
//! entries age out.
//!
//! Both bounds only ever remove from the oldest end of a series. When both
//! are configured the point cap is applied first and is a hard ceiling: a
//! series never holds more than `max_points` entries, even if every one of
//! them is still inside the window.

use std::time::Duration;

use crate::clock::duration_ns;
use crate::error::{ConfigError, Result};

/// Default retention window used by dashboards (one minute).
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// Default per-series point cap.
pub const DEFAULT_MAX_POINTS: usize = 100;

/// Age and/or count bound applied to each series.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use teleseries::retention::RetentionPolicy;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let policy = RetentionPolicy::new(Some(Duration::from_secs(60)), Some(100))?;
/// assert_eq!(policy.cutoff_ns(70_000_000_000), Some(10_000_000_000));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Maximum age of a retained entry, measured back from "now".
    window: Option<Duration>,
    /// Maximum number of entries per series.
    max_points: Option<usize>,
}

impl RetentionPolicy {
    /// Creates a validated retention policy.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::ZeroWindow`] if `window` is zero
    /// - [`ConfigError::ZeroMaxPoints`] if `max_points` is zero
    /// - [`ConfigError::Unbounded`] if neither bound is set
    pub fn new(window: Option<Duration>, max_points: Option<usize>) -> Result<Self> {
        let policy = Self { window, max_points };
        policy.validate()?;
        Ok(policy)
    }

    /// A policy bounded only by age.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ZeroWindow`] if `window` is zero.
    pub fn window(window: Duration) -> Result<Self> {
        Self::new(Some(window), None)
    }

    /// A policy bounded only by length.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ZeroMaxPoints`] if `max_points` is zero.
    pub fn max_points(max_points: usize) -> Result<Self> {
        Self::new(None, Some(max_points))
    }

    /// Validates the policy.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a bound is zero or both are missing.
    pub fn validate(&self) -> Result<()> {
        if self.window.is_some_and(|w| w.is_zero()) {
            return Err(ConfigError::ZeroWindow.into());
        }
        if self.max_points == Some(0) {
            return Err(ConfigError::ZeroMaxPoints.into());
        }
        if self.window.is_none() && self.max_points.is_none() {
            return Err(ConfigError::Unbounded.into());
        }
        Ok(())
    }

    /// The configured age bound, if any.
    pub fn window_duration(&self) -> Option<Duration> {
        self.window
    }

    /// The configured length bound, if any.
    pub fn point_cap(&self) -> Option<usize> {
        self.max_points
    }

    /// Oldest timestamp still inside the window at `now_ns`.
    ///
    /// Entries with `timestamp >= cutoff` are retained. Returns `None` when
    /// no window is configured.
    pub fn cutoff_ns(&self, now_ns: u64) -> Option<u64> {
        self.window.map(|w| now_ns.saturating_sub(duration_ns(w)))
    }

    /// Whether an entry stamped `timestamp_ns` has aged out at `now_ns`.
    pub fn is_expired(&self, timestamp_ns: u64, now_ns: u64) -> bool {
        self.cutoff_ns(now_ns).is_some_and(|cutoff| timestamp_ns < cutoff)
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            window: Some(DEFAULT_WINDOW),
            max_points: Some(DEFAULT_MAX_POINTS),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::NANOS_PER_SEC;
    use crate::error::TeleseriesError;

    #[test]
    fn test_default_policy_is_valid() {
        let policy = RetentionPolicy::default();
        policy.validate().unwrap();
        assert_eq!(policy.window_duration(), Some(Duration::from_secs(60)));
        assert_eq!(policy.point_cap(), Some(100));
    }

    #[test]
    fn test_rejects_zero_bounds() {
        assert!(matches!(
            RetentionPolicy::window(Duration::ZERO),
            Err(TeleseriesError::Config(ConfigError::ZeroWindow))
        ));
        assert!(matches!(
            RetentionPolicy::max_points(0),
            Err(TeleseriesError::Config(ConfigError::ZeroMaxPoints))
        ));
    }

    #[test]
    fn test_rejects_unbounded() {
        assert!(matches!(
            RetentionPolicy::new(None, None),
            Err(TeleseriesError::Config(ConfigError::Unbounded))
        ));
    }

    #[test]
    fn test_cutoff_is_inclusive() {
        let policy = RetentionPolicy::window(Duration::from_secs(60)).unwrap();
        let now = 70 * NANOS_PER_SEC;
        assert_eq!(policy.cutoff_ns(now), Some(10 * NANOS_PER_SEC));
        assert!(!policy.is_expired(10 * NANOS_PER_SEC, now));
        assert!(policy.is_expired(10 * NANOS_PER_SEC - 1, now));
    }

    #[test]
    fn test_cutoff_saturates_near_epoch() {
        let policy = RetentionPolicy::window(Duration::from_secs(60)).unwrap();
        assert_eq!(policy.cutoff_ns(5 * NANOS_PER_SEC), Some(0));
        assert!(!policy.is_expired(0, 5 * NANOS_PER_SEC));
    }

    #[test]
    fn test_count_only_never_expires() {
        let policy = RetentionPolicy::max_points(10).unwrap();
        assert_eq!(policy.cutoff_ns(u64::MAX), None);
        assert!(!policy.is_expired(0, u64::MAX));
    }
}
