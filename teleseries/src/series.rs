//! Series identity and the windowed sequence behind each series.
//!
//! A series is identified by a [`SeriesKey`], the `(entity, parameter)` pair
//! a topic routes to. Its data lives in a [`Series`]: an insertion-ordered
//! queue of `(timestamp_ns, value)` pairs that only ever loses entries from
//! its oldest end.
//!
//! # Eviction
//!
//! [`Series::enforce`] applies a [`RetentionPolicy`] in two passes, both
//! popping from the head:
//!
//! 1. while the series is longer than the point cap
//! 2. while the head entry is older than `now - window`
//!
//! Out-of-order arrivals are kept in arrival order. A late entry behind a
//! newer head is only evicted once everything in front of it has gone, so
//! [`Series::points`] additionally filters expired entries out of the copy it
//! returns.

use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::retention::RetentionPolicy;

/// Entity name used when topics carry no entity segment.
pub const DEFAULT_ENTITY: &str = "default";

/// Composite `(entity, parameter)` key identifying one series.
///
/// Keys order by entity, then parameter, which keeps listings stable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SeriesKey {
    /// The monitored source, e.g. a site or city.
    pub entity: String,
    /// The measured quantity, e.g. voltage or power.
    pub parameter: String,
}

impl SeriesKey {
    /// Creates a key for `parameter` on `entity`.
    pub fn new(entity: impl Into<String>, parameter: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            parameter: parameter.into(),
        }
    }

    /// Creates a key on the implicit [`DEFAULT_ENTITY`].
    pub fn single(parameter: impl Into<String>) -> Self {
        Self::new(DEFAULT_ENTITY, parameter)
    }

    /// Whether this key belongs to the implicit default entity.
    pub fn is_default_entity(&self) -> bool {
        self.entity == DEFAULT_ENTITY
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.entity, self.parameter)
    }
}

/// A single routed, timestamped measurement.
///
/// Readings are immutable once created; the store keeps only their
/// `(timestamp, value)` point.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reading {
    key: SeriesKey,
    timestamp_ns: u64,
    value: f64,
}

impl Reading {
    /// Creates a reading.
    pub fn new(key: SeriesKey, timestamp_ns: u64, value: f64) -> Self {
        Self {
            key,
            timestamp_ns,
            value,
        }
    }

    /// The series this reading belongs to.
    pub fn key(&self) -> &SeriesKey {
        &self.key
    }

    /// Receipt time in nanoseconds since the Unix epoch.
    pub fn timestamp_ns(&self) -> u64 {
        self.timestamp_ns
    }

    /// The measured value.
    pub fn value(&self) -> f64 {
        self.value
    }

    /// The `(timestamp_ns, value)` pair stored in a series.
    pub fn point(&self) -> (u64, f64) {
        (self.timestamp_ns, self.value)
    }
}

/// Insertion-ordered, head-evicted sequence of points for one key.
#[derive(Debug, Clone, Default)]
pub struct Series {
    points: VecDeque<(u64, f64)>,
}

impl Series {
    /// Creates an empty series.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty series with room for `capacity` points.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            points: VecDeque::with_capacity(capacity),
        }
    }

    /// Appends a point at the tail.
    pub fn push(&mut self, timestamp_ns: u64, value: f64) {
        self.points.push_back((timestamp_ns, value));
    }

    /// Evicts from the head until `policy` holds at `now_ns`.
    ///
    /// Returns the number of evicted points.
    pub fn enforce(&mut self, policy: &RetentionPolicy, now_ns: u64) -> usize {
        let before = self.points.len();

        if let Some(cap) = policy.point_cap() {
            while self.points.len() > cap {
                self.points.pop_front();
            }
        }

        while self
            .points
            .front()
            .is_some_and(|&(timestamp, _)| policy.is_expired(timestamp, now_ns))
        {
            self.points.pop_front();
        }

        before - self.points.len()
    }

    /// Copies out the points inside `[now_ns - window, now_ns]`.
    ///
    /// Points stamped after `now_ns` are held back until the clock reaches
    /// them, so a clock that steps backwards never shows future readings.
    /// The series itself is not modified.
    pub fn points(&self, policy: &RetentionPolicy, now_ns: u64) -> Vec<(u64, f64)> {
        self.points
            .iter()
            .filter(|&&(timestamp, _)| {
                timestamp <= now_ns && !policy.is_expired(timestamp, now_ns)
            })
            .copied()
            .collect()
    }

    /// Number of stored points, including any not yet evicted.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the series is drained.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// The oldest stored point.
    pub fn oldest(&self) -> Option<(u64, f64)> {
        self.points.front().copied()
    }

    /// The newest stored point.
    pub fn newest(&self) -> Option<(u64, f64)> {
        self.points.back().copied()
    }

    /// Iterates over stored points, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &(u64, f64)> {
        self.points.iter()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::clock::NANOS_PER_SEC;

    fn secs(s: u64) -> u64 {
        s * NANOS_PER_SEC
    }

    fn both(window_secs: u64, cap: usize) -> RetentionPolicy {
        RetentionPolicy::new(Some(Duration::from_secs(window_secs)), Some(cap)).unwrap()
    }

    #[test]
    fn test_key_display_and_order() {
        let a = SeriesKey::new("cityA", "potencia");
        let b = SeriesKey::new("cityB", "corrente");
        assert_eq!(a.to_string(), "cityA/potencia");
        assert!(a < b);
        assert!(SeriesKey::single("energia").is_default_entity());
    }

    #[test]
    fn test_reading_point() {
        let r = Reading::new(SeriesKey::single("x"), 42, 1.5);
        assert_eq!(r.point(), (42, 1.5));
        assert_eq!(r.key().parameter, "x");
    }

    #[test]
    fn test_enforce_time_window() {
        let policy = both(60, 100);
        let mut series = Series::new();
        series.push(secs(0), 10.0);
        series.push(secs(30), 20.0);
        series.push(secs(70), 30.0);

        let evicted = series.enforce(&policy, secs(70));

        assert_eq!(evicted, 1);
        assert_eq!(series.points(&policy, secs(70)), vec![(secs(30), 20.0), (secs(70), 30.0)]);
    }

    #[test]
    fn test_enforce_point_cap_wins_inside_window() {
        let policy = both(3600, 3);
        let mut series = Series::new();
        for i in 0..5 {
            series.push(secs(i), f64::from(u32::try_from(i).unwrap()));
        }

        series.enforce(&policy, secs(5));

        assert_eq!(series.len(), 3);
        assert_eq!(series.oldest(), Some((secs(2), 2.0)));
        assert_eq!(series.newest(), Some((secs(4), 4.0)));
    }

    #[test]
    fn test_enforce_drains_to_empty() {
        let policy = RetentionPolicy::window(Duration::from_secs(10)).unwrap();
        let mut series = Series::new();
        series.push(secs(1), 1.0);
        series.push(secs(2), 2.0);

        assert_eq!(series.enforce(&policy, secs(100)), 2);
        assert!(series.is_empty());

        series.push(secs(100), 3.0);
        series.enforce(&policy, secs(100));
        assert_eq!(series.len(), 1);
    }

    #[test]
    fn test_out_of_order_entry_kept_in_arrival_order() {
        let policy = RetentionPolicy::window(Duration::from_secs(60)).unwrap();
        let mut series = Series::new();
        series.push(secs(50), 1.0);
        series.push(secs(40), 2.0);

        series.enforce(&policy, secs(55));
        let points: Vec<_> = series.iter().copied().collect();
        assert_eq!(points, vec![(secs(50), 1.0), (secs(40), 2.0)]);
    }

    #[test]
    fn test_points_filters_stale_entries_behind_newer_head() {
        let policy = RetentionPolicy::window(Duration::from_secs(60)).unwrap();
        let mut series = Series::new();
        series.push(secs(100), 1.0);
        series.push(secs(10), 2.0);

        series.enforce(&policy, secs(100));
        // Head is fresh, so the late entry survives in storage...
        assert_eq!(series.len(), 2);
        // ...but never shows up in a copy.
        assert_eq!(series.points(&policy, secs(100)), vec![(secs(100), 1.0)]);
    }

    #[test]
    fn test_points_hides_entries_newer_than_now() {
        let policy = both(60, 100);
        let mut series = Series::new();
        series.push(secs(40), 1.0);
        series.push(secs(100), 2.0);

        // Clock stepped back to 50 s after the second append.
        assert_eq!(series.enforce(&policy, secs(50)), 0);
        assert_eq!(series.points(&policy, secs(50)), vec![(secs(40), 1.0)]);
        assert!(series.points(&policy, secs(50)).iter().all(|&(t, _)| t <= secs(50)));
        assert_eq!(series.len(), 2);
    }

    #[test]
    fn test_points_count_only_returns_everything() {
        let policy = RetentionPolicy::max_points(2).unwrap();
        let mut series = Series::with_capacity(2);
        series.push(1, 1.0);
        series.push(2, 2.0);
        series.push(3, 3.0);
        series.enforce(&policy, u64::MAX);
        assert_eq!(series.points(&policy, u64::MAX), vec![(2, 2.0), (3, 3.0)]);
    }
}
