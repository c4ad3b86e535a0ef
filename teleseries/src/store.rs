//! The windowed, multi-series telemetry store.
//!
//! [`SeriesStore`] owns one [`Series`] per `(entity, parameter)` key together
//! with the [`TopicRouter`] describing which keys are currently tracked. Both
//! live behind a single [`parking_lot::Mutex`], so every operation observes
//! and leaves behind one consistent state:
//!
//! - [`append`](SeriesStore::append) pushes a point and evicts under the lock
//! - [`snapshot`](SeriesStore::snapshot) copies a series out under the lock
//! - [`reset`](SeriesStore::reset) swaps the tracked selection and the series
//!   map together, so a route computed against the old selection can never
//!   land in the new one
//!
//! The lock is held only for the in-memory mutation or copy. Logging happens
//! after the guard is released, and readers never see a live reference into
//! the store.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use teleseries::clock::{ManualClock, NANOS_PER_SEC};
//! use teleseries::retention::RetentionPolicy;
//! use teleseries::series::SeriesKey;
//! use teleseries::store::SeriesStore;
//! use teleseries::topic::TopicRouter;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let clock = ManualClock::at_secs(0);
//! let store = SeriesStore::with_clock(
//!     TopicRouter::new("bess", Vec::<String>::new(), ["energia"])?,
//!     RetentionPolicy::new(Some(Duration::from_secs(60)), Some(100))?,
//!     Arc::new(clock.clone()),
//! );
//! let key = SeriesKey::single("energia");
//!
//! for (t, v) in [(0, 10.0), (30, 20.0), (70, 30.0)] {
//!     clock.set_secs(t);
//!     store.append(&key, t * NANOS_PER_SEC, v);
//! }
//!
//! assert_eq!(
//!     store.snapshot(&key),
//!     vec![(30 * NANOS_PER_SEC, 20.0), (70 * NANOS_PER_SEC, 30.0)],
//! );
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::clock::{Clock, SystemClock};
use crate::retention::RetentionPolicy;
use crate::series::{Series, SeriesKey};
use crate::snapshot::Snapshot;
use crate::topic::TopicRouter;

/// Upper bound on per-series preallocation, whatever the point cap.
const MAX_PREALLOC: usize = 1024;

/// Thread-safe store of windowed series.
///
/// Share it between the ingestion path and the consumption path with an
/// [`Arc`]. All methods take `&self`.
#[derive(Debug)]
pub struct SeriesStore {
    /// Bounds applied to every series.
    retention: RetentionPolicy,
    /// Time source for eviction and for stamping readings.
    clock: Arc<dyn Clock>,
    /// Everything that changes, behind one lock.
    state: Mutex<StoreState>,
}

/// The lock-protected part of the store.
#[derive(Debug)]
struct StoreState {
    /// Current tracked selection.
    router: TopicRouter,
    /// One series per known key.
    series: HashMap<SeriesKey, Series>,
}

impl SeriesStore {
    /// Creates a store on the system clock.
    ///
    /// Every key tracked by `router` is registered up front as an empty
    /// series.
    pub fn new(router: TopicRouter, retention: RetentionPolicy) -> Self {
        Self::with_clock(router, retention, Arc::new(SystemClock))
    }

    /// Creates a store on a specific clock.
    pub fn with_clock(
        router: TopicRouter,
        retention: RetentionPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let series = Self::preregistered(&router, &retention);
        Self {
            retention,
            clock,
            state: Mutex::new(StoreState { router, series }),
        }
    }

    /// Current time according to the store's clock.
    pub fn now_ns(&self) -> u64 {
        self.clock.now_ns()
    }

    /// The retention policy applied to every series.
    pub fn retention(&self) -> RetentionPolicy {
        self.retention
    }

    /// A copy of the currently tracked selection.
    pub fn router(&self) -> TopicRouter {
        self.state.lock().router.clone()
    }

    /// Appends a point to `key`, creating the series if needed, then evicts.
    ///
    /// `append` trusts its input: routing and payload validation happen
    /// upstream. It never fails.
    pub fn append(&self, key: &SeriesKey, timestamp_ns: u64, value: f64) {
        let now = self.clock.now_ns();
        let (len, evicted) = {
            let mut state = self.state.lock();
            self.append_locked(&mut state, key, timestamp_ns, value, now)
        };

        if evicted > 0 {
            tracing::trace!(series = %key, evicted, len, "evicted points");
        }
    }

    /// Routes `topic` with the current selection and appends on success.
    ///
    /// Routing and appending happen under the same lock acquisition. Returns
    /// the key the point landed in, or `None` if the topic is unroutable.
    pub fn ingest(&self, topic: &str, timestamp_ns: u64, value: f64) -> Option<SeriesKey> {
        let now = self.clock.now_ns();
        let (key, evicted) = {
            let mut state = self.state.lock();
            let key = state.router.route(topic)?;
            let (_, evicted) = self.append_locked(&mut state, &key, timestamp_ns, value, now);
            (key, evicted)
        };

        if evicted > 0 {
            tracing::trace!(series = %key, evicted, "evicted points");
        }
        Some(key)
    }

    /// Copies the current window of `key`, oldest first.
    ///
    /// Unknown keys yield an empty vector.
    pub fn snapshot(&self, key: &SeriesKey) -> Vec<(u64, f64)> {
        let now = self.clock.now_ns();
        let state = self.state.lock();
        state
            .series
            .get(key)
            .map(|series| series.points(&self.retention, now))
            .unwrap_or_default()
    }

    /// Copies the current window of every key in `keys`.
    ///
    /// The whole batch is copied under one lock acquisition. Unknown keys map
    /// to empty vectors.
    pub fn snapshot_all(&self, keys: &[SeriesKey]) -> HashMap<SeriesKey, Vec<(u64, f64)>> {
        self.snapshots(keys)
            .into_iter()
            .map(Snapshot::into_parts)
            .collect()
    }

    /// Copies the current window of every key in `keys` into [`Snapshot`]s,
    /// preserving request order.
    pub fn snapshots(&self, keys: &[SeriesKey]) -> Vec<Snapshot> {
        let now = self.clock.now_ns();
        let state = self.state.lock();
        keys.iter()
            .map(|key| {
                let points = state
                    .series
                    .get(key)
                    .map(|series| series.points(&self.retention, now))
                    .unwrap_or_default();
                Snapshot::new(key.clone(), points, now)
            })
            .collect()
    }

    /// Replaces the tracked selection and clears all series.
    ///
    /// Every key tracked by `router` is registered as an empty series. Points
    /// for keys outside the new selection are dropped, and topics for them
    /// route to nothing from now on.
    pub fn reset(&self, router: TopicRouter) {
        let series = Self::preregistered(&router, &self.retention);
        let tracked = series.len();
        let old = {
            let mut state = self.state.lock();
            state.router = router;
            std::mem::replace(&mut state.series, series)
        };
        let dropped: usize = old.values().map(Series::len).sum();

        tracing::info!(tracked, dropped, "series store reset");
    }

    /// Registers an empty series for `key` if it is not known yet.
    ///
    /// Returns `true` if the series was created.
    pub fn register(&self, key: SeriesKey) -> bool {
        let mut state = self.state.lock();
        if state.series.contains_key(&key) {
            return false;
        }
        state.series.insert(key, self.new_series());
        true
    }

    /// Keys of the current selection, sorted by entity then parameter.
    pub fn tracked_keys(&self) -> Vec<SeriesKey> {
        self.state.lock().router.keys()
    }

    /// All known keys, sorted by entity then parameter.
    pub fn keys(&self) -> Vec<SeriesKey> {
        let mut keys: Vec<SeriesKey> = self.state.lock().series.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Number of points currently stored for `key`.
    ///
    /// This counts stored points, including any that have aged past the
    /// window but have not been evicted by an append yet.
    pub fn len(&self, key: &SeriesKey) -> usize {
        self.state.lock().series.get(key).map_or(0, Series::len)
    }

    /// Total points stored across all series.
    pub fn total_points(&self) -> usize {
        self.state.lock().series.values().map(Series::len).sum()
    }

    /// Pushes and evicts with the lock already held.
    ///
    /// Returns `(len_after, evicted)`.
    fn append_locked(
        &self,
        state: &mut StoreState,
        key: &SeriesKey,
        timestamp_ns: u64,
        value: f64,
        now_ns: u64,
    ) -> (usize, usize) {
        // Look up by reference first so the common path does not clone the key.
        if !state.series.contains_key(key) {
            state.series.insert(key.clone(), self.new_series());
        }
        let Some(series) = state.series.get_mut(key) else {
            return (0, 0);
        };
        series.push(timestamp_ns, value);
        let evicted = series.enforce(&self.retention, now_ns);
        (series.len(), evicted)
    }

    fn new_series(&self) -> Series {
        Self::series_for(&self.retention)
    }

    fn series_for(retention: &RetentionPolicy) -> Series {
        let capacity = retention
            .point_cap()
            .map_or(0, |cap| cap.saturating_add(1).min(MAX_PREALLOC));
        Series::with_capacity(capacity)
    }

    fn preregistered(
        router: &TopicRouter,
        retention: &RetentionPolicy,
    ) -> HashMap<SeriesKey, Series> {
        router
            .keys()
            .into_iter()
            .map(|key| (key, Self::series_for(retention)))
            .collect()
    }
}
