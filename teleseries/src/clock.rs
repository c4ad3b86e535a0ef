//! Time sources for stamping and evicting readings.
//!
//! Timestamps throughout teleseries are `u64` nanoseconds since the Unix
//! epoch. The transport does not carry timestamps, so every reading is stamped
//! with the receiving side's [`Clock`] at the moment it arrives, and the same
//! clock decides what has aged out of the retention window.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Nanoseconds in one second.
pub const NANOS_PER_SEC: u64 = 1_000_000_000;

/// A source of "now", in nanoseconds since the Unix epoch.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Returns the current time in nanoseconds since the Unix epoch.
    fn now_ns(&self) -> u64;
}

/// Wall-clock time from [`SystemTime`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[allow(clippy::cast_possible_truncation)] // Current epoch nanos fit in u64 until year 2554
    fn now_ns(&self) -> u64 {
        // A clock set before 1970 reads as the epoch rather than panicking.
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_nanos() as u64)
    }
}

/// A manually driven clock for replays and tests.
///
/// Clones share the same underlying time, so a test can hand one clone to a
/// store and keep another to advance time.
///
/// ```rust
/// use teleseries::clock::{Clock, ManualClock};
/// use std::time::Duration;
///
/// let clock = ManualClock::at_secs(10);
/// let handle = clock.clone();
/// handle.advance(Duration::from_secs(5));
/// assert_eq!(clock.now_ns(), 15_000_000_000);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now_ns: Arc<AtomicU64>,
}

impl ManualClock {
    /// Creates a clock reading `now_ns`.
    pub fn new(now_ns: u64) -> Self {
        Self {
            now_ns: Arc::new(AtomicU64::new(now_ns)),
        }
    }

    /// Creates a clock reading whole seconds since the epoch.
    pub fn at_secs(secs: u64) -> Self {
        Self::new(secs.saturating_mul(NANOS_PER_SEC))
    }

    /// Sets the current time.
    pub fn set(&self, now_ns: u64) {
        self.now_ns.store(now_ns, Ordering::SeqCst);
    }

    /// Sets the current time in whole seconds.
    pub fn set_secs(&self, secs: u64) {
        self.set(secs.saturating_mul(NANOS_PER_SEC));
    }

    /// Moves the clock forward, saturating at `u64::MAX`.
    pub fn advance(&self, by: Duration) {
        let by_ns = duration_ns(by);
        // fetch_update only fails if the closure returns None, which it never does.
        let _ = self
            .now_ns
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |now| {
                Some(now.saturating_add(by_ns))
            });
    }
}

impl Clock for ManualClock {
    fn now_ns(&self) -> u64 {
        self.now_ns.load(Ordering::SeqCst)
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now_ns(&self) -> u64 {
        (**self).now_ns()
    }
}

/// Converts a duration to nanoseconds, saturating at `u64::MAX`.
pub fn duration_ns(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}
