//! Snapshot reader and periodic poller for the consumption layer.
//!
//! The consumption side of a dashboard pulls; the store never pushes. A
//! [`SnapshotReader`] wraps a shared store with read-only access, and a
//! [`Poller`] drives one on a fixed cadence from its own thread until it is
//! stopped:
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use teleseries::reader::{Poller, SnapshotReader};
//! use teleseries::retention::RetentionPolicy;
//! use teleseries::store::SeriesStore;
//! use teleseries::topic::TopicRouter;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(SeriesStore::new(
//!     TopicRouter::new("bess", Vec::<String>::new(), ["energia"])?,
//!     RetentionPolicy::default(),
//! ));
//! let reader = SnapshotReader::new(Arc::clone(&store));
//!
//! let poller = Poller::spawn(reader, Duration::from_secs(1), |snapshots| {
//!     for snap in snapshots {
//!         match snap.summary() {
//!             Some(s) => println!("{}: {:.2} (mean {:.2})", snap.key(), s.latest, s.mean),
//!             None => println!("{}: waiting...", snap.key()),
//!         }
//!     }
//! })?;
//!
//! std::thread::sleep(Duration::from_secs(5));
//! poller.stop();
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::error::{Result, TeleseriesError};
use crate::series::SeriesKey;
use crate::snapshot::Snapshot;
use crate::store::SeriesStore;
use crate::topic::TopicRouter;

/// Read-only view of a store for render passes.
#[derive(Debug, Clone)]
pub struct SnapshotReader {
    store: Arc<SeriesStore>,
}

impl SnapshotReader {
    /// Creates a reader over `store`.
    pub fn new(store: Arc<SeriesStore>) -> Self {
        Self { store }
    }

    /// Copies the windows of `keys`, in request order.
    pub fn get(&self, keys: &[SeriesKey]) -> Vec<Snapshot> {
        self.store.snapshots(keys)
    }

    /// Copies the window of a single key.
    pub fn get_one(&self, key: &SeriesKey) -> Snapshot {
        // snapshots() yields exactly one entry per requested key.
        self.store
            .snapshots(std::slice::from_ref(key))
            .pop()
            .unwrap_or_else(|| Snapshot::new(key.clone(), Vec::new(), self.store.now_ns()))
    }

    /// Copies the windows of every currently tracked key.
    pub fn get_tracked(&self) -> Vec<Snapshot> {
        let keys = self.store.tracked_keys();
        self.store.snapshots(&keys)
    }

    /// Switches the session to a new selection.
    ///
    /// The store is reset to `router`'s keys; ingestion for keys outside it
    /// becomes unroutable from this point on.
    pub fn reselect(&self, router: TopicRouter) {
        self.store.reset(router);
    }
}

/// Which keys a poller reads on each tick.
#[derive(Debug, Clone)]
enum PollTarget {
    /// Whatever the store tracks at the time of the tick.
    Tracked,
    /// A fixed list, in this order.
    Keys(Vec<SeriesKey>),
}

/// Handle to a background thread that reads snapshots on a fixed cadence.
///
/// The first read happens immediately. Dropping the handle stops the thread
/// the same way [`Poller::stop`] does.
#[derive(Debug)]
pub struct Poller {
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<u64>>,
}

impl Poller {
    /// Polls every tracked key each `cadence`, following store resets.
    ///
    /// # Errors
    ///
    /// Returns [`TeleseriesError::Spawn`] if the thread cannot be started.
    pub fn spawn<F>(reader: SnapshotReader, cadence: Duration, on_tick: F) -> Result<Self>
    where
        F: FnMut(&[Snapshot]) + Send + 'static,
    {
        Self::start(reader, PollTarget::Tracked, cadence, on_tick)
    }

    /// Polls a fixed list of keys each `cadence`.
    ///
    /// # Errors
    ///
    /// Returns [`TeleseriesError::Spawn`] if the thread cannot be started.
    pub fn spawn_keys<F>(
        reader: SnapshotReader,
        keys: Vec<SeriesKey>,
        cadence: Duration,
        on_tick: F,
    ) -> Result<Self>
    where
        F: FnMut(&[Snapshot]) + Send + 'static,
    {
        Self::start(reader, PollTarget::Keys(keys), cadence, on_tick)
    }

    /// Stops the poller and waits for its thread.
    ///
    /// Returns the number of ticks that ran. Does not wait out the rest of
    /// the current interval.
    pub fn stop(mut self) -> u64 {
        self.shutdown()
    }

    fn start<F>(
        reader: SnapshotReader,
        target: PollTarget,
        cadence: Duration,
        mut on_tick: F,
    ) -> Result<Self>
    where
        F: FnMut(&[Snapshot]) + Send + 'static,
    {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let handle = thread::Builder::new()
            .name("teleseries-poller".to_string())
            .spawn(move || {
                let mut ticks = 0u64;
                loop {
                    let snapshots = match &target {
                        PollTarget::Tracked => reader.get_tracked(),
                        PollTarget::Keys(keys) => reader.get(keys),
                    };
                    on_tick(&snapshots);
                    ticks += 1;

                    match stop_rx.recv_timeout(cadence) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                ticks
            })
            .map_err(TeleseriesError::Spawn)?;

        tracing::debug!(?cadence, "poller started");

        Ok(Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }

    fn shutdown(&mut self) -> u64 {
        // Dropping the sender wakes the thread out of recv_timeout.
        drop(self.stop_tx.take());
        let Some(handle) = self.handle.take() else {
            return 0;
        };
        match handle.join() {
            Ok(ticks) => {
                tracing::debug!(ticks, "poller stopped");
                ticks
            }
            Err(_) => {
                tracing::warn!("poller callback panicked");
                0
            }
        }
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.shutdown();
    }
}
