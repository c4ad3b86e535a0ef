//! Point-in-time copies of series for the consumption layer.
//!
//! A [`Snapshot`] is what a render pass receives: the key, an owned copy of
//! the window, and the store time at which the copy was taken. It never
//! aliases store memory, so it can be held across rendering or I/O.
//!
//! An empty snapshot is the normal "no data yet" state. [`Snapshot::summary`]
//! returns `None` for it, which lets a dashboard show "waiting" instead of a
//! zero.

use serde::Serialize;

use crate::series::{Reading, SeriesKey};

/// Consistent copy of one series at one instant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    /// The series this copy belongs to.
    key: SeriesKey,
    /// `(timestamp_ns, value)` pairs, oldest first.
    points: Vec<(u64, f64)>,
    /// Store time at which the copy was taken.
    taken_at_ns: u64,
}

impl Snapshot {
    /// Creates a snapshot.
    pub fn new(key: SeriesKey, points: Vec<(u64, f64)>, taken_at_ns: u64) -> Self {
        Self {
            key,
            points,
            taken_at_ns,
        }
    }

    /// The series this copy belongs to.
    pub fn key(&self) -> &SeriesKey {
        &self.key
    }

    /// The copied points, oldest first.
    pub fn points(&self) -> &[(u64, f64)] {
        &self.points
    }

    /// Store time at which the copy was taken.
    pub fn taken_at_ns(&self) -> u64 {
        self.taken_at_ns
    }

    /// Number of points in the copy.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether no data has arrived inside the window.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// The most recently appended point.
    pub fn latest(&self) -> Option<(u64, f64)> {
        self.points.last().copied()
    }

    /// Iterates over values only, oldest first.
    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.points.iter().map(|&(_, value)| value)
    }

    /// Expands the copy into owned readings, oldest first.
    pub fn readings(&self) -> impl Iterator<Item = Reading> + '_ {
        self.points
            .iter()
            .map(|&(timestamp_ns, value)| Reading::new(self.key.clone(), timestamp_ns, value))
    }

    /// Statistics over the window, or `None` when it is empty.
    pub fn summary(&self) -> Option<Summary> {
        Summary::of(&self.points)
    }

    /// Consumes the snapshot, returning its key and points.
    pub fn into_parts(self) -> (SeriesKey, Vec<(u64, f64)>) {
        (self.key, self.points)
    }

}

impl IntoIterator for Snapshot {
    type Item = (u64, f64);
    type IntoIter = std::vec::IntoIter<(u64, f64)>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.into_iter()
    }
}

/// Display statistics for one window: current reading, mean and extremes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Summary {
    /// Number of points in the window.
    pub count: usize,
    /// Value of the most recent point.
    pub latest: f64,
    /// Arithmetic mean over the window.
    pub mean: f64,
    /// Smallest value in the window.
    pub min: f64,
    /// Largest value in the window.
    pub max: f64,
}

impl Summary {
    /// Summarises `points`, or returns `None` if there are none.
    #[allow(clippy::cast_precision_loss)] // Window lengths are far below 2^52
    pub fn of(points: &[(u64, f64)]) -> Option<Self> {
        let &(_, latest) = points.last()?;
        let (sum, min, max) = points.iter().fold(
            (0.0, f64::INFINITY, f64::NEG_INFINITY),
            |(sum, min, max), &(_, v)| (sum + v, min.min(v), max.max(v)),
        );
        Some(Self {
            count: points.len(),
            latest,
            mean: sum / points.len() as f64,
            min,
            max,
        })
    }
}
