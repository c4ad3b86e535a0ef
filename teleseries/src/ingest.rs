//! Ingestion adapter between a pub/sub transport and the store.
//!
//! The transport delivers `(topic, payload)` pairs on its own thread and calls
//! [`IngestionAdapter::on_message`] for each one. The adapter:
//!
//! 1. decodes the payload as UTF-8 decimal text
//! 2. stamps it with the store clock at receipt time
//! 3. routes the topic and appends, in one store operation
//!
//! Anything that fails along the way is dropped. A long-running ingestion
//! loop must survive a bad sample, so nothing is surfaced to the transport;
//! the [`IngestOutcome`] return value and the [`IngestStats`] counters are
//! there for callers that want to look.
//!
//! The adapter also records connect/disconnect notifications from the
//! transport, so a dashboard can tell "no data yet" apart from "lost the
//! broker".

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};

use serde::Serialize;

use crate::error::PayloadError;
use crate::series::SeriesKey;
use crate::store::SeriesStore;

/// What happened to one inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// The value was appended to this series.
    Appended(SeriesKey),
    /// The payload was not a finite decimal number.
    Malformed,
    /// The topic does not map to a tracked key.
    Unroutable,
}

/// Transport connectivity as last reported to the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No connect or disconnect has been reported yet.
    Connecting,
    /// The transport reported a successful connection.
    Connected,
    /// The transport reported losing its connection.
    Disconnected,
}

impl ConnectionState {
    fn as_u8(self) -> u8 {
        match self {
            Self::Connecting => 0,
            Self::Connected => 1,
            Self::Disconnected => 2,
        }
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Connected,
            2 => Self::Disconnected,
            _ => Self::Connecting,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
        })
    }
}

/// Message counters since the adapter was created.
///
/// `received == appended + malformed + unroutable` once all in-flight calls
/// have returned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestStats {
    /// Messages handed to `on_message`.
    pub received: u64,
    /// Messages that reached the store.
    pub appended: u64,
    /// Messages dropped for a bad payload.
    pub malformed: u64,
    /// Messages dropped for an untracked topic.
    pub unroutable: u64,
}

#[derive(Debug, Default)]
struct Counters {
    received: AtomicU64,
    appended: AtomicU64,
    malformed: AtomicU64,
    unroutable: AtomicU64,
}

/// Turns raw transport messages into store appends.
///
/// Cheap to clone; clones share the store, counters and connection state.
///
/// ```rust
/// use std::sync::Arc;
/// use teleseries::ingest::{IngestionAdapter, IngestOutcome};
/// use teleseries::retention::RetentionPolicy;
/// use teleseries::series::SeriesKey;
/// use teleseries::store::SeriesStore;
/// use teleseries::topic::TopicRouter;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let store = Arc::new(SeriesStore::new(
///     TopicRouter::new("bess/telemetria", ["natal"], ["potencia"])?,
///     RetentionPolicy::default(),
/// ));
/// let adapter = IngestionAdapter::new(Arc::clone(&store));
///
/// let outcome = adapter.on_message("bess/telemetria/natal/potencia", b"51.25");
/// assert_eq!(outcome, IngestOutcome::Appended(SeriesKey::new("natal", "potencia")));
/// let outcome = adapter.on_message("bess/telemetria/natal/potencia", b"n/a");
/// assert_eq!(outcome, IngestOutcome::Malformed);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct IngestionAdapter {
    store: Arc<SeriesStore>,
    counters: Arc<Counters>,
    connection: Arc<AtomicU8>,
}

impl IngestionAdapter {
    /// Creates an adapter feeding `store`.
    pub fn new(store: Arc<SeriesStore>) -> Self {
        Self {
            store,
            counters: Arc::new(Counters::default()),
            connection: Arc::new(AtomicU8::new(ConnectionState::Connecting.as_u8())),
        }
    }

    /// The store this adapter feeds.
    pub fn store(&self) -> &Arc<SeriesStore> {
        &self.store
    }

    /// Handles one inbound message.
    ///
    /// Never fails and never blocks on anything but the store lock.
    pub fn on_message(&self, topic: &str, payload: &[u8]) -> IngestOutcome {
        self.counters.received.fetch_add(1, Ordering::Relaxed);

        let value = match parse_payload(payload) {
            Ok(value) => value,
            Err(error) => {
                self.counters.malformed.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(topic, %error, "discarding malformed payload");
                return IngestOutcome::Malformed;
            }
        };

        let now = self.store.now_ns();
        match self.store.ingest(topic, now, value) {
            Some(key) => {
                self.counters.appended.fetch_add(1, Ordering::Relaxed);
                IngestOutcome::Appended(key)
            }
            None => {
                self.counters.unroutable.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(topic, "discarding unroutable topic");
                IngestOutcome::Unroutable
            }
        }
    }

    /// Records that the transport connected (or reconnected).
    pub fn on_connect(&self) {
        let previous = self.swap_connection(ConnectionState::Connected);
        if previous != ConnectionState::Connected {
            tracing::info!(%previous, "transport connected");
        }
    }

    /// Records that the transport lost its connection.
    ///
    /// Data already in the store stays readable and ages out normally.
    pub fn on_disconnect(&self) {
        let previous = self.swap_connection(ConnectionState::Disconnected);
        if previous != ConnectionState::Disconnected {
            tracing::warn!(%previous, "transport disconnected");
        }
    }

    /// Last connectivity reported by the transport.
    pub fn connection_state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.connection.load(Ordering::Acquire))
    }

    /// Current message counters.
    pub fn stats(&self) -> IngestStats {
        IngestStats {
            received: self.counters.received.load(Ordering::Relaxed),
            appended: self.counters.appended.load(Ordering::Relaxed),
            malformed: self.counters.malformed.load(Ordering::Relaxed),
            unroutable: self.counters.unroutable.load(Ordering::Relaxed),
        }
    }

    fn swap_connection(&self, state: ConnectionState) -> ConnectionState {
        ConnectionState::from_u8(self.connection.swap(state.as_u8(), Ordering::AcqRel))
    }
}

/// Parses a plain UTF-8 decimal payload.
///
/// Surrounding whitespace is ignored. NaN and infinities are rejected.
///
/// # Errors
///
/// Returns [`PayloadError`] if the bytes are not UTF-8, not a number, or not
/// finite.
pub fn parse_payload(payload: &[u8]) -> Result<f64, PayloadError> {
    let text = std::str::from_utf8(payload)?;
    let value: f64 = text.trim().parse()?;
    if !value.is_finite() {
        return Err(PayloadError::NonFinite(value));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::retention::RetentionPolicy;
    use crate::topic::TopicRouter;

    fn adapter() -> (IngestionAdapter, ManualClock) {
        let clock = ManualClock::at_secs(100);
        let store = SeriesStore::with_clock(
            TopicRouter::new("bess", Vec::<String>::new(), ["energia"]).unwrap(),
            RetentionPolicy::default(),
            Arc::new(clock.clone()),
        );
        (IngestionAdapter::new(Arc::new(store)), clock)
    }

    #[test]
    fn test_parse_payload() {
        assert_eq!(parse_payload(b"42.5"), Ok(42.5));
        assert_eq!(parse_payload(b" -3\n"), Ok(-3.0));
        assert_eq!(parse_payload(b"1e3"), Ok(1000.0));
        assert!(matches!(parse_payload(b"not-a-number"), Err(PayloadError::InvalidNumber(_))));
        assert!(matches!(parse_payload(&[0xff, 0xfe]), Err(PayloadError::InvalidUtf8(_))));
        assert!(matches!(parse_payload(b"NaN"), Err(PayloadError::NonFinite(_))));
        assert!(matches!(parse_payload(b"inf"), Err(PayloadError::NonFinite(_))));
        assert!(parse_payload(b"").is_err());
    }

    #[test]
    fn test_malformed_payload_leaves_series_unchanged() {
        let (adapter, _) = adapter();
        let key = SeriesKey::single("energia");
        adapter.on_message("bess/energia", b"1.0");
        let before = adapter.store().snapshot(&key).len();

        assert_eq!(adapter.on_message("bess/energia", b"not-a-number"), IngestOutcome::Malformed);

        assert_eq!(adapter.store().snapshot(&key).len(), before);
    }

    #[test]
    fn test_value_stamped_with_receipt_time() {
        let (adapter, clock) = adapter();
        clock.set_secs(123);
        adapter.on_message("bess/energia", b"7");
        let points = adapter.store().snapshot(&SeriesKey::single("energia"));
        assert_eq!(points, vec![(123_000_000_000, 7.0)]);
    }

    #[test]
    fn test_stats_account_for_every_message() {
        let (adapter, _) = adapter();
        adapter.on_message("bess/energia", b"1");
        adapter.on_message("bess/energia", b"1");
        adapter.on_message("bess/energia", b"x");
        adapter.on_message("bess/outro", b"1");

        let stats = adapter.stats();
        assert_eq!(
            stats,
            IngestStats {
                received: 4,
                appended: 2,
                malformed: 1,
                unroutable: 1,
            }
        );
    }

    #[test]
    fn test_connection_state_transitions() {
        let (adapter, _) = adapter();
        assert_eq!(adapter.connection_state(), ConnectionState::Connecting);
        adapter.on_connect();
        assert_eq!(adapter.connection_state(), ConnectionState::Connected);

        let clone = adapter.clone();
        clone.on_disconnect();
        assert_eq!(adapter.connection_state(), ConnectionState::Disconnected);
        assert_eq!(adapter.connection_state().to_string(), "disconnected");
    }

    #[test]
    fn test_data_survives_disconnect() {
        let (adapter, _) = adapter();
        adapter.on_connect();
        adapter.on_message("bess/energia", b"9.5");
        adapter.on_disconnect();
        assert_eq!(adapter.store().snapshot(&SeriesKey::single("energia")).len(), 1);
    }
}
