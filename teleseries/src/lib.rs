//! # teleseries
//!
//! Time-windowed, multi-series telemetry buffer with concurrent ingestion.
//!
//! teleseries sits between a publish/subscribe transport (MQTT-style topics
//! carrying one decimal reading per message) and a live dashboard. It keeps
//! only the most recent window of readings per `(entity, parameter)` pair and
//! hands the render loop consistent copies while the transport keeps writing.
//!
//! ## Key Properties
//!
//! - One lock, held only for in-memory mutation or copy-out
//! - Retention by age, by count, or both; the count cap always wins
//! - Strictly FIFO eviction from the oldest end of each series
//! - Malformed payloads and untracked topics are dropped, never raised
//! - Snapshots are owned copies; readers never see a torn window
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use teleseries::{IngestionAdapter, SeriesKey, SessionConfig, SnapshotReader};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut config = SessionConfig::new("bess/telemetria", ["potencia", "tensao", "corrente"]);
//! config.entities = vec!["natal".to_string()];
//!
//! let store = Arc::new(config.build_store()?);
//! let adapter = IngestionAdapter::new(Arc::clone(&store));
//! let reader = SnapshotReader::new(Arc::clone(&store));
//!
//! // Transport callback thread
//! adapter.on_message("bess/telemetria/natal/potencia", b"48.7");
//!
//! // Render thread
//! let snap = reader.get_one(&SeriesKey::new("natal", "potencia"));
//! assert_eq!(snap.latest().map(|(_, v)| v), Some(48.7));
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`TopicRouter`]: Maps topics to `(entity, parameter)` keys
//! - [`SeriesStore`]: Lock-protected map of windowed series
//! - [`IngestionAdapter`]: Parses payloads, routes, appends
//! - [`SnapshotReader`] / [`Poller`]: Pull-side reads on a cadence
//! - [`SessionConfig`]: JSON configuration surface
//!
//! ## Modules
//!
//! - [`clock`]: Time sources
//! - [`config`]: Session configuration
//! - [`ingest`]: Transport-facing ingestion adapter
//! - [`reader`]: Snapshot reader and poller
//! - [`retention`]: Age/count retention policy
//! - [`series`]: Series keys and windowed sequences
//! - [`snapshot`]: Snapshot and summary types
//! - [`store`]: The series store
//! - [`topic`]: Topic routing and subscription filters
//! - [`error`]: Error types

pub mod clock;
pub mod config;
pub mod error;
pub mod ingest;
pub mod reader;
pub mod retention;
pub mod series;
pub mod snapshot;
pub mod store;
pub mod topic;

// Re-export primary API types at crate root for convenience.
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::SessionConfig;
pub use error::{Result, TeleseriesError};
pub use ingest::{ConnectionState, IngestOutcome, IngestStats, IngestionAdapter};
pub use reader::{Poller, SnapshotReader};
pub use retention::RetentionPolicy;
pub use series::{Reading, SeriesKey};
pub use snapshot::{Snapshot, Summary};
pub use store::SeriesStore;
pub use topic::{TopicFilter, TopicRouter};
