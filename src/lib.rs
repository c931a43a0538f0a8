//! Telemetry dictionary decoding and delta-synchronised packet state for
//! instrument ground tools.
//!
//! Downlink turns a telemetry dictionary into packet decoders and keeps a
//! client-side mirror of every packet's latest values in step with a remote
//! server over a delta protocol.
//!
//! # Features
//!
//! - **Fail-closed decoding**: primitive, array, string, time, command and
//!   event types; a read past the end of a buffer is `None`, never zero
//! - **Derived values**: dictionary constants, guarded functions and `dntoeu`
//!   equations run in a small typed expression interpreter
//! - **Delta sync**: counter-checked merges with 31-bit wraparound, snapshot
//!   resync with generation tracking, staleness detection
//! - **History**: fixed-capacity per-packet ring buffers
//! - **Event messages**: printf-style formatting of binary event arguments
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use downlink::{Dictionaries, Downlink, SyncConfig, TelemetryDictionary};
//! use downlink::provider::{ChannelTransport, SnapshotSource};
//! use downlink::sync::Snapshot;
//! use futures::StreamExt;
//!
//! struct Snapshots;
//!
//! #[async_trait::async_trait]
//! impl SnapshotSource for Snapshots {
//!     async fn fetch_snapshot(&self) -> downlink::Result<Snapshot> {
//!         Ok(Snapshot::default())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let telemetry = TelemetryDictionary::parse_json(&std::fs::read_to_string("telemetry.json")?)?;
//!     let (_frames, transport) = ChannelTransport::new(64);
//!
//!     let connection =
//!         Downlink::connect(transport, Snapshots, Dictionaries::new(telemetry), SyncConfig::default()).await?;
//!     let mut updates = connection.packet_events("EPS");
//!     while let Some(state) = updates.next().await {
//!         println!("voltage: {:?}", state.value("voltage"));
//!     }
//!     Ok(())
//! }
//! ```

// Core types and error handling
pub mod config;
pub mod dictionary;
mod error;
pub mod format;
pub mod history;
pub mod scope;
pub mod state;
#[cfg_attr(any(test, feature = "benchmark"), path = "test_utils.rs")]
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;

// Session architecture
pub mod connection;
pub mod driver;
pub mod provider;
pub mod stream;
pub mod sync;
pub mod view;

// Core exports
pub use config::SyncConfig;
pub use error::*;
pub use types::*;

pub use dictionary::{
    CommandDictionary, Dictionaries, EventDictionary, LimitStatus, LimitsDictionary, PacketSchema,
    TelemetryDictionary,
};
pub use history::HistoryBuffer;
pub use state::PacketState;
pub use sync::{SyncClient, SyncState, TelemetryEvent};

// Main API exports
pub use connection::Connection;

/// Unified entry point for sync sessions.
///
/// # Example
///
/// ```rust,no_run
/// use downlink::{Dictionaries, Downlink, SyncConfig};
/// # use downlink::provider::{ChannelTransport, SnapshotSource};
/// # struct Snapshots;
/// # #[async_trait::async_trait]
/// # impl SnapshotSource for Snapshots {
/// #     async fn fetch_snapshot(&self) -> downlink::Result<downlink::sync::Snapshot> {
/// #         Ok(Default::default())
/// #     }
/// # }
///
/// # #[tokio::main]
/// # async fn main() -> downlink::Result<()> {
/// # let (_frames, transport) = ChannelTransport::new(64);
/// let connection =
///     Downlink::connect(transport, Snapshots, Dictionaries::default(), SyncConfig::default()).await?;
/// connection.shutdown();
/// # Ok(())
/// # }
/// ```
pub struct Downlink;

impl Downlink {
    /// Start a sync session over an already connected transport.
    ///
    /// Waits for the first snapshot (up to one stale interval) before
    /// returning.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport closes before the first snapshot
    /// arrives.
    pub async fn connect<T, S>(
        transport: T,
        snapshots: S,
        dictionaries: Dictionaries,
        config: SyncConfig,
    ) -> Result<Connection>
    where
        T: provider::Transport,
        S: provider::SnapshotSource,
    {
        Connection::connect(transport, snapshots, dictionaries, config).await
    }
}
