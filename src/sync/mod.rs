//! Delta synchronisation of packet state.
//!
//! The realtime channel carries three kinds of frames: JSON deltas with the
//! changed fields of one packet and its sequence counter, binary frames with
//! a packet's full bytes, and empty probes. [`SyncClient`] merges them into a
//! [`PacketStateStore`](crate::state::PacketStateStore), detects counter gaps,
//! and asks for a full [`Snapshot`] whenever it can no longer trust its
//! cache.
//!
//! ## State transitions
//!
//! ```text
//! Disconnected --Connected--> Open --snapshot--> Streaming
//!                              |                  |    ^
//!                              +--StaleTimeout--> Stale -+ (any update)
//! any --Closed--> Closed
//! ```

mod client;
mod message;
mod sink;

pub use client::{SyncClient, SyncCommand, SyncInput, SyncState};
pub use message::{BINARY_HEADER_LEN, Delta, Frame, Snapshot, SnapshotState, WireMessage};
pub use sink::{BroadcastSink, EventSink, TelemetryEvent};
