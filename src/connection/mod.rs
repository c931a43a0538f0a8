//! Connection handle for a running sync session

use std::future::ready;
use std::sync::Arc;
use std::time::Duration;

use futures::{Stream, StreamExt};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::{BroadcastStream, WatchStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::dictionary::{Dictionaries, LimitStatus};
use crate::driver::{Driver, DriverContext, Query};
use crate::provider::{SnapshotSource, Transport};
use crate::state::PacketState;
use crate::stream::CoalesceExt;
use crate::sync::{SyncState, TelemetryEvent};
use crate::types::{TypeRegistry, Value};
use crate::{DownlinkError, Result};

mod tests;

/// Events buffered per subscriber before it starts lagging.
const EVENT_BUFFER: usize = 1024;

/// Handle to a sync session running in a background task.
///
/// Queries are answered by the session task from its own copy of the
/// packet store, so every returned [`PacketState`] is an immutable snapshot.
/// Dropping the handle stops the session.
pub struct Connection {
    dictionaries: Dictionaries,
    registry: Arc<TypeRegistry>,
    events: broadcast::Sender<TelemetryEvent>,
    queries: mpsc::Sender<Query>,
    state: watch::Receiver<SyncState>,
    cancel: CancellationToken,
}

impl Connection {
    /// Start a session over an already connected transport.
    ///
    /// Waits up to one stale interval for the first snapshot before
    /// returning, so queries made right after connecting see seeded state.
    pub async fn connect<T, S>(
        transport: T,
        snapshots: S,
        dictionaries: Dictionaries,
        config: SyncConfig,
    ) -> Result<Self>
    where
        T: Transport,
        S: SnapshotSource,
    {
        info!("Connecting sync session ({} packets)", dictionaries.telemetry.len());

        let registry = Arc::new(dictionaries.registry());
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        let timeout = config.stale_interval;

        let channels = Driver::spawn(
            transport,
            DriverContext {
                snapshots: Arc::new(snapshots),
                dictionary: Arc::clone(&dictionaries.telemetry),
                registry: Arc::clone(&registry),
                config,
                events: events.clone(),
            },
        );

        // Wait for the first snapshot, or for the session to end
        let mut state_rx = channels.state.clone();
        let wait_result = tokio::time::timeout(
            timeout,
            state_rx.wait_for(|s| matches!(s, SyncState::Streaming | SyncState::Closed)),
        )
        .await
        .map(|seen| seen.map(|state| *state));

        match wait_result {
            Ok(Ok(SyncState::Closed)) => {
                channels.cancel.cancel();
                return Err(DownlinkError::connection_failed("session closed before the first snapshot"));
            }
            Ok(_) => {}
            Err(_) => warn!("Timeout waiting for first snapshot, continuing unseeded"),
        }

        info!("Sync session connected");
        Ok(Self {
            dictionaries,
            registry,
            events,
            queries: channels.queries,
            state: channels.state,
            cancel: channels.cancel,
        })
    }

    /// Latest state of `packet`.
    pub async fn latest(&self, packet: &str) -> Result<Option<Arc<PacketState>>> {
        self.query(|reply| Query::Latest { packet: packet.to_string(), reply }).await
    }

    /// The `n`-th most recent state of `packet`, `0` being the newest.
    pub async fn history(&self, packet: &str, n: usize) -> Result<Option<Arc<PacketState>>> {
        self.query(|reply| Query::History { packet: packet.to_string(), n, reply }).await
    }

    async fn query<F>(&self, make: F) -> Result<Option<Arc<PacketState>>>
    where
        F: FnOnce(oneshot::Sender<Option<Arc<PacketState>>>) -> Query,
    {
        let (reply, rx) = oneshot::channel();
        self.queries
            .send(make(reply))
            .await
            .map_err(|_| DownlinkError::connection_failed("session task stopped"))?;
        rx.await.map_err(|_| DownlinkError::connection_failed("session task stopped"))
    }

    /// Every event emitted from now on.
    ///
    /// A subscriber that falls more than the buffer behind skips the events
    /// it missed.
    pub fn events(&self) -> impl Stream<Item = TelemetryEvent> + Unpin + 'static {
        BroadcastStream::new(self.events.subscribe()).filter_map(|result| {
            ready(match result {
                Ok(event) => Some(event),
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    warn!("Event subscriber lagged, skipped {} events", skipped);
                    None
                }
            })
        })
    }

    /// Events of one packet only.
    pub fn packet_events(&self, packet: &str) -> impl Stream<Item = Arc<PacketState>> + Unpin + 'static {
        let packet = packet.to_string();
        self.events().filter_map(move |event| {
            ready(match event {
                TelemetryEvent::Packet { name, state } if name == packet => Some(state),
                _ => None,
            })
        })
    }

    /// Events batched per `period` for a fixed-rate renderer.
    pub fn coalesced_events(&self, period: Duration) -> impl Stream<Item = Vec<TelemetryEvent>> + Unpin + 'static {
        self.events().coalesce(period)
    }

    pub fn state(&self) -> SyncState {
        *self.state.borrow()
    }

    /// Session state changes as a stream, starting with the current state.
    pub fn state_updates(&self) -> impl Stream<Item = SyncState> + Unpin + 'static {
        WatchStream::new(self.state.clone())
    }

    /// Decode one field of `packet` out of `bytes`.
    pub fn decode_field(&self, packet: &str, field: &str, bytes: &[u8]) -> Result<Option<Value>> {
        self.dictionaries.telemetry.decode_field(packet, field, bytes, &self.registry)
    }

    /// Format the message of the event with `code` from its argument bytes.
    pub fn format_event_message(&self, code: u16, args: &[u8]) -> Option<String> {
        self.dictionaries.events.get_by_code(code).map(|event| event.format_message(args))
    }

    pub fn limit_status(&self, packet: &str, field: &str, value: &Value) -> LimitStatus {
        self.dictionaries.limits.check(packet, field, value)
    }

    pub fn dictionaries(&self) -> &Dictionaries {
        &self.dictionaries
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// Stop the session. Subscribers see a final close event.
    pub fn shutdown(self) {
        drop(self);
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        debug!("Dropping sync connection");
        self.cancel.cancel();
    }
}
