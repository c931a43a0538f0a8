//! Sync protocol state machine
//!
//! [`SyncClient::step`] consumes one [`SyncInput`] at a time and returns the
//! side effects the caller must perform as [`SyncCommand`]s. The client never
//! does I/O or keeps time itself, which keeps every transition testable
//! without a runtime.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use super::message::{Delta, Snapshot, WireMessage};
use super::sink::{EventSink, TelemetryEvent};
use crate::config::SyncConfig;
use crate::dictionary::TelemetryDictionary;
use crate::history::{HistoryBuffer, HistoryBuffers};
use crate::state::{CounterCheck, PacketState, PacketStateStore};
use crate::types::TypeRegistry;

/// Session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SyncState {
    Disconnected,
    /// Connected, waiting for the first snapshot.
    Open,
    Streaming,
    Stale,
    Closed,
}

/// Everything that can happen to a session, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncInput {
    Connected,
    Message(WireMessage),
    SnapshotArrived { generation: u64, snapshot: Snapshot },
    SnapshotFailed { generation: u64, reason: String },
    StaleTimeout,
    Closed,
}

/// Side effects requested by a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncCommand {
    /// Fetch a snapshot and report it back tagged with `generation`.
    RequestSnapshot { generation: u64 },
    /// (Re)start the stale timer from now.
    ArmStaleTimer(Duration),
    DisarmStaleTimer,
}

/// Client-side mirror of every packet's latest values.
#[derive(Debug)]
pub struct SyncClient<S> {
    dictionary: Arc<TelemetryDictionary>,
    registry: Arc<TypeRegistry>,
    config: SyncConfig,
    sink: S,
    state: SyncState,
    store: PacketStateStore,
    history: HistoryBuffers<Arc<PacketState>>,
    /// Last generation handed out. Monotonic across reconnects.
    generation: u64,
    /// First generation issued on the current connection.
    session_start: u64,
    /// Newest generation applied so far.
    applied: u64,
    /// Newest generation still awaiting its result.
    pending_snapshot: Option<u64>,
    synced: bool,
    stale_count: u32,
}

impl<S: EventSink> SyncClient<S> {
    pub fn new(
        dictionary: Arc<TelemetryDictionary>,
        registry: Arc<TypeRegistry>,
        config: SyncConfig,
        sink: S,
    ) -> Self {
        let history = HistoryBuffers::new(config.history_capacity);
        Self {
            dictionary,
            registry,
            config,
            sink,
            state: SyncState::Disconnected,
            store: PacketStateStore::new(),
            history,
            generation: 0,
            session_start: 1,
            applied: 0,
            pending_snapshot: None,
            synced: false,
            stale_count: 0,
        }
    }

    /// Apply one input and return the side effects to perform.
    pub fn step(&mut self, input: SyncInput) -> Vec<SyncCommand> {
        let mut commands = Vec::new();
        match input {
            SyncInput::Connected => self.on_connected(&mut commands),
            SyncInput::Message(message) => self.on_message(message, &mut commands),
            SyncInput::SnapshotArrived { generation, snapshot } => {
                self.on_snapshot(generation, snapshot, &mut commands)
            }
            SyncInput::SnapshotFailed { generation, reason } => {
                if self.pending_snapshot == Some(generation) {
                    warn!(generation, reason = %reason, "snapshot request failed");
                    self.pending_snapshot = None;
                } else {
                    debug!(generation, "ignoring failure of superseded snapshot request");
                }
            }
            SyncInput::StaleTimeout => self.on_stale_timeout(&mut commands),
            SyncInput::Closed => self.on_closed(&mut commands),
        }
        commands
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    /// Latest state of `packet`.
    pub fn latest(&self, packet: &str) -> Option<Arc<PacketState>> {
        self.store.get(packet)
    }

    /// The `n`-th most recent state of `packet`, `0` being the newest.
    pub fn history(&self, packet: &str, n: usize) -> Option<Arc<PacketState>> {
        self.history.nth(packet, n).cloned()
    }

    pub fn history_buffer(&self, packet: &str) -> Option<&HistoryBuffer<Arc<PacketState>>> {
        self.history.get(packet)
    }

    pub fn store(&self) -> &PacketStateStore {
        &self.store
    }

    pub fn dictionary(&self) -> &TelemetryDictionary {
        &self.dictionary
    }

    pub fn pending_snapshot(&self) -> Option<u64> {
        self.pending_snapshot
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    fn on_connected(&mut self, commands: &mut Vec<SyncCommand>) {
        info!("sync session opened");
        self.state = SyncState::Open;
        self.synced = false;
        self.stale_count = 0;
        // Any in-flight request belongs to the previous connection
        self.pending_snapshot = None;
        self.session_start = self.generation + 1;
        self.sink.emit(TelemetryEvent::Open);
        commands.push(SyncCommand::ArmStaleTimer(self.config.stale_interval));
        self.request_snapshot(commands);
    }

    fn on_message(&mut self, message: WireMessage, commands: &mut Vec<SyncCommand>) {
        if matches!(self.state, SyncState::Disconnected | SyncState::Closed) {
            debug!(state = ?self.state, "message outside an open session ignored");
            return;
        }
        match message {
            WireMessage::Probe => trace!("probe ignored"),
            WireMessage::Delta(delta) => self.on_delta(delta, commands),
            WireMessage::Packet { uid, data } => self.on_packet(uid, &data, commands),
        }
    }

    fn on_delta(&mut self, delta: Delta, commands: &mut Vec<SyncCommand>) {
        let Delta { packet, data, dntoeus, counter } = delta;

        let merged = match self.store.check_counter(&packet, counter) {
            CounterCheck::UnknownPacket if data.is_empty() => {
                debug!(packet = %packet, "empty delta for unknown packet, resyncing");
                self.request_snapshot(commands);
                return;
            }
            CounterCheck::UnknownPacket => {
                debug!(packet = %packet, counter = %counter, "seeding new packet from delta");
                self.store.seed(PacketState::new(packet.as_str(), data, dntoeus, Some(counter)))
            }
            CounterCheck::Unsequenced | CounterCheck::InSequence => {
                match self.store.merge_delta(&packet, &data, &dntoeus, counter) {
                    Some(state) => state,
                    None => return,
                }
            }
            CounterCheck::OutOfSequence { expected, received } => {
                debug!(
                    packet = %packet,
                    expected = %expected,
                    received = %received,
                    "counter mismatch, discarding delta"
                );
                self.request_snapshot(commands);
                return;
            }
        };

        trace!(packet = %packet, counter = %counter, "delta merged");
        self.record(merged, commands);
    }

    fn on_packet(&mut self, uid: u32, data: &[u8], commands: &mut Vec<SyncCommand>) {
        let Some(schema) = self.dictionary.by_uid(uid) else {
            debug!(uid, "binary frame for unknown uid ignored");
            return;
        };
        let decoded = schema.decode_packet(data, &self.registry);
        let state = self.store.replace_values(schema.name(), decoded.raw, decoded.converted);
        trace!(packet = %schema.name(), bytes = data.len(), "binary packet decoded");
        self.record(state, commands);
    }

    /// Results of older requests on the current connection still apply as
    /// long as nothing newer has been applied, so a burst of resyncs cannot
    /// starve every result.
    fn on_snapshot(&mut self, generation: u64, snapshot: Snapshot, commands: &mut Vec<SyncCommand>) {
        let current = self.pending_snapshot.is_some_and(|pending| generation <= pending)
            && generation >= self.session_start
            && generation > self.applied;
        if !current {
            debug!(generation, pending = ?self.pending_snapshot, "discarding superseded snapshot");
            return;
        }
        self.applied = generation;
        if self.pending_snapshot == Some(generation) {
            self.pending_snapshot = None;
        }

        let Snapshot { states, counters } = snapshot;
        let seeded = self.store.reseed(states.into_iter().map(|(name, values)| {
            let counter = counters.get(&name).copied();
            PacketState::new(name, values.raw, values.dntoeu, counter)
        }));
        info!(generation, packets = seeded.len(), "snapshot applied");

        for state in seeded {
            self.history.insert(&state.packet_name, Arc::clone(&state));
            self.sink.emit(TelemetryEvent::Packet { name: state.packet_name.clone(), state });
        }

        self.synced = true;
        self.state = SyncState::Streaming;
        self.stale_count = 0;
        commands.push(SyncCommand::ArmStaleTimer(self.config.stale_interval));
    }

    fn on_stale_timeout(&mut self, commands: &mut Vec<SyncCommand>) {
        if !matches!(self.state, SyncState::Open | SyncState::Streaming | SyncState::Stale) {
            return;
        }
        self.stale_count += 1;
        if self.state != SyncState::Stale {
            info!(interval = ?self.config.stale_interval, "telemetry stale");
        }
        self.state = SyncState::Stale;
        self.sink.emit(TelemetryEvent::Stale { count: self.stale_count });
        commands.push(SyncCommand::ArmStaleTimer(self.config.stale_interval));

        // Never seeded, or a resync got no answer within a stale interval
        if !self.synced || self.pending_snapshot.is_some() {
            self.request_snapshot(commands);
        }
    }

    fn on_closed(&mut self, commands: &mut Vec<SyncCommand>) {
        if self.state == SyncState::Closed {
            return;
        }
        info!("sync session closed");
        self.state = SyncState::Closed;
        self.pending_snapshot = None;
        self.sink.emit(TelemetryEvent::Close);
        commands.push(SyncCommand::DisarmStaleTimer);
    }

    /// Record a merged state and treat the session as alive.
    fn record(&mut self, state: Arc<PacketState>, commands: &mut Vec<SyncCommand>) {
        self.history.insert(&state.packet_name, Arc::clone(&state));
        self.sink.emit(TelemetryEvent::Packet { name: state.packet_name.clone(), state });

        self.stale_count = 0;
        if self.state == SyncState::Stale {
            debug!("telemetry resumed");
            self.state = if self.synced { SyncState::Streaming } else { SyncState::Open };
        }
        commands.push(SyncCommand::ArmStaleTimer(self.config.stale_interval));
    }

    /// Issue a new snapshot generation, superseding any request in flight.
    fn request_snapshot(&mut self, commands: &mut Vec<SyncCommand>) {
        if let Some(pending) = self.pending_snapshot {
            debug!(generation = pending, "superseding pending snapshot request");
        }
        self.generation += 1;
        self.pending_snapshot = Some(self.generation);
        debug!(generation = self.generation, "requesting snapshot");
        commands.push(SyncCommand::RequestSnapshot { generation: self.generation });
    }
}
