//! Outbound session events

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::state::PacketState;

/// Events emitted to renderers.
#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryEvent {
    Open,
    /// A packet's merged state after an update.
    Packet { name: String, state: Arc<PacketState> },
    /// No message arrived within the stale interval, `count` times in a row.
    Stale { count: u32 },
    Close,
}

impl TelemetryEvent {
    /// Packet name for packet events.
    pub fn packet_name(&self) -> Option<&str> {
        match self {
            TelemetryEvent::Packet { name, .. } => Some(name),
            _ => None,
        }
    }
}

/// Receives the events a [`SyncClient`](super::SyncClient) emits.
pub trait EventSink {
    fn emit(&mut self, event: TelemetryEvent);
}

/// Fans events out over a tokio broadcast channel.
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    sender: broadcast::Sender<TelemetryEvent>,
}

impl BroadcastSink {
    pub fn new(sender: broadcast::Sender<TelemetryEvent>) -> Self {
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TelemetryEvent> {
        self.sender.subscribe()
    }
}

impl EventSink for BroadcastSink {
    fn emit(&mut self, event: TelemetryEvent) {
        // No subscribers is not an error
        let _ = self.sender.send(event);
    }
}

impl EventSink for Vec<TelemetryEvent> {
    fn emit(&mut self, event: TelemetryEvent) {
        self.push(event);
    }
}

impl<S: EventSink + ?Sized> EventSink for &mut S {
    fn emit(&mut self, event: TelemetryEvent) {
        (**self).emit(event);
    }
}
