//! Latest decoded state per packet

use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::types::{Counter, FieldValues, Value};

/// The latest raw and converted values of one packet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PacketState {
    pub packet_name: String,
    pub raw: FieldValues,
    pub converted: FieldValues,
    /// `None` until a counted update has been seen.
    pub last_counter: Option<Counter>,
}

impl PacketState {
    pub fn new(
        packet_name: impl Into<String>,
        raw: FieldValues,
        converted: FieldValues,
        last_counter: Option<Counter>,
    ) -> Self {
        Self { packet_name: packet_name.into(), raw, converted, last_counter }
    }

    /// Overwrite only the fields present in the deltas.
    pub fn merge(&mut self, raw: &FieldValues, converted: &FieldValues) {
        for (field, value) in raw {
            self.raw.insert(field.clone(), value.clone());
        }
        for (field, value) in converted {
            self.converted.insert(field.clone(), value.clone());
        }
    }

    pub fn raw_value(&self, field: &str) -> Option<&Value> {
        self.raw.get(field)
    }

    pub fn converted_value(&self, field: &str) -> Option<&Value> {
        self.converted.get(field)
    }

    /// The converted value when there is one, otherwise the raw value.
    pub fn value(&self, field: &str) -> Option<&Value> {
        self.converted.get(field).or_else(|| self.raw.get(field))
    }
}

/// Result of checking an incoming counter against the cached one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterCheck {
    /// No state is cached for the packet.
    UnknownPacket,
    /// The packet is cached but has never carried a counter.
    Unsequenced,
    InSequence,
    OutOfSequence { expected: Counter, received: Counter },
}

/// Cache of [`PacketState`] by packet name.
///
/// States are handed out as `Arc` snapshots. Updates copy on write, so a
/// snapshot held by a caller never changes underneath it.
#[derive(Debug, Clone, Default)]
pub struct PacketStateStore {
    states: IndexMap<String, Arc<PacketState>>,
}

impl PacketStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, packet: &str) -> Option<Arc<PacketState>> {
        self.states.get(packet).cloned()
    }

    pub fn contains(&self, packet: &str) -> bool {
        self.states.contains_key(packet)
    }

    pub fn check_counter(&self, packet: &str, counter: Counter) -> CounterCheck {
        match self.states.get(packet).map(|s| s.last_counter) {
            None => CounterCheck::UnknownPacket,
            Some(None) => CounterCheck::Unsequenced,
            Some(Some(last)) if counter.follows(last) => CounterCheck::InSequence,
            Some(Some(last)) => {
                CounterCheck::OutOfSequence { expected: last.successor(), received: counter }
            }
        }
    }

    /// Insert `state` as the full state of its packet.
    pub fn seed(&mut self, state: PacketState) -> Arc<PacketState> {
        let state = Arc::new(state);
        self.states.insert(state.packet_name.clone(), Arc::clone(&state));
        state
    }

    /// Merge a validated delta and advance the counter.
    pub fn merge_delta(
        &mut self,
        packet: &str,
        raw: &FieldValues,
        converted: &FieldValues,
        counter: Counter,
    ) -> Option<Arc<PacketState>> {
        let entry = self.states.get_mut(packet)?;
        let state = Arc::make_mut(entry);
        state.merge(raw, converted);
        state.last_counter = Some(counter);
        Some(Arc::clone(entry))
    }

    /// Replace a packet's values, keeping its counter.
    pub fn replace_values(&mut self, packet: &str, raw: FieldValues, converted: FieldValues) -> Arc<PacketState> {
        let last_counter = self.states.get(packet).and_then(|s| s.last_counter);
        self.seed(PacketState::new(packet, raw, converted, last_counter))
    }

    /// Drop every cached state and install `states`.
    pub fn reseed(&mut self, states: impl IntoIterator<Item = PacketState>) -> Vec<Arc<PacketState>> {
        self.states.clear();
        states.into_iter().map(|state| self.seed(state)).collect()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.states.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn clear(&mut self) {
        self.states.clear();
    }
}
