//! Shared fixtures for unit tests and benchmarks
//!
//! A two-packet dictionary that touches every decode path: an engineering
//! conversion, an enumeration, a mask, a string, command and event
//! references, an absolute time and a guarded derived function.

#![cfg(any(test, feature = "benchmark"))]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::Result;
use crate::dictionary::{CommandDictionary, Dictionaries, EventDictionary, LimitsDictionary, TelemetryDictionary};
use crate::provider::SnapshotSource;
use crate::sync::{Snapshot, SnapshotState};
use crate::types::{Counter, FieldValues, TypeRegistry, Value};

pub const TELEMETRY_JSON: &str = r#"{
    "EPS": {
        "name": "EPS",
        "uid": 1,
        "desc": "Power system",
        "fields": {
            "voltage": {"type": "MSB_U16", "bytes": [0, 1], "dntoeu": {"equation": "raw.voltage / 100", "units": "V"}},
            "mode": {"type": "U8", "bytes": 2, "enum": {"0": "OFF", "1": "IDLE", "2": "CHARGING"}},
            "label": {"type": "S4", "bytes": [3, 6]},
            "flags": {"type": "U8", "bytes": 7, "mask": 12}
        }
    },
    "HEALTH": {
        "name": "HEALTH",
        "uid": 2,
        "desc": "Spacecraft health",
        "constants": {"LIMIT": 80},
        "functions": {
            "band(t)": {"t < 0": "'COLD'", "0 <= t < LIMIT": "'OK'", "t >= LIMIT": "'HOT'"}
        },
        "fields": {
            "last_cmd": {"type": "CMD16", "bytes": [0, 1]},
            "last_evr": {"type": "EVR16", "bytes": [2, 3]},
            "uptime": {"type": "TIME32", "bytes": [4, 7]},
            "temp": {"type": "MSB_F32", "bytes": [8, 11], "dntoeu": {"equation": "band(raw.temp)"}}
        }
    }
}"#;

pub const COMMANDS_JSON: &str = r#"{
    "NO_OP": {"name": "NO_OP", "opcode": 1, "desc": "Do nothing"},
    "PWR_ON": {"name": "PWR_ON", "opcode": 2, "subsystem": "EPS"}
}"#;

pub const EVENTS_JSON: &str = r#"{
    "BOOT": {"name": "BOOT", "code": 513, "desc": "Booted", "message": "boot %hhu of %s"}
}"#;

pub const LIMITS_JSON: &str = r#"{
    "EPS.voltage": {"lower": {"error": 10.0, "warn": 11.0}, "upper": {"error": 16.0, "warn": 15.0}},
    "EPS.mode": {"value": {"warn": "OFF"}}
}"#;

/// EPS: 1200 counts, mode 2, "BATT", flags 0b0011_1100.
pub const EPS_BYTES: [u8; 8] = [0x04, 0xB0, 0x02, b'B', b'A', b'T', b'T', 0x3C];

/// HEALTH bytes for a command opcode, event code, GPS seconds and temperature.
pub fn health_bytes(opcode: u16, event: u16, gps_seconds: u32, temp: f32) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(12);
    bytes.extend_from_slice(&opcode.to_be_bytes());
    bytes.extend_from_slice(&event.to_be_bytes());
    bytes.extend_from_slice(&gps_seconds.to_be_bytes());
    bytes.extend_from_slice(&temp.to_be_bytes());
    bytes
}

pub fn sample_telemetry_dictionary() -> TelemetryDictionary {
    TelemetryDictionary::parse_json(TELEMETRY_JSON).expect("fixture dictionary parses")
}

pub fn sample_dictionaries() -> Dictionaries {
    Dictionaries {
        telemetry: Arc::new(sample_telemetry_dictionary()),
        commands: Arc::new(CommandDictionary::parse_json(COMMANDS_JSON).expect("fixture commands parse")),
        events: Arc::new(EventDictionary::parse_json(EVENTS_JSON).expect("fixture events parse")),
        limits: Arc::new(LimitsDictionary::parse_json(LIMITS_JSON).expect("fixture limits parse")),
    }
}

pub fn sample_registry() -> TypeRegistry {
    sample_dictionaries().registry()
}

/// Field values from integer pairs.
pub fn int_values(pairs: &[(&str, i64)]) -> FieldValues {
    pairs.iter().map(|(name, v)| (name.to_string(), Value::Int(*v))).collect()
}

pub fn counter(value: u32) -> Counter {
    Counter::new(value).expect("counter in range")
}

/// A snapshot holding only `packet`, with its raw and converted voltage.
pub fn snapshot_of(packet: &str, voltage: i64, last_counter: u32) -> Snapshot {
    let mut converted = FieldValues::new();
    converted.insert("voltage".to_string(), Value::Float(voltage as f64 / 100.0));
    let mut snapshot = Snapshot::default();
    snapshot.states.insert(
        packet.to_string(),
        SnapshotState { raw: int_values(&[("voltage", voltage)]), dntoeu: converted },
    );
    snapshot.counters.insert(packet.to_string(), counter(last_counter));
    snapshot
}

/// Serves the same snapshot on every request and counts the requests.
#[derive(Debug)]
pub struct StaticSnapshots {
    snapshot: Snapshot,
    requests: AtomicUsize,
}

impl StaticSnapshots {
    pub fn new(snapshot: Snapshot) -> Self {
        Self { snapshot, requests: AtomicUsize::new(0) }
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SnapshotSource for StaticSnapshots {
    async fn fetch_snapshot(&self) -> Result<Snapshot> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        Ok(self.snapshot.clone())
    }
}
