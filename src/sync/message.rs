//! Wire messages of the realtime channel

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::types::{Counter, FieldValues};
use crate::{DownlinkError, Result};

/// Bytes before the packet payload in a binary frame: one pad byte and a
/// big-endian u32 packet uid.
pub const BINARY_HEADER_LEN: usize = 5;

/// One frame as delivered by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

/// Changed fields of one packet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    pub packet: String,
    #[serde(default)]
    pub data: FieldValues,
    #[serde(default)]
    pub dntoeus: FieldValues,
    pub counter: Counter,
}

/// Full values of one packet inside a [`Snapshot`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotState {
    #[serde(default)]
    pub raw: FieldValues,
    #[serde(default)]
    pub dntoeu: FieldValues,
}

/// Every packet's current values and counter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub states: IndexMap<String, SnapshotState>,
    #[serde(default)]
    pub counters: IndexMap<String, Counter>,
}

impl Snapshot {
    pub fn parse_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| DownlinkError::snapshot_failed(e.to_string()))
    }
}

/// A decoded inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum WireMessage {
    Delta(Delta),
    /// Full packet bytes for the packet with this uid.
    Packet { uid: u32, data: Vec<u8> },
    /// Dead-connection probe.
    Probe,
}

impl WireMessage {
    pub fn decode(frame: &Frame) -> Result<Self> {
        match frame {
            Frame::Text(text) => Self::from_text(text),
            Frame::Binary(bytes) => Self::from_binary(bytes),
        }
    }

    pub fn from_text(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(WireMessage::Probe);
        }
        serde_json::from_str(text)
            .map(WireMessage::Delta)
            .map_err(|e| DownlinkError::protocol_error(format!("malformed delta: {e}")))
    }

    pub fn from_binary(bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() {
            return Ok(WireMessage::Probe);
        }
        let Some(header) = bytes.get(..BINARY_HEADER_LEN) else {
            return Err(DownlinkError::protocol_error(format!(
                "binary frame of {} bytes is shorter than its header",
                bytes.len()
            )));
        };
        let uid = u32::from_be_bytes([header[1], header[2], header[3], header[4]]);
        let data = &bytes[BINARY_HEADER_LEN..];
        if uid == 0 && data.is_empty() {
            return Ok(WireMessage::Probe);
        }
        Ok(WireMessage::Packet { uid, data: data.to_vec() })
    }

    /// Encode a binary packet frame.
    pub fn encode_packet(uid: u32, data: &[u8]) -> Vec<u8> {
        let mut frame = Vec::with_capacity(BINARY_HEADER_LEN + data.len());
        frame.push(0);
        frame.extend_from_slice(&uid.to_be_bytes());
        frame.extend_from_slice(data);
        frame
    }
}
