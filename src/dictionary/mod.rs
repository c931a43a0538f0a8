//! Telemetry, command, event and limits dictionaries.
//!
//! Dictionaries are loaded once from JSON or YAML documents and shared
//! read-only afterwards. A [`TelemetryDictionary`] holds one
//! [`PacketSchema`] per packet; each schema owns its fields and the
//! [`PacketScope`](crate::scope::PacketScope) its derived values evaluate in.
//!
//! ```rust
//! use downlink::dictionary::TelemetryDictionary;
//! use downlink::types::{TypeRegistry, Value};
//!
//! let dictionary = TelemetryDictionary::parse_json(r#"{
//!     "EPS": {"uid": 1, "fields": {
//!         "voltage": {"type": "MSB_U16", "bytes": [0, 1],
//!                     "dntoeu": {"equation": "raw.voltage / 100", "units": "V"}}
//!     }}
//! }"#).unwrap();
//!
//! let decoded = dictionary.get("EPS").unwrap().decode_packet(&[0x04, 0xB0], &TypeRegistry::new());
//! assert_eq!(decoded.raw["voltage"], Value::UInt(1200));
//! assert_eq!(decoded.converted["voltage"], Value::Float(12.0));
//! ```

mod command;
mod event;
mod field;
mod limits;
mod packet;

use std::sync::Arc;

pub use command::{CommandDefinition, CommandDictionary, GENERAL_SUBSYSTEM};
pub use event::{EventDefinition, EventDictionary};
pub use field::{ByteRange, DnToEu, FieldDefinition};
pub use limits::{FieldLimits, LabelSet, LimitStatus, LimitsDictionary, Threshold, ValueRule};
pub use packet::{DecodedPacket, PacketSchema, TelemetryDictionary};

use crate::types::TypeRegistry;

/// The full set of dictionaries one ground session works with.
#[derive(Debug, Clone, Default)]
pub struct Dictionaries {
    pub telemetry: Arc<TelemetryDictionary>,
    pub commands: Arc<CommandDictionary>,
    pub events: Arc<EventDictionary>,
    pub limits: Arc<LimitsDictionary>,
}

impl Dictionaries {
    pub fn new(telemetry: TelemetryDictionary) -> Self {
        Self { telemetry: Arc::new(telemetry), ..Self::default() }
    }

    pub fn with_commands(mut self, commands: CommandDictionary) -> Self {
        self.commands = Arc::new(commands);
        self
    }

    pub fn with_events(mut self, events: EventDictionary) -> Self {
        self.events = Arc::new(events);
        self
    }

    pub fn with_limits(mut self, limits: LimitsDictionary) -> Self {
        self.limits = Arc::new(limits);
        self
    }

    /// A type registry that resolves command and event codes through these
    /// dictionaries.
    pub fn registry(&self) -> TypeRegistry {
        TypeRegistry::with_dictionaries(Arc::clone(&self.commands), Arc::clone(&self.events))
    }
}
