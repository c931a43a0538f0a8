//! Type name resolution and decoding

use std::collections::HashMap;
use std::sync::Arc;

use super::{ArrayType, CommandRef, EventRef, PrimitiveType, TimeKind, Value};
use crate::dictionary::{CommandDictionary, EventDictionary};

/// Names registered up front. `S<n>` strings and arrays resolve on demand.
const BUILTIN_PRIMITIVES: &[&str] = &[
    "I8", "U8", "LSB_I16", "MSB_I16", "LSB_U16", "MSB_U16", "LSB_I32", "MSB_I32", "LSB_U32",
    "MSB_U32", "LSB_I64", "MSB_I64", "LSB_U64", "MSB_U64", "LSB_F32", "MSB_F32", "LSB_D64",
    "MSB_D64",
];

/// A resolved decode strategy.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeSpec {
    Primitive(PrimitiveType),
    Array(ArrayType),
    /// Big-endian u16 opcode resolved through the command dictionary.
    Command,
    /// Big-endian u16 code resolved through the event dictionary.
    Event,
    Time(TimeKind),
}

impl TypeSpec {
    /// Resolve a type name without any registry state.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "CMD16" => Some(TypeSpec::Command),
            "EVR16" => Some(TypeSpec::Event),
            "TIME8" => Some(TypeSpec::Time(TimeKind::Time8)),
            "TIME32" => Some(TypeSpec::Time(TimeKind::Time32)),
            "TIME64" => Some(TypeSpec::Time(TimeKind::Time64)),
            _ if name.contains('[') => ArrayType::parse(name).map(TypeSpec::Array),
            _ => PrimitiveType::parse(name).map(TypeSpec::Primitive),
        }
    }

    pub fn byte_width(&self) -> usize {
        match self {
            TypeSpec::Primitive(p) => p.byte_width(),
            TypeSpec::Array(a) => a.byte_width(),
            TypeSpec::Command | TypeSpec::Event => 2,
            TypeSpec::Time(kind) => kind.byte_width(),
        }
    }

    /// Types that need a side dictionary or epoch conversion to resolve.
    pub fn is_complex(&self) -> bool {
        matches!(self, TypeSpec::Command | TypeSpec::Event | TypeSpec::Time(_))
    }

    pub fn is_time(&self) -> bool {
        matches!(self, TypeSpec::Time(_))
    }
}

/// Maps type names to decode strategies and owns the side dictionaries that
/// command and event references resolve through.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    primitives: HashMap<String, PrimitiveType>,
    commands: Arc<CommandDictionary>,
    events: Arc<EventDictionary>,
}

impl TypeRegistry {
    /// Registry with empty command and event dictionaries.
    pub fn new() -> Self {
        Self::with_dictionaries(Arc::default(), Arc::default())
    }

    pub fn with_dictionaries(commands: Arc<CommandDictionary>, events: Arc<EventDictionary>) -> Self {
        let primitives = BUILTIN_PRIMITIVES
            .iter()
            .filter_map(|name| PrimitiveType::parse(name).map(|t| (name.to_string(), t)))
            .collect();
        Self { primitives, commands, events }
    }

    pub fn resolve(&self, name: &str) -> Option<TypeSpec> {
        match self.primitives.get(name) {
            Some(primitive) => Some(TypeSpec::Primitive(primitive.clone())),
            None => TypeSpec::parse(name),
        }
    }

    pub fn commands(&self) -> &CommandDictionary {
        &self.commands
    }

    pub fn events(&self) -> &EventDictionary {
        &self.events
    }

    /// Decode `spec` at `offset`. Out-of-bounds reads yield `None`;
    /// unresolved command or event codes yield the numeric code.
    pub fn decode(&self, spec: &TypeSpec, bytes: &[u8], offset: usize) -> Option<Value> {
        match spec {
            TypeSpec::Primitive(p) => p.decode(bytes, offset),
            TypeSpec::Array(a) => a.decode(bytes, offset),
            TypeSpec::Time(kind) => kind.decode(bytes, offset),
            TypeSpec::Command => {
                let opcode = read_code(bytes, offset)?;
                Some(match self.commands.get_by_opcode(opcode) {
                    Some(defn) => Value::Command(CommandRef { opcode, name: defn.name.clone() }),
                    None => Value::UInt(u64::from(opcode)),
                })
            }
            TypeSpec::Event => {
                let code = read_code(bytes, offset)?;
                Some(match self.events.get_by_code(code) {
                    Some(defn) => Value::Event(EventRef { code, name: defn.name.clone() }),
                    None => Value::UInt(u64::from(code)),
                })
            }
        }
    }
}

fn read_code(bytes: &[u8], offset: usize) -> Option<u16> {
    let raw = bytes.get(offset..offset.checked_add(2)?)?;
    Some(u16::from_be_bytes([raw[0], raw[1]]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> TypeRegistry {
        let commands = CommandDictionary::parse_json(
            r#"{"NO_OP": {"name": "NO_OP", "opcode": 1, "desc": "Do nothing"}}"#,
        )
        .unwrap();
        let events = EventDictionary::parse_json(
            r#"{"BOOT": {"name": "BOOT", "code": 513, "desc": "Booted"}}"#,
        )
        .unwrap();
        TypeRegistry::with_dictionaries(Arc::new(commands), Arc::new(events))
    }

    #[test]
    fn resolves_every_family() {
        let r = TypeRegistry::new();
        assert!(matches!(r.resolve("MSB_U16"), Some(TypeSpec::Primitive(_))));
        assert!(matches!(r.resolve("S16"), Some(TypeSpec::Primitive(_))));
        assert!(matches!(r.resolve("LSB_I16[2]"), Some(TypeSpec::Array(_))));
        assert_eq!(r.resolve("CMD16"), Some(TypeSpec::Command));
        assert_eq!(r.resolve("EVR16"), Some(TypeSpec::Event));
        assert_eq!(r.resolve("TIME64"), Some(TypeSpec::Time(TimeKind::Time64)));
        assert_eq!(r.resolve("BOGUS"), None);
    }

    #[test]
    fn references_resolve_or_fall_back_to_code() {
        let r = registry();
        assert_eq!(
            r.decode(&TypeSpec::Command, &[0x00, 0x01], 0),
            Some(Value::Command(CommandRef { opcode: 1, name: "NO_OP".into() }))
        );
        assert_eq!(r.decode(&TypeSpec::Command, &[0x00, 0x09], 0), Some(Value::UInt(9)));
        assert_eq!(
            r.decode(&TypeSpec::Event, &[0x02, 0x01], 0),
            Some(Value::Event(EventRef { code: 513, name: "BOOT".into() }))
        );
        assert_eq!(r.decode(&TypeSpec::Event, &[0x02], 0), None);
    }
}
