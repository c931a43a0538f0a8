//! Packet schemas and the telemetry dictionary

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::Deserialize;
use tracing::{debug, warn};

use super::field::{FieldDefinition, FieldDocument};
use crate::scope::{Expr, FunctionBody, PacketScope};
use crate::types::{FieldValues, TypeRegistry, Value};
use crate::{DownlinkError, Result};

#[derive(Debug, Clone, Deserialize)]
struct PacketDocument {
    #[serde(default)]
    name: Option<String>,
    uid: u32,
    #[serde(default)]
    desc: Option<String>,
    #[serde(default)]
    fields: IndexMap<String, FieldDocument>,
    #[serde(default)]
    constants: IndexMap<String, Value>,
    #[serde(default)]
    functions: IndexMap<String, FunctionBody>,
}

/// Raw and converted values decoded from one packet's bytes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedPacket {
    pub raw: FieldValues,
    pub converted: FieldValues,
}

/// One packet type: its fields, its derived-value scope, and its uid.
#[derive(Debug, Clone)]
pub struct PacketSchema {
    name: String,
    uid: u32,
    desc: Option<String>,
    fields: IndexMap<String, FieldDefinition>,
    equations: HashMap<String, Expr>,
    scope: PacketScope,
}

impl PacketSchema {
    pub fn new(
        name: impl Into<String>,
        uid: u32,
        fields: impl IntoIterator<Item = FieldDefinition>,
        scope: PacketScope,
    ) -> Self {
        let fields: IndexMap<String, FieldDefinition> =
            fields.into_iter().map(|f| (f.name().to_string(), f)).collect();
        let name = name.into();
        let equations = compile_equations(&name, &fields);
        Self { name, uid, desc: None, fields, equations, scope }
    }

    fn from_document(key: &str, doc: PacketDocument) -> Self {
        let name = doc.name.unwrap_or_else(|| key.to_string());
        let fields: IndexMap<String, FieldDefinition> = doc
            .fields
            .into_iter()
            .map(|(field_key, field)| {
                let field = FieldDefinition::from_document(&field_key, field);
                (field.name().to_string(), field)
            })
            .collect();
        let scope = PacketScope::new(&doc.constants, &doc.functions);
        let equations = compile_equations(&name, &fields);
        Self { name, uid: doc.uid, desc: doc.desc, fields, equations, scope }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn uid(&self) -> u32 {
        self.uid
    }

    pub fn desc(&self) -> Option<&str> {
        self.desc.as_deref()
    }

    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> impl Iterator<Item = &FieldDefinition> {
        self.fields.values()
    }

    pub fn scope(&self) -> &PacketScope {
        &self.scope
    }

    /// Decode one field with its enumeration applied.
    pub fn decode_field(&self, field: &str, bytes: &[u8], registry: &TypeRegistry) -> Option<Value> {
        self.fields.get(field)?.decode(bytes, registry, false)
    }

    /// Evaluate an expression against raw values in this packet's scope.
    pub fn evaluate(&self, expression: &str, raw: &FieldValues) -> Option<Value> {
        self.scope.evaluate(expression, raw)
    }

    /// Converted value of `field` given the packet's raw values, when the
    /// field has an equation.
    pub fn convert(&self, field: &str, raw: &FieldValues) -> Option<Value> {
        self.scope.evaluate_expr(self.equations.get(field)?, raw)
    }

    /// Decode every field of the packet.
    ///
    /// Raw values bypass enumerations. Converted values come from the field's
    /// equation when it has one, otherwise from the enumeration or complex
    /// type resolution; fields with neither have no converted value.
    /// Unavailable values are `Null`.
    pub fn decode_packet(&self, bytes: &[u8], registry: &TypeRegistry) -> DecodedPacket {
        let raw: FieldValues = self
            .fields
            .iter()
            .map(|(name, field)| {
                (name.clone(), field.decode(bytes, registry, true).unwrap_or(Value::Null))
            })
            .collect();

        let converted = self
            .fields
            .iter()
            .filter_map(|(name, field)| {
                let value = if let Some(equation) = self.equations.get(name) {
                    self.scope.evaluate_expr(equation, &raw)
                } else if field.has_presentation_conversion() {
                    field.decode(bytes, registry, false)
                } else {
                    return None;
                };
                Some((name.clone(), value.unwrap_or(Value::Null)))
            })
            .collect();

        DecodedPacket { raw, converted }
    }
}

fn compile_equations(packet: &str, fields: &IndexMap<String, FieldDefinition>) -> HashMap<String, Expr> {
    fields
        .values()
        .filter_map(|field| {
            let equation = field.equation()?;
            match PacketScope::compile(equation) {
                Ok(expr) => Some((field.name().to_string(), expr)),
                Err(e) => {
                    warn!(packet, field = field.name(), error = %e, "dntoeu equation does not compile");
                    None
                }
            }
        })
        .collect()
}

/// Every packet schema, by name and by uid.
#[derive(Debug, Clone, Default)]
pub struct TelemetryDictionary {
    packets: IndexMap<String, Arc<PacketSchema>>,
    by_uid: HashMap<u32, String>,
}

impl TelemetryDictionary {
    pub fn parse_json(text: &str) -> Result<Self> {
        let docs: IndexMap<String, PacketDocument> = serde_json::from_str(text)?;
        Self::from_documents(docs)
    }

    pub fn parse_yaml(text: &str) -> Result<Self> {
        let docs: IndexMap<String, PacketDocument> = serde_yaml_ng::from_str(text)?;
        Self::from_documents(docs)
    }

    fn from_documents(docs: IndexMap<String, PacketDocument>) -> Result<Self> {
        Self::from_schemas(docs.into_iter().map(|(key, doc)| PacketSchema::from_document(&key, doc)))
    }

    /// Build from schemas. Fails if two packets share a uid.
    pub fn from_schemas(schemas: impl IntoIterator<Item = PacketSchema>) -> Result<Self> {
        let mut dictionary = Self::default();
        for schema in schemas {
            if let Some(existing) = dictionary.by_uid.get(&schema.uid) {
                return Err(DownlinkError::dictionary_error(
                    "telemetry dictionary",
                    format!("packets '{existing}' and '{}' share uid {}", schema.name, schema.uid),
                ));
            }
            if dictionary.packets.contains_key(&schema.name) {
                return Err(DownlinkError::dictionary_error(
                    "telemetry dictionary",
                    format!("packet '{}' is defined more than once", schema.name),
                ));
            }
            dictionary.by_uid.insert(schema.uid, schema.name.clone());
            dictionary.packets.insert(schema.name.clone(), Arc::new(schema));
        }
        debug!(packets = dictionary.packets.len(), "telemetry dictionary loaded");
        Ok(dictionary)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<PacketSchema>> {
        self.packets.get(name)
    }

    pub fn by_uid(&self, uid: u32) -> Option<&Arc<PacketSchema>> {
        self.by_uid.get(&uid).and_then(|name| self.packets.get(name))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.packets.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<PacketSchema>> {
        self.packets.values()
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    /// Decode one field of a named packet, failing on unknown names.
    pub fn decode_field(
        &self,
        packet: &str,
        field: &str,
        bytes: &[u8],
        registry: &TypeRegistry,
    ) -> Result<Option<Value>> {
        let schema = self
            .get(packet)
            .ok_or_else(|| DownlinkError::PacketNotFound { packet: packet.to_string() })?;
        let definition = schema.field(field).ok_or_else(|| DownlinkError::FieldNotFound {
            packet: packet.to_string(),
            field: field.to_string(),
        })?;
        Ok(definition.decode(bytes, registry, false))
    }
}
