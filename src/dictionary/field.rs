//! Field definitions and the single-field decode pipeline

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::types::{TypeRegistry, TypeSpec, Value};

/// Byte location of a field: a single offset or an inclusive `[start, end]`
/// range. Decoding always starts at the first byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ByteRange {
    Offset(usize),
    Range([usize; 2]),
}

impl ByteRange {
    pub fn start(&self) -> usize {
        match self {
            ByteRange::Offset(offset) => *offset,
            ByteRange::Range([start, _]) => *start,
        }
    }

    pub fn end(&self) -> usize {
        match self {
            ByteRange::Offset(offset) => *offset,
            ByteRange::Range([_, end]) => *end,
        }
    }
}

/// Engineering-unit conversion attached to a field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DnToEu {
    #[serde(default)]
    pub equation: Option<String>,
    #[serde(default)]
    pub units: Option<String>,
}

/// On-disk shape of a field entry.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct FieldDocument {
    #[serde(default)]
    name: Option<String>,
    #[serde(rename = "type")]
    type_name: String,
    bytes: ByteRange,
    #[serde(default)]
    mask: Option<u64>,
    #[serde(default, rename = "enum")]
    enumeration: Option<BTreeMap<i64, String>>,
    #[serde(default)]
    dntoeu: Option<DnToEu>,
    #[serde(default)]
    desc: Option<String>,
    #[serde(default)]
    aliases: Option<serde_json::Value>,
}

/// One named field of a packet.
///
/// Decoding reads the field's type at its offset, applies the mask and the
/// shift derived from it, then looks the result up in the enumeration unless
/// the caller bypasses it.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDefinition {
    name: String,
    type_name: String,
    spec: Option<TypeSpec>,
    bytes: ByteRange,
    mask: Option<u64>,
    shift: u32,
    enumeration: Option<BTreeMap<i64, String>>,
    dntoeu: Option<DnToEu>,
    desc: Option<String>,
    aliases: Option<serde_json::Value>,
}

impl FieldDefinition {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>, bytes: ByteRange) -> Self {
        let type_name = type_name.into();
        Self {
            name: name.into(),
            spec: TypeSpec::parse(&type_name),
            type_name,
            bytes,
            mask: None,
            shift: 0,
            enumeration: None,
            dntoeu: None,
            desc: None,
            aliases: None,
        }
    }

    pub(crate) fn from_document(key: &str, doc: FieldDocument) -> Self {
        let name = doc.name.unwrap_or_else(|| key.to_string());
        let spec = TypeSpec::parse(&doc.type_name);
        if spec.is_none() {
            warn!(field = %name, type_name = %doc.type_name, "field type does not resolve");
        }

        let mut field = Self {
            name,
            type_name: doc.type_name,
            spec,
            bytes: doc.bytes,
            mask: None,
            shift: 0,
            enumeration: doc.enumeration,
            dntoeu: doc.dntoeu,
            desc: doc.desc,
            aliases: doc.aliases,
        };
        if let Some(mask) = doc.mask {
            field = field.with_mask(mask);
        }
        field
    }

    pub fn with_mask(mut self, mask: u64) -> Self {
        self.mask = Some(mask);
        self.shift = if mask == 0 { 0 } else { mask.trailing_zeros() };
        self
    }

    pub fn with_enumeration(mut self, enumeration: BTreeMap<i64, String>) -> Self {
        self.enumeration = Some(enumeration);
        self
    }

    pub fn with_dntoeu(mut self, dntoeu: DnToEu) -> Self {
        self.dntoeu = Some(dntoeu);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// The resolved type, or `None` if the name did not resolve.
    pub fn type_spec(&self) -> Option<&TypeSpec> {
        self.spec.as_ref()
    }

    pub fn bytes(&self) -> ByteRange {
        self.bytes
    }

    pub fn offset(&self) -> usize {
        self.bytes.start()
    }

    pub fn mask(&self) -> Option<u64> {
        self.mask
    }

    pub fn shift(&self) -> u32 {
        self.shift
    }

    pub fn enumeration(&self) -> Option<&BTreeMap<i64, String>> {
        self.enumeration.as_ref()
    }

    pub fn dntoeu(&self) -> Option<&DnToEu> {
        self.dntoeu.as_ref()
    }

    pub fn equation(&self) -> Option<&str> {
        self.dntoeu.as_ref().and_then(|d| d.equation.as_deref())
    }

    pub fn units(&self) -> Option<&str> {
        self.dntoeu.as_ref().and_then(|d| d.units.as_deref())
    }

    pub fn desc(&self) -> Option<&str> {
        self.desc.as_deref()
    }

    pub fn aliases(&self) -> Option<&serde_json::Value> {
        self.aliases.as_ref()
    }

    /// Whether the converted value differs from the raw decode without an equation.
    pub fn has_presentation_conversion(&self) -> bool {
        self.enumeration.is_some() || self.spec.as_ref().is_some_and(TypeSpec::is_complex)
    }

    /// Bytes per element when the field is an array, for hex presentation.
    pub fn element_width(&self) -> usize {
        match &self.spec {
            Some(TypeSpec::Array(array)) => array.element().byte_width(),
            Some(spec) => spec.byte_width(),
            None => 1,
        }
    }

    /// Decode this field out of a packet's bytes.
    ///
    /// Returns `None` when the type did not resolve or the read runs past the
    /// end of `bytes`.
    pub fn decode(&self, bytes: &[u8], registry: &TypeRegistry, skip_enumeration: bool) -> Option<Value> {
        let spec = self.spec.as_ref()?;
        let mut value = registry.decode(spec, bytes, self.offset())?;

        if let Some(mask) = self.mask {
            value = apply_mask(value, mask, self.shift);
        }

        if !skip_enumeration {
            if let Some(label) = self.enumeration.as_ref().and_then(|e| lookup(e, &value)) {
                value = Value::Str(label.clone());
            }
        }

        Some(value)
    }
}

fn apply_mask(value: Value, mask: u64, shift: u32) -> Value {
    match value {
        Value::UInt(v) => Value::UInt((v & mask) >> shift),
        Value::Int(v) => Value::Int((((v as u64) & mask) >> shift) as i64),
        other => other,
    }
}

fn lookup<'a>(enumeration: &'a BTreeMap<i64, String>, value: &Value) -> Option<&'a String> {
    enumeration.get(&value.as_i64()?)
}
