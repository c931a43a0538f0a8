//! Field views for renderers.
//!
//! A renderer holds one view per displayed field and asks it, on every
//! packet update, whether the field changed and how to present it. Views
//! never hold on to the packet state they are handed.

use crate::dictionary::{Dictionaries, FieldLimits, LimitStatus, PacketSchema};
use crate::state::PacketState;
use crate::types::Value;

/// What a renderer needs from any field view.
pub trait FieldRenderContract {
    fn packet_name(&self) -> &str;

    fn field_name(&self) -> &str;

    /// The value this view presents, if the state has one.
    fn current_value(&self, state: &PacketState) -> Option<Value>;

    /// Presentation string for the current value, `N/A` when absent.
    fn display(&self, state: &PacketState) -> String;

    /// Whether the presented value differs from the one seen on the previous
    /// call. The first call always reports a change.
    fn has_changed(&mut self, state: &PacketState) -> bool;
}

/// Remembers the last value a view presented.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldCache {
    last: Option<Option<Value>>,
}

impl FieldCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `value`, returning whether it differs from the previous one.
    pub fn update(&mut self, value: Option<Value>) -> bool {
        if self.last.as_ref() == Some(&value) {
            return false;
        }
        self.last = Some(value);
        true
    }

    pub fn last(&self) -> Option<&Value> {
        self.last.as_ref().and_then(Option::as_ref)
    }

    pub fn clear(&mut self) {
        self.last = None;
    }
}

/// Which side of a packet state a view reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValueSource {
    Raw,
    /// The converted value, falling back to raw for fields without one.
    #[default]
    Converted,
}

/// Presents one field's raw or converted value.
#[derive(Debug, Clone)]
pub struct ValueField {
    packet: String,
    field: String,
    source: ValueSource,
    element_width: usize,
    units: Option<String>,
    cache: FieldCache,
}

impl ValueField {
    pub fn new(packet: impl Into<String>, field: impl Into<String>, source: ValueSource) -> Self {
        Self {
            packet: packet.into(),
            field: field.into(),
            source,
            element_width: 1,
            units: None,
            cache: FieldCache::new(),
        }
    }

    /// A view carrying the field's units and array element width.
    pub fn from_schema(schema: &PacketSchema, field: &str, source: ValueSource) -> Option<Self> {
        let definition = schema.field(field)?;
        let mut view = Self::new(schema.name(), field, source);
        view.element_width = definition.element_width();
        view.units = definition.units().map(str::to_string);
        Some(view)
    }

    pub fn source(&self) -> ValueSource {
        self.source
    }

    pub fn units(&self) -> Option<&str> {
        self.units.as_deref()
    }

    pub fn cache(&self) -> &FieldCache {
        &self.cache
    }
}

impl FieldRenderContract for ValueField {
    fn packet_name(&self) -> &str {
        &self.packet
    }

    fn field_name(&self) -> &str {
        &self.field
    }

    fn current_value(&self, state: &PacketState) -> Option<Value> {
        match self.source {
            ValueSource::Raw => state.raw_value(&self.field),
            ValueSource::Converted => state.value(&self.field),
        }
        .cloned()
    }

    fn display(&self, state: &PacketState) -> String {
        match self.current_value(state) {
            Some(value) => value.display_with_element_width(self.element_width),
            None => Value::Null.display_string(),
        }
    }

    fn has_changed(&mut self, state: &PacketState) -> bool {
        let value = self.current_value(state);
        self.cache.update(value)
    }
}

/// A converted value plus its limit status.
#[derive(Debug, Clone)]
pub struct LimitField {
    value: ValueField,
    limits: Option<FieldLimits>,
}

impl LimitField {
    pub fn new(packet: impl Into<String>, field: impl Into<String>, limits: Option<FieldLimits>) -> Self {
        Self { value: ValueField::new(packet, field, ValueSource::Converted), limits }
    }

    /// A view with the field's limits looked up in `dictionaries`.
    pub fn from_dictionaries(dictionaries: &Dictionaries, packet: &str, field: &str) -> Option<Self> {
        let schema = dictionaries.telemetry.get(packet)?;
        let value = ValueField::from_schema(schema, field, ValueSource::Converted)?;
        let limits = dictionaries.limits.get(packet, field).cloned();
        Some(Self { value, limits })
    }

    pub fn limits(&self) -> Option<&FieldLimits> {
        self.limits.as_ref()
    }

    /// Nominal when the field has no limits or no value.
    pub fn limit_status(&self, state: &PacketState) -> LimitStatus {
        match (&self.limits, self.value.current_value(state)) {
            (Some(limits), Some(value)) => limits.check(&value),
            _ => LimitStatus::Nominal,
        }
    }
}

impl FieldRenderContract for LimitField {
    fn packet_name(&self) -> &str {
        self.value.packet_name()
    }

    fn field_name(&self) -> &str {
        self.value.field_name()
    }

    fn current_value(&self, state: &PacketState) -> Option<Value> {
        self.value.current_value(state)
    }

    fn display(&self, state: &PacketState) -> String {
        self.value.display(state)
    }

    fn has_changed(&mut self, state: &PacketState) -> bool {
        self.value.has_changed(state)
    }
}
