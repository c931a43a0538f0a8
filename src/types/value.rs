//! Runtime value type produced by field decoding and expression evaluation

use chrono::{DateTime, SecondsFormat, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Field name to value, in dictionary order.
pub type FieldValues = IndexMap<String, Value>;

/// A command opcode resolved through the command dictionary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommandRef {
    pub opcode: u16,
    pub name: String,
}

/// An event code resolved through the event dictionary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventRef {
    pub code: u16,
    pub name: String,
}

/// Runtime value that can hold any decoded or derived telemetry datum.
///
/// Wire messages carry plain JSON, so the serde representation is untagged:
/// numbers, strings, booleans, arrays and `null` map onto the obvious variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Str(String),
    Array(Vec<Value>),
    Command(CommandRef),
    Event(EventRef),
    Time(DateTime<Utc>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric view of this value, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Int(v) => Some(*v as f64),
            Value::UInt(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            Value::Command(c) => Some(f64::from(c.opcode)),
            Value::Event(e) => Some(f64::from(e.code)),
            Value::Time(t) => Some(t.timestamp_millis() as f64 / 1000.0),
            Value::Null | Value::Str(_) | Value::Array(_) => None,
        }
    }

    /// Integer view of this value. Floats only convert when integral.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Bool(b) => Some(i64::from(*b)),
            Value::Int(v) => Some(*v),
            Value::UInt(v) => i64::try_from(*v).ok(),
            Value::Float(v) if v.fract() == 0.0 && v.is_finite() => Some(*v as i64),
            Value::Command(c) => Some(i64::from(c.opcode)),
            Value::Event(e) => Some(i64::from(e.code)),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Truthiness used by guards and boolean operators.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(v) => *v != 0,
            Value::UInt(v) => *v != 0,
            Value::Float(v) => *v != 0.0 && !v.is_nan(),
            Value::Str(s) => !s.is_empty(),
            Value::Array(_) | Value::Command(_) | Value::Event(_) | Value::Time(_) => true,
        }
    }

    /// Loose equality: numbers compare numerically regardless of variant.
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Command(c), Value::Str(s)) | (Value::Str(s), Value::Command(c)) => c.name == *s,
            (Value::Event(e), Value::Str(s)) | (Value::Str(s), Value::Event(e)) => e.name == *s,
            (Value::Null, Value::Null) => true,
            (Value::Null, _) | (_, Value::Null) => false,
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x == y,
                _ => a == b,
            },
        }
    }
}

impl Value {
    /// Presentation form used by field renderers.
    ///
    /// Null renders as `N/A`, array elements as upper-case hex padded to two
    /// digits per byte of `element_width`, and non-integral floats to five
    /// decimal places.
    pub fn display_string(&self) -> String {
        self.display_with_element_width(1)
    }

    pub fn display_with_element_width(&self, element_width: usize) -> String {
        match self {
            Value::Null => "N/A".to_string(),
            Value::Float(v) if v.is_finite() && v.fract() != 0.0 => format!("{v:.5}"),
            Value::Array(items) => {
                let width = element_width.clamp(1, 8);
                let digits = width * 2;
                let mask = if width == 8 { u64::MAX } else { (1u64 << (width * 8)) - 1 };
                items
                    .iter()
                    .map(|item| match item {
                        Value::Int(v) => format!("0x{:0digits$X}", *v as u64 & mask),
                        Value::UInt(v) => format!("0x{:0digits$X}", v & mask),
                        other => other.display_string(),
                    })
                    .collect::<Vec<_>>()
                    .join(" ")
            }
            other => other.to_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::UInt(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Str(s) => f.write_str(s),
            Value::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Value::Command(c) => f.write_str(&c.name),
            Value::Event(e) => f.write_str(&e.name),
            Value::Time(t) => f.write_str(&t.to_rfc3339_opts(SecondsFormat::Millis, true)),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::UInt(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_values_map_to_untagged_variants() {
        let parsed: Vec<Value> =
            serde_json::from_str(r#"[null, true, -3, 18446744073709551615, 2.5, "ON", [1, 2]]"#)
                .unwrap();
        assert_eq!(
            parsed,
            vec![
                Value::Null,
                Value::Bool(true),
                Value::Int(-3),
                Value::UInt(u64::MAX),
                Value::Float(2.5),
                Value::Str("ON".into()),
                Value::Array(vec![Value::Int(1), Value::Int(2)]),
            ]
        );
    }

    #[test]
    fn loose_equality_crosses_numeric_variants() {
        assert!(Value::Int(3).loose_eq(&Value::Float(3.0)));
        assert!(Value::UInt(7).loose_eq(&Value::Int(7)));
        assert!(!Value::Null.loose_eq(&Value::Int(0)));
        let cmd = Value::Command(CommandRef { opcode: 1, name: "NOOP".into() });
        assert!(cmd.loose_eq(&Value::from("NOOP")));
    }

    #[test]
    fn presentation_strings() {
        assert_eq!(Value::Null.display_string(), "N/A");
        assert_eq!(Value::Float(1.0 / 3.0).display_string(), "0.33333");
        assert_eq!(Value::Float(4.0).display_string(), "4");
        let bytes = Value::Array(vec![Value::UInt(10), Value::UInt(11)]);
        assert_eq!(bytes.display_string(), "0x0A 0x0B");
        assert_eq!(bytes.display_with_element_width(2), "0x000A 0x000B");
    }

    #[test]
    fn truthiness() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Float(f64::NAN).is_truthy());
        assert!(Value::from("x").is_truthy());
        assert!(!Value::Int(0).is_truthy());
    }
}
