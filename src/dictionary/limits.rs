//! Field limits and their evaluation
//!
//! Limits are keyed `Packet.Field`. A `value` rule (exact label match) takes
//! precedence over the numeric `lower`/`upper` bounds, and error is always
//! checked before warning.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::types::Value;

/// Outcome of checking a value against its limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LimitStatus {
    Nominal,
    Warning,
    Error,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Threshold {
    #[serde(default)]
    pub error: Option<f64>,
    #[serde(default)]
    pub warn: Option<f64>,
}

/// One label or a set of labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LabelSet {
    One(String),
    Many(Vec<String>),
}

impl LabelSet {
    pub fn contains(&self, label: &str) -> bool {
        match self {
            LabelSet::One(l) => l == label,
            LabelSet::Many(ls) => ls.iter().any(|l| l == label),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValueRule {
    #[serde(default)]
    pub error: Option<LabelSet>,
    #[serde(default)]
    pub warn: Option<LabelSet>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldLimits {
    #[serde(default)]
    pub lower: Option<Threshold>,
    #[serde(default)]
    pub upper: Option<Threshold>,
    #[serde(default)]
    pub value: Option<ValueRule>,
}

#[derive(Clone, Copy)]
enum Severity {
    Error,
    Warn,
}

impl ValueRule {
    fn labels(&self, severity: Severity) -> Option<&LabelSet> {
        match severity {
            Severity::Error => self.error.as_ref(),
            Severity::Warn => self.warn.as_ref(),
        }
    }
}

impl FieldLimits {
    pub fn check(&self, value: &Value) -> LimitStatus {
        if self.violates(value, Severity::Error) {
            LimitStatus::Error
        } else if self.violates(value, Severity::Warn) {
            LimitStatus::Warning
        } else {
            LimitStatus::Nominal
        }
    }

    pub fn is_error(&self, value: &Value) -> bool {
        self.violates(value, Severity::Error)
    }

    pub fn is_warning(&self, value: &Value) -> bool {
        self.violates(value, Severity::Warn)
    }

    fn violates(&self, value: &Value, severity: Severity) -> bool {
        if let Some(labels) = self.value.as_ref().and_then(|rule| rule.labels(severity)) {
            return label_of(value).is_some_and(|label| labels.contains(label));
        }

        let Some(v) = value.as_f64() else {
            return false;
        };
        let bound = |threshold: &Option<Threshold>| {
            threshold.as_ref().and_then(|t| match severity {
                Severity::Error => t.error,
                Severity::Warn => t.warn,
            })
        };
        bound(&self.upper).is_some_and(|upper| v > upper)
            || bound(&self.lower).is_some_and(|lower| v < lower)
    }
}

fn label_of(value: &Value) -> Option<&str> {
    match value {
        Value::Str(s) => Some(s),
        Value::Command(c) => Some(&c.name),
        Value::Event(e) => Some(&e.name),
        _ => None,
    }
}

/// Limits keyed by `Packet.Field`.
#[derive(Debug, Clone, Default)]
pub struct LimitsDictionary {
    limits: IndexMap<String, FieldLimits>,
}

impl LimitsDictionary {
    pub fn parse_json(text: &str) -> Result<Self> {
        Ok(Self { limits: serde_json::from_str(text)? })
    }

    pub fn parse_yaml(text: &str) -> Result<Self> {
        Ok(Self { limits: serde_yaml_ng::from_str(text)? })
    }

    pub fn get(&self, packet: &str, field: &str) -> Option<&FieldLimits> {
        self.limits.get(&format!("{packet}.{field}"))
    }

    /// Status of `value`, or `Nominal` when the field has no limits.
    pub fn check(&self, packet: &str, field: &str, value: &Value) -> LimitStatus {
        self.get(packet, field).map_or(LimitStatus::Nominal, |limits| limits.check(value))
    }

    pub fn len(&self) -> usize {
        self.limits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.limits.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> LimitsDictionary {
        LimitsDictionary::parse_json(
            r#"{
                "EPS.voltage": {"lower": {"error": 10.0, "warn": 11.0}, "upper": {"error": 16.0, "warn": 15.0}},
                "EPS.mode": {"value": {"error": "FAULT", "warn": ["SAFE", "STANDBY"]}},
                "EPS.mixed": {"value": {"warn": "LOW"}, "upper": {"error": 5}}
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn bounds_check_error_before_warning() {
        let l = limits();
        assert_eq!(l.check("EPS", "voltage", &Value::Float(12.0)), LimitStatus::Nominal);
        assert_eq!(l.check("EPS", "voltage", &Value::Float(15.5)), LimitStatus::Warning);
        assert_eq!(l.check("EPS", "voltage", &Value::Float(16.5)), LimitStatus::Error);
        assert_eq!(l.check("EPS", "voltage", &Value::Int(9)), LimitStatus::Error);
        assert_eq!(l.check("EPS", "voltage", &Value::Float(10.5)), LimitStatus::Warning);
    }

    #[test]
    fn value_rules_match_labels() {
        let l = limits();
        assert_eq!(l.check("EPS", "mode", &Value::from("FAULT")), LimitStatus::Error);
        assert_eq!(l.check("EPS", "mode", &Value::from("STANDBY")), LimitStatus::Warning);
        assert_eq!(l.check("EPS", "mode", &Value::from("NOMINAL")), LimitStatus::Nominal);
        assert_eq!(l.check("EPS", "mode", &Value::Int(3)), LimitStatus::Nominal);
    }

    #[test]
    fn value_rule_only_overrides_its_own_severity() {
        let l = limits();
        assert_eq!(l.check("EPS", "mixed", &Value::Int(7)), LimitStatus::Error);
        assert_eq!(l.check("EPS", "mixed", &Value::from("LOW")), LimitStatus::Warning);
    }

    #[test]
    fn unknown_fields_are_nominal() {
        assert_eq!(limits().check("EPS", "nope", &Value::Null), LimitStatus::Nominal);
    }
}
