//! Event dictionary

use std::collections::HashMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::Result;
use crate::format::format_event_message;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventDefinition {
    pub name: String,
    pub code: u16,
    #[serde(default)]
    pub desc: Option<String>,
    /// printf-style template for the event's binary arguments.
    #[serde(default, alias = "msg")]
    pub message: Option<String>,
}

impl EventDefinition {
    /// Render this event's message from its argument bytes.
    ///
    /// Falls back to the description (or the name) when there is no template
    /// or no argument data.
    pub fn format_message(&self, args: &[u8]) -> String {
        let fallback = self.desc.as_deref().unwrap_or(&self.name);
        format_event_message(self.message.as_deref(), fallback, args)
    }
}

/// Events by name, with a code index.
#[derive(Debug, Clone, Default)]
pub struct EventDictionary {
    events: IndexMap<String, EventDefinition>,
    by_code: HashMap<u16, String>,
}

impl EventDictionary {
    pub fn parse_json(text: &str) -> Result<Self> {
        let events: IndexMap<String, EventDefinition> = serde_json::from_str(text)?;
        Ok(Self::from_definitions(events))
    }

    pub fn parse_yaml(text: &str) -> Result<Self> {
        let events: IndexMap<String, EventDefinition> = serde_yaml_ng::from_str(text)?;
        Ok(Self::from_definitions(events))
    }

    pub fn from_definitions(events: IndexMap<String, EventDefinition>) -> Self {
        let mut by_code = HashMap::with_capacity(events.len());
        for (key, defn) in &events {
            if let Some(previous) = by_code.insert(defn.code, key.clone()) {
                warn!(code = defn.code, previous = %previous, event = %key, "duplicate event code");
            }
        }
        Self { events, by_code }
    }

    pub fn get(&self, name: &str) -> Option<&EventDefinition> {
        self.events.get(name)
    }

    pub fn get_by_code(&self, code: u16) -> Option<&EventDefinition> {
        self.by_code.get(&code).and_then(|name| self.events.get(name))
    }

    pub fn iter(&self) -> impl Iterator<Item = &EventDefinition> {
        self.events.values()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_alias_and_code_lookup() {
        let dict = EventDictionary::parse_json(
            r#"{
                "BOOT": {"name": "BOOT", "code": 513, "desc": "Booted"},
                "TEMP": {"name": "TEMP", "code": 514, "desc": "Temp report", "msg": "sensor %hhu at %d"}
            }"#,
        )
        .unwrap();

        let temp = dict.get_by_code(514).unwrap();
        assert_eq!(temp.message.as_deref(), Some("sensor %hhu at %d"));
        assert_eq!(temp.format_message(&[2, 0, 0, 0, 42]), "sensor 2 at 42");
        assert_eq!(temp.format_message(&[]), "Temp report");

        let boot = dict.get("BOOT").unwrap();
        assert_eq!(boot.format_message(&[1, 2, 3]), "Booted");
    }
}
