//! Command dictionary

use std::collections::HashMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::Result;

/// Subsystem label for commands that do not declare one.
pub const GENERAL_SUBSYSTEM: &str = "GENERAL";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandDefinition {
    pub name: String,
    pub opcode: u16,
    #[serde(default)]
    pub subsystem: Option<String>,
    #[serde(default)]
    pub desc: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub arguments: serde_json::Value,
}

impl CommandDefinition {
    pub fn subsystem_or_general(&self) -> &str {
        self.subsystem.as_deref().unwrap_or(GENERAL_SUBSYSTEM)
    }
}

/// Commands by name, with an opcode index.
#[derive(Debug, Clone, Default)]
pub struct CommandDictionary {
    commands: IndexMap<String, CommandDefinition>,
    by_opcode: HashMap<u16, String>,
}

impl CommandDictionary {
    pub fn parse_json(text: &str) -> Result<Self> {
        let commands: IndexMap<String, CommandDefinition> = serde_json::from_str(text)?;
        Ok(Self::from_definitions(commands))
    }

    pub fn parse_yaml(text: &str) -> Result<Self> {
        let commands: IndexMap<String, CommandDefinition> = serde_yaml_ng::from_str(text)?;
        Ok(Self::from_definitions(commands))
    }

    /// Build the opcode index. A repeated opcode keeps the later command.
    pub fn from_definitions(commands: IndexMap<String, CommandDefinition>) -> Self {
        let mut by_opcode = HashMap::with_capacity(commands.len());
        for (key, defn) in &commands {
            if let Some(previous) = by_opcode.insert(defn.opcode, key.clone()) {
                warn!(opcode = defn.opcode, previous = %previous, command = %key, "duplicate command opcode");
            }
        }
        Self { commands, by_opcode }
    }

    pub fn get(&self, name: &str) -> Option<&CommandDefinition> {
        self.commands.get(name)
    }

    pub fn get_by_opcode(&self, opcode: u16) -> Option<&CommandDefinition> {
        self.by_opcode.get(&opcode).and_then(|name| self.commands.get(name))
    }

    /// Commands grouped by subsystem, in dictionary order within each group.
    pub fn by_subsystem(&self) -> IndexMap<&str, Vec<&CommandDefinition>> {
        let mut groups: IndexMap<&str, Vec<&CommandDefinition>> = IndexMap::new();
        for defn in self.commands.values() {
            groups.entry(defn.subsystem_or_general()).or_default().push(defn);
        }
        groups
    }

    pub fn iter(&self) -> impl Iterator<Item = &CommandDefinition> {
        self.commands.values()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COMMANDS: &str = r#"{
        "NO_OP": {"name": "NO_OP", "opcode": 1, "desc": "Do nothing"},
        "PWR_ON": {"name": "PWR_ON", "opcode": 2, "subsystem": "EPS"},
        "PWR_OFF": {"name": "PWR_OFF", "opcode": 3, "subsystem": "EPS", "arguments": [{"name": "rail"}]}
    }"#;

    #[test]
    fn lookups_by_name_and_opcode() {
        let dict = CommandDictionary::parse_json(COMMANDS).unwrap();
        assert_eq!(dict.len(), 3);
        assert_eq!(dict.get_by_opcode(2).map(|c| c.name.as_str()), Some("PWR_ON"));
        assert!(dict.get_by_opcode(99).is_none());
        assert_eq!(dict.get("NO_OP").and_then(|c| c.desc.as_deref()), Some("Do nothing"));
    }

    #[test]
    fn commands_without_subsystem_group_under_general() {
        let dict = CommandDictionary::parse_json(COMMANDS).unwrap();
        let groups = dict.by_subsystem();
        let names = |key: &str| groups[key].iter().map(|c| c.name.clone()).collect::<Vec<_>>();
        assert_eq!(names("GENERAL"), vec!["NO_OP"]);
        assert_eq!(names("EPS"), vec!["PWR_ON", "PWR_OFF"]);
    }

    #[test]
    fn yaml_documents_load() {
        let dict = CommandDictionary::parse_yaml("NO_OP:\n  name: NO_OP\n  opcode: 1\n").unwrap();
        assert_eq!(dict.get_by_opcode(1).map(|c| c.name.as_str()), Some("NO_OP"));
    }
}
