//! Command table: operator keywords known to the core

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{CoreError, Result};

/// One operator-facing command
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandEntry {
    /// Handler identifier on the core side
    pub handler: String,
    /// Human-readable description for the help text
    #[serde(default)]
    pub description: String,
}

/// Mapping from command keyword to its handler and description
///
/// Keeps the order the core listed its commands in.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct CommandTable {
    commands: IndexMap<String, CommandEntry>,
}

impl CommandTable {
    /// Create empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from a `commands_list` reply body
    pub fn from_value(value: Value) -> Result<Self> {
        if !value.is_object() {
            return Err(CoreError::InvalidMessageFormat(
                "commands list must be an object".into(),
            ));
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Add or replace a command
    pub fn insert(&mut self, keyword: impl Into<String>, handler: impl Into<String>, description: impl Into<String>) {
        self.commands.insert(
            keyword.into(),
            CommandEntry {
                handler: handler.into(),
                description: description.into(),
            },
        );
    }

    pub fn get(&self, keyword: &str) -> Option<&CommandEntry> {
        self.commands.get(keyword)
    }

    /// Iterate commands in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &CommandEntry)> {
        self.commands.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}
