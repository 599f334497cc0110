//! Capability announcements served at `/info`

use serde_json::{Map, Value};

/// Registry of capabilities announced by middleware during composition.
///
/// Built mutably while the handler chain is assembled, then shared
/// read-only.
#[derive(Debug, Default, Clone)]
pub struct InfoRegistry {
    entries: Map<String, Value>,
}

impl InfoRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Announce a capability with its public settings
    pub fn register(&mut self, name: impl Into<String>, settings: Value) {
        self.entries.insert(name.into(), settings);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn to_json(&self) -> Value {
        Value::Object(self.entries.clone())
    }
}
