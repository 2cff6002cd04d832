// ── Choice list entry ──

use serde::{Deserialize, Serialize};

/// One `{ id, label }` entry of a derived choice list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Choice {
    pub id: String,
    pub label: String,
}

impl Choice {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
        }
    }

    /// An entry whose label is its id.
    pub fn named(name: &str) -> Self {
        Self::new(name, name)
    }
}
