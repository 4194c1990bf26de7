// SPDX-License-Identifier: MIT OR Apache-2.0
//! Named machine states.

use crate::rule::Rule;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StateId(pub Uuid);

impl StateId {
    /// Create a new random state ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for StateId {
    fn default() -> Self {
        Self::new()
    }
}

/// A named state carrying the rules tested while it is active
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct State {
    /// Unique state ID
    pub id: StateId,
    /// Display name
    pub name: String,
    /// Rules tested first while this state is active
    pub rules: Vec<Rule>,
}

impl State {
    /// Create a new state
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: StateId::new(),
            name: name.into(),
            rules: Vec::new(),
        }
    }

    /// Add a rule to the state
    pub fn with_rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }
}
