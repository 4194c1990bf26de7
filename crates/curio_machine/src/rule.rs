// SPDX-License-Identifier: MIT OR Apache-2.0
//! Event rules guarding state and transition activation.

use crate::state::StateId;
use crate::transition::TransitionId;
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

/// Condition a rule tests beyond its event set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum RuleCondition {
    /// Matches whenever one of the rule's events fires
    #[default]
    Always,
    /// Never matches; keeps a rule in place while disabled
    Never,
    /// Matches only while the rule's owning scope is the active state
    Idle,
    /// Matches only while the machine's active state is the rule's target
    /// state (the target state itself for state rules, the `from` state for
    /// transition rules)
    Targeted,
}

/// What a matching rule activates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleTarget {
    /// Jump directly to a state
    State(StateId),
    /// Start a transition
    Transition(TransitionId),
}

/// A guard mapping named events to a state or transition activation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    /// Event names this rule listens for
    pub events: IndexSet<String>,
    /// Condition tested once an event matches
    pub condition: RuleCondition,
    /// Activation performed when the rule matches
    pub target: RuleTarget,
}

impl Rule {
    /// Create a rule firing on a single event
    pub fn new(event: impl Into<String>, target: RuleTarget) -> Self {
        let mut events = IndexSet::new();
        events.insert(event.into());
        Self {
            events,
            condition: RuleCondition::Always,
            target,
        }
    }

    /// Add another event name to the rule's set
    pub fn with_event(mut self, event: impl Into<String>) -> Self {
        self.events.insert(event.into());
        self
    }

    /// Set the rule condition
    pub fn with_condition(mut self, condition: RuleCondition) -> Self {
        self.condition = condition;
        self
    }

    /// Whether the rule listens for the given event name
    pub fn listens_for(&self, event: &str) -> bool {
        self.events.contains(event)
    }
}
