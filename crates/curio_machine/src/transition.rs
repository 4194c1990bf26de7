// SPDX-License-Identifier: MIT OR Apache-2.0
//! Directed transitions between states.

use crate::rule::Rule;
use crate::state::StateId;
use crate::track::Track;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransitionId(pub Uuid);

impl TransitionId {
    /// Create a new random transition ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TransitionId {
    fn default() -> Self {
        Self::new()
    }
}

/// A directed edge between two states carrying interpolation tracks.
///
/// While a transition is active the machine evaluates its tracks against
/// the scaled elapsed time and writes the results into the property store;
/// at `duration` the end state activates (the start state when playing
/// backward).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transition {
    /// Unique transition ID
    pub id: TransitionId,
    /// Display name
    pub name: String,
    /// State this transition leaves from
    pub from: StateId,
    /// State this transition arrives at
    pub to: StateId,
    /// Length in seconds at speed 1.0
    pub duration: f32,
    /// Rules tested while this transition is active
    pub rules: Vec<Rule>,
    /// Property tracks evaluated over the transition time
    pub tracks: Vec<Track>,
}

impl Transition {
    /// Create a new transition between two states
    pub fn new(name: impl Into<String>, from: StateId, to: StateId, duration: f32) -> Self {
        Self {
            id: TransitionId::new(),
            name: name.into(),
            from,
            to,
            duration,
            rules: Vec::new(),
            tracks: Vec::new(),
        }
    }

    /// Add a rule to the transition
    pub fn with_rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Add a property track
    pub fn with_track(mut self, track: Track) -> Self {
        self.tracks.push(track);
        self
    }

    /// The state a completed run ends in, honoring direction
    pub fn end_state(&self, backward: bool) -> StateId {
        if backward {
            self.from
        } else {
            self.to
        }
    }
}
