// SPDX-License-Identifier: MIT OR Apache-2.0
//! The interaction state machine.
//!
//! A [`StateMachine`] holds named states and directed transitions between
//! them. At any time exactly one of the active state or the active
//! transition is set (both empty only before the first activation). Named
//! events route through [`StateMachine::trigger_event`], which tests the
//! active state's rules, then the active transition's rules, then the
//! global rules, activating the first match. While a transition is active,
//! [`StateMachine::evaluate`] drives its tracks into the property store and
//! activates the end state when the scaled elapsed time reaches the
//! transition duration.

use crate::rule::{Rule, RuleCondition, RuleTarget};
use crate::state::{State, StateId};
use crate::transition::{Transition, TransitionId};
use curio_graph::{Event, PropertyError, PropertyStore, Publisher};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Channel for state activation events.
pub const STATE_CHANNEL: &str = "state";

/// Channel for transition activation events.
pub const TRANSITION_CHANNEL: &str = "transition";

/// Error raised by machine operations
#[derive(Debug, Error)]
pub enum MachineError {
    /// No state with the given id
    #[error("State not found")]
    UnknownState,

    /// No transition with the given id
    #[error("Transition not found")]
    UnknownTransition,

    /// A transition references a state absent from the machine
    #[error("Transition '{0}' references an unknown state")]
    DanglingTransition(String),

    /// Writing a track value into the property store failed
    #[error(transparent)]
    Property(#[from] PropertyError),

    /// JSON encoding or decoding failed
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// RON encoding failed
    #[error(transparent)]
    Ron(#[from] ron::Error),

    /// RON decoding failed
    #[error(transparent)]
    RonParse(#[from] ron::error::SpannedError),
}

/// Event emitted on every activation
#[derive(Debug, Clone)]
pub enum MachineEvent {
    /// A state became active
    State {
        /// The newly active state
        state: StateId,
    },
    /// A transition became active
    Transition {
        /// The newly active transition
        transition: TransitionId,
    },
}

impl Event for MachineEvent {
    fn channel(&self) -> &str {
        match self {
            Self::State { .. } => STATE_CHANNEL,
            Self::Transition { .. } => TRANSITION_CHANNEL,
        }
    }
}

/// State machine driving authored view transitions over the property graph
pub struct StateMachine {
    states: IndexMap<StateId, State>,
    transitions: IndexMap<TransitionId, Transition>,
    global_rules: Vec<Rule>,
    active_state: Option<StateId>,
    active_transition: Option<TransitionId>,
    start_time: f64,
    current_time: f64,
    speed: f32,
    backward: bool,
    events: Publisher<MachineEvent>,
}

impl StateMachine {
    /// Create an empty machine with nothing active
    pub fn new() -> Self {
        let events = Publisher::new();
        events.add_events([STATE_CHANNEL, TRANSITION_CHANNEL]);
        Self {
            states: IndexMap::new(),
            transitions: IndexMap::new(),
            global_rules: Vec::new(),
            active_state: None,
            active_transition: None,
            start_time: 0.0,
            current_time: 0.0,
            speed: 1.0,
            backward: false,
            events,
        }
    }

    /// Activation event stream (`"state"` and `"transition"` channels)
    pub fn events(&self) -> &Publisher<MachineEvent> {
        &self.events
    }

    /// Add a state
    pub fn add_state(&mut self, state: State) -> StateId {
        let id = state.id;
        self.states.insert(id, state);
        id
    }

    /// Add a transition; both endpoints must already be states
    pub fn add_transition(&mut self, transition: Transition) -> Result<TransitionId, MachineError> {
        if !self.states.contains_key(&transition.from) || !self.states.contains_key(&transition.to)
        {
            return Err(MachineError::DanglingTransition(transition.name.clone()));
        }
        let id = transition.id;
        self.transitions.insert(id, transition);
        Ok(id)
    }

    /// Add a rule tested after state and transition rules
    pub fn add_global_rule(&mut self, rule: Rule) {
        self.global_rules.push(rule);
    }

    /// Get a state by id
    pub fn state(&self, id: StateId) -> Option<&State> {
        self.states.get(&id)
    }

    /// Get a transition by id
    pub fn transition(&self, id: TransitionId) -> Option<&Transition> {
        self.transitions.get(&id)
    }

    /// The currently active state, if any
    pub fn active_state(&self) -> Option<StateId> {
        self.active_state
    }

    /// The currently active transition, if any
    pub fn active_transition(&self) -> Option<TransitionId> {
        self.active_transition
    }

    /// Current playback time as last passed to [`evaluate`](Self::evaluate)
    pub fn current_time(&self) -> f64 {
        self.current_time
    }

    /// Activate a state, clearing any active transition.
    ///
    /// Re-activating the already-active state is a no-op and emits nothing.
    pub fn activate_state(&mut self, id: StateId) -> Result<(), MachineError> {
        let state = self.states.get(&id).ok_or(MachineError::UnknownState)?;
        if self.active_transition.is_none() && self.active_state == Some(id) {
            return Ok(());
        }
        tracing::debug!(state = %state.name, "activated state");
        self.active_transition = None;
        self.active_state = Some(id);
        let _ = self.events.emit(&MachineEvent::State { state: id });
        Ok(())
    }

    /// Activate a transition, clearing any active state.
    ///
    /// `speed` scales elapsed time; `backward` plays the tracks from the end
    /// and completes into the `from` state. Re-activating the already-active
    /// transition is a no-op.
    pub fn activate_transition(
        &mut self,
        id: TransitionId,
        speed: f32,
        backward: bool,
    ) -> Result<(), MachineError> {
        let transition = self
            .transitions
            .get(&id)
            .ok_or(MachineError::UnknownTransition)?;
        if self.active_transition == Some(id) {
            return Ok(());
        }
        tracing::debug!(transition = %transition.name, speed, backward, "activated transition");
        self.active_state = None;
        self.active_transition = Some(id);
        self.start_time = self.current_time;
        self.speed = speed;
        self.backward = backward;
        let _ = self
            .events
            .emit(&MachineEvent::Transition { transition: id });
        Ok(())
    }

    /// Route a named event through the rule cascade.
    ///
    /// Rules are tested in order: the active state's, then the active
    /// transition's, then the global rules; the first match activates its
    /// target and the rest are skipped. Returns whether a rule fired.
    pub fn trigger_event(&mut self, event: &str) -> Result<bool, MachineError> {
        let Some(rule) = self.matching_rule(event) else {
            return Ok(false);
        };
        match rule {
            RuleTarget::State(state) => self.activate_state(state)?,
            RuleTarget::Transition(transition) => {
                self.activate_transition(transition, 1.0, false)?;
            }
        }
        Ok(true)
    }

    fn matching_rule(&self, event: &str) -> Option<RuleTarget> {
        if let Some(state) = self.active_state.and_then(|id| self.states.get(&id)) {
            for rule in &state.rules {
                if self.rule_matches(rule, event, true) {
                    return Some(rule.target);
                }
            }
        }
        if let Some(transition) = self
            .active_transition
            .and_then(|id| self.transitions.get(&id))
        {
            for rule in &transition.rules {
                if self.rule_matches(rule, event, false) {
                    return Some(rule.target);
                }
            }
        }
        for rule in &self.global_rules {
            if self.rule_matches(rule, event, false) {
                return Some(rule.target);
            }
        }
        None
    }

    /// `owner_active` is true only for rules owned by the active state
    fn rule_matches(&self, rule: &Rule, event: &str, owner_active: bool) -> bool {
        if !rule.listens_for(event) {
            return false;
        }
        match rule.condition {
            RuleCondition::Always => true,
            RuleCondition::Never => false,
            RuleCondition::Idle => owner_active,
            RuleCondition::Targeted => {
                let target_state = match rule.target {
                    RuleTarget::State(state) => Some(state),
                    RuleTarget::Transition(transition) => {
                        self.transitions.get(&transition).map(|t| t.from)
                    }
                };
                target_state.is_some() && self.active_state == target_state
            }
        }
    }

    /// Advance playback to `time` and drive the active transition.
    ///
    /// Elapsed time since activation, scaled by `speed`, selects the
    /// transition time the tracks are evaluated at (mirrored when playing
    /// backward); every track value is written into the store. When the
    /// elapsed time reaches the transition duration, the end state
    /// activates. A no-op while a state is active.
    pub fn evaluate(&mut self, time: f64, store: &mut PropertyStore) -> Result<(), MachineError> {
        self.current_time = time;
        let Some(id) = self.active_transition else {
            return Ok(());
        };
        let transition = self
            .transitions
            .get(&id)
            .ok_or(MachineError::UnknownTransition)?
            .clone();

        let elapsed = ((time - self.start_time) * f64::from(self.speed)) as f32;
        let elapsed = elapsed.clamp(0.0, transition.duration);
        let transition_time = if self.backward {
            transition.duration - elapsed
        } else {
            elapsed
        };

        for track in &transition.tracks {
            if let Some(value) = track.evaluate(transition_time) {
                store.set_value(track.property, value)?;
            }
        }

        if elapsed >= transition.duration {
            self.activate_state(transition.end_state(self.backward))?;
        }
        Ok(())
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

/// Serialized machine: the authored graph without runtime playback state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineDocument {
    /// Format version for compatibility checks
    pub version: u32,
    /// All states
    pub states: Vec<State>,
    /// All transitions
    pub transitions: Vec<Transition>,
    /// Rules tested after state and transition rules
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub global_rules: Vec<Rule>,
}

/// Current machine document format version.
pub const FORMAT_VERSION: u32 = 1;

impl StateMachine {
    /// Capture the authored states, transitions and rules
    pub fn to_document(&self) -> MachineDocument {
        MachineDocument {
            version: FORMAT_VERSION,
            states: self.states.values().cloned().collect(),
            transitions: self.transitions.values().cloned().collect(),
            global_rules: self.global_rules.clone(),
        }
    }

    /// Rebuild a machine from a document; transitions referencing missing
    /// states reject the whole document
    pub fn from_document(document: &MachineDocument) -> Result<Self, MachineError> {
        let mut machine = Self::new();
        for state in &document.states {
            machine.add_state(state.clone());
        }
        for transition in &document.transitions {
            machine.add_transition(transition.clone())?;
        }
        for rule in &document.global_rules {
            machine.add_global_rule(rule.clone());
        }
        Ok(machine)
    }
}

impl MachineDocument {
    /// Serialize to pretty JSON
    pub fn to_json(&self) -> Result<String, MachineError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Deserialize from JSON
    pub fn from_json(text: &str) -> Result<Self, MachineError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Serialize to RON
    pub fn to_ron(&self) -> Result<String, MachineError> {
        Ok(ron::ser::to_string_pretty(
            self,
            ron::ser::PrettyConfig::default(),
        )?)
    }

    /// Deserialize from RON
    pub fn from_ron(text: &str) -> Result<Self, MachineError> {
        Ok(ron::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::{Keyframe, Track};
    use curio_graph::{
        ComponentType, PropertyId, PropertySchema, PropertyValue, System, TypeRegistry,
    };
    use std::cell::RefCell;
    use std::rc::Rc;

    fn two_state_machine() -> (StateMachine, StateId, StateId, TransitionId) {
        let mut machine = StateMachine::new();
        let overview = machine.add_state(State::new("Overview"));
        let detail = machine.add_state(State::new("Detail"));
        let zoom = machine
            .add_transition(Transition::new("Zoom", overview, detail, 2.0))
            .unwrap();
        (machine, overview, detail, zoom)
    }

    #[test]
    fn test_exactly_one_active_after_activation() {
        let (mut machine, overview, _, zoom) = two_state_machine();
        assert!(machine.active_state().is_none());
        assert!(machine.active_transition().is_none());

        machine.activate_state(overview).unwrap();
        assert_eq!(machine.active_state(), Some(overview));
        assert!(machine.active_transition().is_none());

        machine.activate_transition(zoom, 1.0, false).unwrap();
        assert!(machine.active_state().is_none());
        assert_eq!(machine.active_transition(), Some(zoom));
    }

    #[test]
    fn test_reactivation_is_a_no_op() {
        let (mut machine, overview, _, zoom) = two_state_machine();
        let count = Rc::new(RefCell::new(0));
        let sink = count.clone();
        machine
            .events()
            .on(STATE_CHANNEL, move |_| *sink.borrow_mut() += 1)
            .unwrap();

        machine.activate_state(overview).unwrap();
        machine.activate_state(overview).unwrap();
        assert_eq!(*count.borrow(), 1);

        machine.activate_transition(zoom, 1.0, false).unwrap();
        machine.activate_transition(zoom, 2.0, true).unwrap();
        // The second call changed nothing; the first still governs playback.
        assert_eq!(machine.active_transition(), Some(zoom));
    }

    #[test]
    fn test_trigger_event_cascade_order() {
        let (mut machine, overview, detail, zoom) = two_state_machine();
        // The active state's rule wins over a global rule for the same event.
        let state = machine.states.get_mut(&overview).unwrap();
        state
            .rules
            .push(Rule::new("tap", RuleTarget::Transition(zoom)));
        machine.add_global_rule(Rule::new("tap", RuleTarget::State(detail)));

        machine.activate_state(overview).unwrap();
        assert!(machine.trigger_event("tap").unwrap());
        assert_eq!(machine.active_transition(), Some(zoom));

        // With no state active, the global rule fires.
        assert!(machine.trigger_event("tap").unwrap());
        assert_eq!(machine.active_state(), Some(detail));

        assert!(!machine.trigger_event("unknown").unwrap());
    }

    #[test]
    fn test_rule_conditions() {
        let (mut machine, overview, detail, _) = two_state_machine();
        machine.add_global_rule(
            Rule::new("never", RuleTarget::State(detail)).with_condition(RuleCondition::Never),
        );
        machine.add_global_rule(
            Rule::new("go", RuleTarget::State(detail)).with_condition(RuleCondition::Targeted),
        );

        assert!(!machine.trigger_event("never").unwrap());
        // Targeted: only fires while the target state is already active.
        assert!(!machine.trigger_event("go").unwrap());
        machine.activate_state(detail).unwrap();
        assert!(machine.trigger_event("go").unwrap());
        assert_eq!(machine.active_state(), Some(detail));

        // Idle rules fire only from the owning active state.
        machine
            .states
            .get_mut(&overview)
            .unwrap()
            .rules
            .push(Rule::new("idle", RuleTarget::State(detail)).with_condition(RuleCondition::Idle));
        machine.activate_state(overview).unwrap();
        assert!(machine.trigger_event("idle").unwrap());
        assert_eq!(machine.active_state(), Some(detail));
    }

    fn system_with_exposure() -> (System, PropertyId) {
        let mut types = TypeRegistry::new();
        types.register(
            ComponentType::new("CView").with_input(PropertySchema::float("exposure", 0.0)),
        );
        let mut system = System::new(types);
        let main = system.main_graph_id();
        let node = system.create_node(main, "Camera").unwrap();
        let view = system.create_component(node, "CView").unwrap();
        let id = system.component(view).unwrap().input("exposure").unwrap();
        (system, id)
    }

    #[test]
    fn test_evaluate_drives_tracks_and_completes() {
        let mut machine = StateMachine::new();
        let a = machine.add_state(State::new("A"));
        let b = machine.add_state(State::new("B"));
        let (mut system, exposure) = system_with_exposure();

        let mut track = Track::new(exposure);
        track.add_keyframe(Keyframe::new(0.0, PropertyValue::Float(0.0)));
        track.add_keyframe(Keyframe::new(2.0, PropertyValue::Float(8.0)));
        let zoom = machine
            .add_transition(Transition::new("Zoom", a, b, 2.0).with_track(track))
            .unwrap();

        machine.activate_state(a).unwrap();
        machine.evaluate(10.0, system.properties_mut()).unwrap();
        machine.activate_transition(zoom, 1.0, false).unwrap();

        machine.evaluate(11.0, system.properties_mut()).unwrap();
        assert_eq!(
            system.properties().value(exposure),
            Some(&PropertyValue::Float(4.0))
        );
        assert_eq!(machine.active_transition(), Some(zoom));

        machine.evaluate(12.5, system.properties_mut()).unwrap();
        assert_eq!(
            system.properties().value(exposure),
            Some(&PropertyValue::Float(8.0))
        );
        assert_eq!(machine.active_state(), Some(b));
        assert!(machine.active_transition().is_none());
    }

    #[test]
    fn test_evaluate_backward_ends_in_from_state() {
        let mut machine = StateMachine::new();
        let a = machine.add_state(State::new("A"));
        let b = machine.add_state(State::new("B"));
        let (mut system, exposure) = system_with_exposure();

        let mut track = Track::new(exposure);
        track.add_keyframe(Keyframe::new(0.0, PropertyValue::Float(0.0)));
        track.add_keyframe(Keyframe::new(2.0, PropertyValue::Float(8.0)));
        let zoom = machine
            .add_transition(Transition::new("Zoom", a, b, 2.0).with_track(track))
            .unwrap();

        machine.activate_transition(zoom, 2.0, true).unwrap();
        // Elapsed 0.5s at speed 2 = 1.0s, mirrored to transition time 1.0.
        machine.evaluate(0.5, system.properties_mut()).unwrap();
        assert_eq!(
            system.properties().value(exposure),
            Some(&PropertyValue::Float(4.0))
        );

        machine.evaluate(1.0, system.properties_mut()).unwrap();
        assert_eq!(
            system.properties().value(exposure),
            Some(&PropertyValue::Float(0.0))
        );
        assert_eq!(machine.active_state(), Some(a));
    }

    #[test]
    fn test_dangling_transition_rejected() {
        let mut machine = StateMachine::new();
        let a = machine.add_state(State::new("A"));
        let result = machine.add_transition(Transition::new("Broken", a, StateId::new(), 1.0));
        assert!(matches!(result, Err(MachineError::DanglingTransition(_))));
    }

    #[test]
    fn test_document_round_trip() {
        let (machine, _, _, _) = two_state_machine();
        let document = machine.to_document();

        let json = document.to_json().unwrap();
        let restored = StateMachine::from_document(&MachineDocument::from_json(&json).unwrap())
            .unwrap();
        assert_eq!(restored.states.len(), 2);
        assert_eq!(restored.transitions.len(), 1);
        assert!(restored.active_state().is_none());

        let ron = document.to_ron().unwrap();
        let from_ron = MachineDocument::from_ron(&ron).unwrap();
        assert_eq!(from_ron.states.len(), 2);
    }
}
