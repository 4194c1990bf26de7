// SPDX-License-Identifier: MIT OR Apache-2.0
//! Interaction state machine for Curio.
//!
//! This crate layers authored view sequencing on top of the property graph:
//! - Named states with event rules
//! - Directed transitions carrying keyframed property tracks
//! - A rule cascade routing named events to activations
//! - Versioned JSON/RON documents for persistence
//!
//! ## Architecture
//!
//! The machine is built on:
//! - An exactly-one-active invariant between states and transitions
//! - Track evaluation over elapsed time, scaled and optionally reversed
//! - Property writes through the graph's store, so transitions drive the
//!   same update propagation as any other change

pub mod machine;
pub mod rule;
pub mod state;
pub mod track;
pub mod transition;

pub use machine::{
    MachineDocument, MachineError, MachineEvent, StateMachine, FORMAT_VERSION, STATE_CHANNEL,
    TRANSITION_CHANNEL,
};
pub use rule::{Rule, RuleCondition, RuleTarget};
pub use state::{State, StateId};
pub use track::{blend, Interpolation, Keyframe, KeyframeId, Track};
pub use transition::{Transition, TransitionId};
