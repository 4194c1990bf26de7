// SPDX-License-Identifier: MIT OR Apache-2.0
//! The pulse driver seam.
//!
//! The core itself is passive: an external per-frame pulse walks components
//! in dependency order and invokes a [`ComponentUpdater`] for each one whose
//! driving inputs changed. [`System::update_cycle`](crate::system::System::update_cycle)
//! is the reference driver built on this seam.

use crate::component::Component;
use crate::store::{PropertyError, PropertyStore};
use thiserror::Error;

/// Opaque frame context handed through to component behavior
#[derive(Debug, Clone, Copy, Default)]
pub struct Pulse {
    /// Monotonic frame counter
    pub frame: u64,
    /// Seconds since the driver started
    pub time: f64,
    /// Seconds since the previous pulse
    pub delta: f64,
}

impl Pulse {
    /// Advance to the next frame
    pub fn advance(&mut self, delta: f64) {
        self.frame += 1;
        self.time += delta;
        self.delta = delta;
    }
}

/// Error raised when the component dependency graph contains a cycle
#[derive(Debug, Error)]
#[error("Component graph contains a cycle")]
pub struct CycleError;

/// Error raised during an update cycle
#[derive(Debug, Error)]
pub enum UpdateError {
    /// The dependency graph could not be ordered
    #[error(transparent)]
    Cycle(#[from] CycleError),

    /// A property write inside component behavior failed
    #[error(transparent)]
    Property(#[from] PropertyError),

    /// Component-specific failure
    #[error("{0}")]
    Custom(String),
}

/// Behavior invoked by the pulse driver.
///
/// `update` runs when at least one of the component's inputs changed during
/// the pulse; `tick` runs once per pulse for every component. Both are
/// synchronous and must complete within the frame budget; asynchronous
/// collaborators re-enter by setting output properties for a later pulse.
pub trait ComponentUpdater {
    /// React to changed inputs, typically writing outputs into the store
    fn update(
        &mut self,
        component: &Component,
        properties: &mut PropertyStore,
        pulse: &Pulse,
    ) -> Result<(), UpdateError>;

    /// Per-pulse work independent of input changes
    fn tick(
        &mut self,
        _component: &Component,
        _properties: &mut PropertyStore,
        _pulse: &Pulse,
    ) -> Result<(), UpdateError> {
        Ok(())
    }
}
