// SPDX-License-Identifier: MIT OR Apache-2.0
//! Component instances.

use crate::node::NodeId;
use crate::property::{GroupKind, PropertyGroup, PropertyId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ComponentId(pub Uuid);

impl ComponentId {
    /// Create a new random component ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ComponentId {
    fn default() -> Self {
        Self::new()
    }
}

/// A typed behavior unit attached to a node.
///
/// Components are data-driven instances of a registered
/// [`ComponentType`](crate::types::ComponentType); their behavior runs
/// through the [`ComponentUpdater`](crate::update::ComponentUpdater) seam.
/// The property values themselves live in the system's
/// [`PropertyStore`](crate::store::PropertyStore); the groups here hold the
/// name-to-id mapping.
#[derive(Debug, Clone)]
pub struct Component {
    /// Unique instance ID
    pub id: ComponentId,
    /// Node this component is attached to
    pub node: NodeId,
    /// Registered type name
    pub type_name: String,
    /// Tags carried by this instance
    pub tags: Vec<String>,
    /// Input property group
    pub ins: PropertyGroup,
    /// Output property group
    pub outs: PropertyGroup,
}

impl Component {
    pub(crate) fn new(id: ComponentId, node: NodeId, type_name: impl Into<String>) -> Self {
        Self {
            id,
            node,
            type_name: type_name.into(),
            tags: Vec::new(),
            ins: PropertyGroup::new(GroupKind::Input),
            outs: PropertyGroup::new(GroupKind::Output),
        }
    }

    /// Look up an input property by name
    pub fn input(&self, name: &str) -> Option<PropertyId> {
        self.ins.get(name)
    }

    /// Look up an output property by name
    pub fn output(&self, name: &str) -> Option<PropertyId> {
        self.outs.get(name)
    }

    /// Resolve a semantic path such as `ins.exposure` or `outs.self`
    pub fn property(&self, path: &str) -> Option<PropertyId> {
        let (group, name) = path.split_once('.')?;
        match group {
            "ins" => self.input(name),
            "outs" => self.output(name),
            _ => None,
        }
    }

    /// Iterate every property id owned by this component, inputs first
    pub fn property_ids(&self) -> impl Iterator<Item = PropertyId> + '_ {
        self.ins.ids().chain(self.outs.ids())
    }
}
