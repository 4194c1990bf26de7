// SPDX-License-Identifier: MIT OR Apache-2.0
//! Node containers.

use crate::component::ComponentId;
use crate::graph::GraphId;
use crate::registry::ObjectRegistry;
use crate::types::COMPONENT_ROOT;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub Uuid);

impl NodeId {
    /// Create a new random node ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

/// A named container of components within a graph.
///
/// The node keeps its own component registry so node-scoped queries and
/// node-singleton checks stay local; the component payloads live in the
/// [`System`](crate::system::System) arena.
pub struct Node {
    /// Unique node ID
    pub id: NodeId,
    /// Display name
    pub name: String,
    /// Graph this node belongs to
    pub graph: GraphId,
    /// Tags carried by this node
    pub tags: Vec<String>,
    components: Vec<ComponentId>,
    registry: ObjectRegistry<ComponentId>,
}

impl Node {
    pub(crate) fn new(id: NodeId, name: impl Into<String>, graph: GraphId) -> Self {
        Self {
            id,
            name: name.into(),
            graph,
            tags: Vec::new(),
            components: Vec::new(),
            registry: ObjectRegistry::new(COMPONENT_ROOT),
        }
    }

    /// Component ids in creation order
    pub fn components(&self) -> &[ComponentId] {
        &self.components
    }

    /// Node-scoped component registry (type and tag queries, events)
    pub fn component_registry(&self) -> &ObjectRegistry<ComponentId> {
        &self.registry
    }

    pub(crate) fn component_registry_mut(&mut self) -> &mut ObjectRegistry<ComponentId> {
        &mut self.registry
    }

    /// Whether this node holds a component of the given type
    pub fn has_component(&self, type_name: &str) -> bool {
        self.registry.has(type_name)
    }

    pub(crate) fn attach(&mut self, component: ComponentId) {
        self.components.push(component);
    }

    pub(crate) fn detach(&mut self, component: ComponentId) {
        self.components.retain(|id| *id != component);
    }
}
