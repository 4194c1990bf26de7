// SPDX-License-Identifier: MIT OR Apache-2.0
//! Graph containers: node collections, optionally nested as subgraphs.

use crate::component::ComponentId;
use crate::node::NodeId;
use crate::registry::ObjectRegistry;
use crate::types::{COMPONENT_ROOT, NODE_ROOT};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GraphId(pub Uuid);

impl GraphId {
    /// Create a new random graph ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for GraphId {
    fn default() -> Self {
        Self::new()
    }
}

/// A container of nodes.
///
/// The system's main graph is always active. Subgraphs are owned by a parent
/// component and stay inactive (indexed only in their own registries) until
/// [`System::activate_graph`](crate::system::System::activate_graph) composes
/// them into the aggregate registries.
pub struct Graph {
    /// Unique graph ID
    pub id: GraphId,
    /// Display name
    pub name: String,
    /// Owning component, for nested subgraphs
    pub parent: Option<ComponentId>,
    /// Whether this graph is bound into the system registries
    pub active: bool,
    nodes: Vec<NodeId>,
    node_registry: ObjectRegistry<NodeId>,
    component_registry: ObjectRegistry<ComponentId>,
}

impl Graph {
    pub(crate) fn new(id: GraphId, name: impl Into<String>, parent: Option<ComponentId>) -> Self {
        Self {
            id,
            name: name.into(),
            parent,
            active: false,
            nodes: Vec::new(),
            node_registry: ObjectRegistry::new(NODE_ROOT),
            component_registry: ObjectRegistry::new(COMPONENT_ROOT),
        }
    }

    /// Node ids in creation order
    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    /// Number of nodes in the graph
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Graph-scoped node registry
    pub fn node_registry(&self) -> &ObjectRegistry<NodeId> {
        &self.node_registry
    }

    /// Graph-scoped component registry
    pub fn component_registry(&self) -> &ObjectRegistry<ComponentId> {
        &self.component_registry
    }

    pub(crate) fn node_registry_mut(&mut self) -> &mut ObjectRegistry<NodeId> {
        &mut self.node_registry
    }

    pub(crate) fn component_registry_mut(&mut self) -> &mut ObjectRegistry<ComponentId> {
        &mut self.component_registry
    }

    pub(crate) fn attach(&mut self, node: NodeId) {
        self.nodes.push(node);
    }

    pub(crate) fn detach(&mut self, node: NodeId) {
        self.nodes.retain(|id| *id != node);
    }
}
