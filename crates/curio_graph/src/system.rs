// SPDX-License-Identifier: MIT OR Apache-2.0
//! Top-level system: arenas, aggregate registries and lifecycle.
//!
//! The [`System`] owns everything: the type registry, the graph/node/
//! component arenas, the property store and the aggregate registries that
//! index all nodes and components across the whole graph tree. All lifecycle
//! mutation (create/remove/link/activate) goes through methods here so the
//! registries, arenas and edge tables never drift apart.

use crate::component::{Component, ComponentId};
use crate::graph::{Graph, GraphId};
use crate::node::{Node, NodeId};
use crate::property::{Property, PropertyValue};
use crate::registry::{ObjectRegistry, RegistryError};
use crate::store::{PropertyError, PropertyStore};
use crate::types::{ComponentType, TypeError, TypeRegistry, COMPONENT_ROOT, NODE_ROOT};
use crate::update::{ComponentUpdater, CycleError, Pulse, UpdateError};
use indexmap::{IndexMap, IndexSet};
use thiserror::Error;

/// Error raised by system lifecycle operations
#[derive(Debug, Error)]
pub enum SystemError {
    /// Type name is not registered
    #[error(transparent)]
    Type(#[from] TypeError),

    /// Registry mutation failed
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Property operation failed
    #[error(transparent)]
    Property(#[from] PropertyError),

    /// No graph with the given id
    #[error("Graph not found")]
    UnknownGraph,

    /// No node with the given id
    #[error("Node not found")]
    UnknownNode,

    /// No component with the given id
    #[error("Component not found")]
    UnknownComponent,

    /// A component has no property with the given name
    #[error("Component has no {group} property named '{name}'")]
    UnknownProperty {
        /// Group the name was looked up in (`ins` or `outs`)
        group: &'static str,
        /// The missing property name
        name: String,
    },

    /// A second node-singleton component of one type on the same node
    #[error("Node already has a '{0}' component (node singleton)")]
    NodeSingleton(String),

    /// A second system-singleton component of one type in the same system
    #[error("System already has a '{0}' component (system singleton)")]
    SystemSingleton(String),

    /// The main graph cannot be removed
    #[error("The main graph cannot be removed")]
    MainGraph,
}

/// Owner of the root graph, all arenas and the aggregate registries
pub struct System {
    types: TypeRegistry,
    graphs: IndexMap<GraphId, Graph>,
    main: GraphId,
    nodes: IndexMap<NodeId, Node>,
    components: IndexMap<ComponentId, Component>,
    properties: PropertyStore,
    node_registry: ObjectRegistry<NodeId>,
    component_registry: ObjectRegistry<ComponentId>,
}

impl System {
    /// Create a system with an active main graph
    pub fn new(types: TypeRegistry) -> Self {
        Self::with_main(types, GraphId::new(), "Main")
    }

    pub(crate) fn with_main(types: TypeRegistry, main: GraphId, name: &str) -> Self {
        let mut graphs = IndexMap::new();
        let mut graph = Graph::new(main, name, None);
        graph.active = true;
        graphs.insert(main, graph);
        tracing::info!(graph = name, "created system");
        Self {
            types,
            graphs,
            main,
            nodes: IndexMap::new(),
            components: IndexMap::new(),
            properties: PropertyStore::new(),
            node_registry: ObjectRegistry::new(NODE_ROOT),
            component_registry: ObjectRegistry::new(COMPONENT_ROOT),
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// The registered component types
    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    /// The property store (values, links, `"value"` events)
    pub fn properties(&self) -> &PropertyStore {
        &self.properties
    }

    /// Mutable access to the property store
    pub fn properties_mut(&mut self) -> &mut PropertyStore {
        &mut self.properties
    }

    /// Aggregate registry of all nodes in active graphs
    pub fn node_registry(&self) -> &ObjectRegistry<NodeId> {
        &self.node_registry
    }

    /// Aggregate registry of all components in active graphs
    pub fn component_registry(&self) -> &ObjectRegistry<ComponentId> {
        &self.component_registry
    }

    /// Id of the main graph
    pub fn main_graph_id(&self) -> GraphId {
        self.main
    }

    /// The main graph
    pub fn main_graph(&self) -> &Graph {
        &self.graphs[&self.main]
    }

    /// Get a graph by id
    pub fn graph(&self, id: GraphId) -> Option<&Graph> {
        self.graphs.get(&id)
    }

    /// Iterate all graphs, main first
    pub fn graphs(&self) -> impl Iterator<Item = &Graph> {
        self.graphs.values()
    }

    /// Get a node by id
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    /// Get a component by id
    pub fn component(&self, id: ComponentId) -> Option<&Component> {
        self.components.get(&id)
    }

    // ------------------------------------------------------------------
    // Graphs
    // ------------------------------------------------------------------

    /// Create an inactive subgraph, optionally owned by a parent component
    pub fn create_graph(
        &mut self,
        name: impl Into<String>,
        parent: Option<ComponentId>,
    ) -> Result<GraphId, SystemError> {
        self.create_graph_with_id(name, parent, GraphId::new())
    }

    /// Create an inactive subgraph with a caller-provided id
    pub fn create_graph_with_id(
        &mut self,
        name: impl Into<String>,
        parent: Option<ComponentId>,
        id: GraphId,
    ) -> Result<GraphId, SystemError> {
        if self.graphs.contains_key(&id) {
            return Err(RegistryError::DuplicateId.into());
        }
        if let Some(parent) = parent {
            if !self.components.contains_key(&parent) {
                return Err(SystemError::UnknownComponent);
            }
        }
        let name = name.into();
        tracing::info!(graph = %name, "created subgraph");
        self.graphs.insert(id, Graph::new(id, name, parent));
        Ok(id)
    }

    /// Bind an inactive graph's nodes and components into the aggregate
    /// registries. A no-op when the graph is already active; fails before
    /// any binding when the batch would violate a system-singleton
    /// constraint.
    pub fn activate_graph(&mut self, id: GraphId) -> Result<(), SystemError> {
        let graph = self.graphs.get(&id).ok_or(SystemError::UnknownGraph)?;
        if graph.active {
            return Ok(());
        }

        // Pre-check system singletons: against the aggregate registry and
        // within the batch itself.
        let component_ids: Vec<ComponentId> = graph.component_registry().ids().collect();
        let node_ids: Vec<NodeId> = graph.node_registry().ids().collect();
        let mut seen: IndexSet<&str> = IndexSet::new();
        for component_id in &component_ids {
            let component = self
                .components
                .get(component_id)
                .ok_or(SystemError::UnknownComponent)?;
            let component_type = self.types.get(&component.type_name)?;
            if component_type.system_singleton {
                let name = component.type_name.as_str();
                if self.component_registry.has(name) || !seen.insert(name) {
                    return Err(SystemError::SystemSingleton(name.to_string()));
                }
            }
        }

        for node_id in &node_ids {
            let node = self.nodes.get(node_id).ok_or(SystemError::UnknownNode)?;
            let tags = node.tags.clone();
            self.node_registry.add(*node_id, &[NODE_ROOT])?;
            for tag in &tags {
                self.node_registry.add_by_tag(tag, *node_id)?;
            }
        }
        for component_id in &component_ids {
            let component = self
                .components
                .get(component_id)
                .ok_or(SystemError::UnknownComponent)?;
            let tags = component.tags.clone();
            let lineage = self.types.get(&component.type_name)?.lineage();
            self.component_registry.add(*component_id, &lineage)?;
            for tag in &tags {
                self.component_registry.add_by_tag(tag, *component_id)?;
            }
        }

        let graph = self.graphs.get_mut(&id).ok_or(SystemError::UnknownGraph)?;
        graph.active = true;
        tracing::info!(graph = %graph.name, "activated graph");
        Ok(())
    }

    pub(crate) fn set_graph_parent(&mut self, id: GraphId, parent: ComponentId) {
        if let Some(graph) = self.graphs.get_mut(&id) {
            graph.parent = Some(parent);
        }
    }

    /// Dispose every node (and thereby every component) in a graph
    pub fn clear_graph(&mut self, id: GraphId) -> Result<(), SystemError> {
        let graph = self.graphs.get(&id).ok_or(SystemError::UnknownGraph)?;
        // Snapshot: nodes mutate the live list as they are removed.
        let node_ids = graph.nodes().to_vec();
        for node_id in node_ids {
            self.remove_node(node_id)?;
        }
        Ok(())
    }

    /// Remove a subgraph after clearing it; the main graph cannot be removed
    pub fn remove_graph(&mut self, id: GraphId) -> Result<(), SystemError> {
        if id == self.main {
            return Err(SystemError::MainGraph);
        }
        self.clear_graph(id)?;
        self.graphs.shift_remove(&id);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Nodes
    // ------------------------------------------------------------------

    /// Create a node in a graph
    pub fn create_node(
        &mut self,
        graph_id: GraphId,
        name: impl Into<String>,
    ) -> Result<NodeId, SystemError> {
        self.create_node_with_id(graph_id, name, NodeId::new())
    }

    /// Create a node with a caller-provided id
    pub fn create_node_with_id(
        &mut self,
        graph_id: GraphId,
        name: impl Into<String>,
        id: NodeId,
    ) -> Result<NodeId, SystemError> {
        if self.nodes.contains_key(&id) {
            return Err(RegistryError::DuplicateId.into());
        }
        let active = self
            .graphs
            .get(&graph_id)
            .ok_or(SystemError::UnknownGraph)?
            .active;

        let name = name.into();
        let node = Node::new(id, name.clone(), graph_id);
        self.nodes.insert(id, node);

        let graph = self.graphs.get_mut(&graph_id).ok_or(SystemError::UnknownGraph)?;
        graph.attach(id);
        graph.node_registry_mut().add(id, &[NODE_ROOT])?;
        if active {
            self.node_registry.add(id, &[NODE_ROOT])?;
        }
        tracing::debug!(node = %name, "created node");
        Ok(id)
    }

    /// Remove a node, disposing all of its components first
    pub fn remove_node(&mut self, id: NodeId) -> Result<(), SystemError> {
        let node = self.nodes.get(&id).ok_or(SystemError::UnknownNode)?;
        let graph_id = node.graph;
        let tags = node.tags.clone();
        let component_ids = node.components().to_vec();

        for component_id in component_ids {
            self.remove_component(component_id)?;
        }

        let active = self
            .graphs
            .get(&graph_id)
            .ok_or(SystemError::UnknownGraph)?
            .active;
        let graph = self.graphs.get_mut(&graph_id).ok_or(SystemError::UnknownGraph)?;
        graph.detach(id);
        for tag in &tags {
            graph.node_registry_mut().remove_by_tag(tag, id);
        }
        graph.node_registry_mut().remove(id, &[NODE_ROOT])?;
        if active {
            for tag in &tags {
                self.node_registry.remove_by_tag(tag, id);
            }
            self.node_registry.remove(id, &[NODE_ROOT])?;
        }

        self.nodes.shift_remove(&id);
        tracing::debug!(?id, "removed node");
        Ok(())
    }

    /// Tag a node in its graph registry and, when active, the aggregate
    pub fn add_node_tag(&mut self, id: NodeId, tag: &str) -> Result<(), SystemError> {
        let node = self.nodes.get(&id).ok_or(SystemError::UnknownNode)?;
        if node.tags.iter().any(|t| t == tag) {
            return Ok(());
        }
        let graph_id = node.graph;
        let active = self
            .graphs
            .get(&graph_id)
            .ok_or(SystemError::UnknownGraph)?
            .active;

        self.graphs
            .get_mut(&graph_id)
            .ok_or(SystemError::UnknownGraph)?
            .node_registry_mut()
            .add_by_tag(tag, id)?;
        if active {
            self.node_registry.add_by_tag(tag, id)?;
        }
        if let Some(node) = self.nodes.get_mut(&id) {
            node.tags.push(tag.to_string());
        }
        Ok(())
    }

    /// Nodes carrying a tag, from the aggregate registry
    pub fn nodes_by_tag(&self, tag: &str) -> Vec<&Node> {
        self.node_registry
            .by_tag(tag)
            .iter()
            .filter_map(|id| self.nodes.get(id))
            .collect()
    }

    /// First node with the given name, searching active graphs
    pub fn find_node_by_name(&self, name: &str) -> Option<&Node> {
        self.node_registry
            .ids()
            .filter_map(|id| self.nodes.get(&id))
            .find(|node| node.name == name)
    }

    // ------------------------------------------------------------------
    // Components
    // ------------------------------------------------------------------

    /// Create a component of a registered type on a node
    pub fn create_component(
        &mut self,
        node_id: NodeId,
        type_name: &str,
    ) -> Result<ComponentId, SystemError> {
        self.create_component_with_id(node_id, type_name, ComponentId::new())
    }

    /// Create a component with a caller-provided id.
    ///
    /// Fails fast (before any mutation) on unknown types, duplicate ids and
    /// singleton violations.
    pub fn create_component_with_id(
        &mut self,
        node_id: NodeId,
        type_name: &str,
        id: ComponentId,
    ) -> Result<ComponentId, SystemError> {
        if self.components.contains_key(&id) {
            return Err(RegistryError::DuplicateId.into());
        }
        let node = self.nodes.get(&node_id).ok_or(SystemError::UnknownNode)?;
        let graph_id = node.graph;
        let component_type: ComponentType = self.types.get(type_name)?.clone();

        if component_type.node_singleton && node.has_component(type_name) {
            return Err(SystemError::NodeSingleton(type_name.to_string()));
        }
        if component_type.system_singleton && self.component_registry.has(type_name) {
            return Err(SystemError::SystemSingleton(type_name.to_string()));
        }
        let active = self
            .graphs
            .get(&graph_id)
            .ok_or(SystemError::UnknownGraph)?
            .active;

        let mut component = Component::new(id, node_id, type_name);
        component.tags = component_type.tags.clone();
        for schema in &component_type.ins {
            let property = Property::from_schema(schema, "ins", id);
            component.ins.insert(schema.name.clone(), property.id);
            self.properties.insert(property);
        }
        for schema in &component_type.outs {
            let property = Property::from_schema(schema, "outs", id);
            component.outs.insert(schema.name.clone(), property.id);
            self.properties.insert(property);
        }

        let lineage = component_type.lineage();
        let tags = component.tags.clone();
        self.components.insert(id, component);

        if let Some(node) = self.nodes.get_mut(&node_id) {
            node.attach(id);
            node.component_registry_mut().add(id, &lineage)?;
        }
        let graph = self.graphs.get_mut(&graph_id).ok_or(SystemError::UnknownGraph)?;
        graph.component_registry_mut().add(id, &lineage)?;
        for tag in &tags {
            graph.component_registry_mut().add_by_tag(tag, id)?;
        }
        if active {
            self.component_registry.add(id, &lineage)?;
            for tag in &tags {
                self.component_registry.add_by_tag(tag, id)?;
            }
        }
        tracing::debug!(type_name, "created component");
        Ok(id)
    }

    /// Dispose a component: unlink and remove all of its properties, then
    /// deregister it everywhere. After this returns the component appears in
    /// no registry.
    pub fn remove_component(&mut self, id: ComponentId) -> Result<(), SystemError> {
        let component = self.components.get(&id).ok_or(SystemError::UnknownComponent)?;
        let node_id = component.node;
        let type_name = component.type_name.clone();
        let tags = component.tags.clone();
        let property_ids: Vec<_> = component.property_ids().collect();
        let lineage_owned: Vec<String> = self
            .types
            .get(&type_name)?
            .lineage()
            .iter()
            .map(|s| (*s).to_string())
            .collect();
        let lineage: Vec<&str> = lineage_owned.iter().map(String::as_str).collect();

        for property_id in property_ids {
            self.properties.remove(property_id);
        }

        if let Some(node) = self.nodes.get_mut(&node_id) {
            node.detach(id);
            node.component_registry_mut().remove(id, &lineage)?;
            let graph_id = node.graph;
            let active = self
                .graphs
                .get(&graph_id)
                .ok_or(SystemError::UnknownGraph)?
                .active;
            let graph = self.graphs.get_mut(&graph_id).ok_or(SystemError::UnknownGraph)?;
            for tag in &tags {
                graph.component_registry_mut().remove_by_tag(tag, id);
            }
            graph.component_registry_mut().remove(id, &lineage)?;
            if active {
                for tag in &tags {
                    self.component_registry.remove_by_tag(tag, id);
                }
                self.component_registry.remove(id, &lineage)?;
            }
        }

        self.components.shift_remove(&id);
        tracing::debug!(type_name = %type_name, "removed component");
        Ok(())
    }

    /// Tag a component at the graph and (when active) system scope
    pub fn add_component_tag(&mut self, id: ComponentId, tag: &str) -> Result<(), SystemError> {
        let component = self.components.get(&id).ok_or(SystemError::UnknownComponent)?;
        if component.tags.iter().any(|t| t == tag) {
            return Ok(());
        }
        let node_id = component.node;
        let graph_id = self
            .nodes
            .get(&node_id)
            .ok_or(SystemError::UnknownNode)?
            .graph;
        let active = self
            .graphs
            .get(&graph_id)
            .ok_or(SystemError::UnknownGraph)?
            .active;

        self.graphs
            .get_mut(&graph_id)
            .ok_or(SystemError::UnknownGraph)?
            .component_registry_mut()
            .add_by_tag(tag, id)?;
        if active {
            self.component_registry.add_by_tag(tag, id)?;
        }
        if let Some(component) = self.components.get_mut(&id) {
            component.tags.push(tag.to_string());
        }
        Ok(())
    }

    /// First component of a type, from the aggregate registry
    pub fn get_component(&self, type_name: &str) -> Result<&Component, SystemError> {
        let id = self.component_registry.get(type_name)?;
        self.components.get(&id).ok_or(SystemError::UnknownComponent)
    }

    /// First component of a type, or `None`
    pub fn get_component_opt(&self, type_name: &str) -> Option<&Component> {
        let id = self.component_registry.get_opt(type_name)?;
        self.components.get(&id)
    }

    /// All components registered under a type name
    pub fn components_of(&self, type_name: &str) -> Vec<&Component> {
        self.component_registry
            .get_array(type_name)
            .iter()
            .filter_map(|id| self.components.get(id))
            .collect()
    }

    /// Components carrying a tag, from the aggregate registry
    pub fn components_by_tag(&self, tag: &str) -> Vec<&Component> {
        self.component_registry
            .by_tag(tag)
            .iter()
            .filter_map(|id| self.components.get(id))
            .collect()
    }

    // ------------------------------------------------------------------
    // Linking and values
    // ------------------------------------------------------------------

    /// Link a source component's output into a target component's input
    pub fn link(
        &mut self,
        from: ComponentId,
        output: &str,
        to: ComponentId,
        input: &str,
    ) -> Result<(), SystemError> {
        let source = self
            .components
            .get(&from)
            .ok_or(SystemError::UnknownComponent)?
            .output(output)
            .ok_or_else(|| SystemError::UnknownProperty {
                group: "outs",
                name: output.to_string(),
            })?;
        let dependent = self
            .components
            .get(&to)
            .ok_or(SystemError::UnknownComponent)?
            .input(input)
            .ok_or_else(|| SystemError::UnknownProperty {
                group: "ins",
                name: input.to_string(),
            })?;
        self.properties.link(source, dependent)?;
        Ok(())
    }

    /// Unlink a component input; returns whether a link existed
    pub fn unlink(&mut self, to: ComponentId, input: &str) -> Result<bool, SystemError> {
        let dependent = self
            .components
            .get(&to)
            .ok_or(SystemError::UnknownComponent)?
            .input(input)
            .ok_or_else(|| SystemError::UnknownProperty {
                group: "ins",
                name: input.to_string(),
            })?;
        Ok(self.properties.unlink(dependent))
    }

    /// Set a component input value
    pub fn set_input(
        &mut self,
        id: ComponentId,
        name: &str,
        value: PropertyValue,
    ) -> Result<(), SystemError> {
        let property = self
            .components
            .get(&id)
            .ok_or(SystemError::UnknownComponent)?
            .input(name)
            .ok_or_else(|| SystemError::UnknownProperty {
                group: "ins",
                name: name.to_string(),
            })?;
        self.properties.set_value(property, value)?;
        Ok(())
    }

    /// Set a component output value
    pub fn set_output(
        &mut self,
        id: ComponentId,
        name: &str,
        value: PropertyValue,
    ) -> Result<(), SystemError> {
        let property = self
            .components
            .get(&id)
            .ok_or(SystemError::UnknownComponent)?
            .output(name)
            .ok_or_else(|| SystemError::UnknownProperty {
                group: "outs",
                name: name.to_string(),
            })?;
        self.properties.set_value(property, value)?;
        Ok(())
    }

    /// Set several component input values in one call.
    ///
    /// Every name is resolved before the first write, so an unknown input
    /// leaves the component untouched.
    pub fn set_inputs(
        &mut self,
        id: ComponentId,
        values: &[(&str, PropertyValue)],
    ) -> Result<(), SystemError> {
        let component = self
            .components
            .get(&id)
            .ok_or(SystemError::UnknownComponent)?;
        let mut resolved = Vec::with_capacity(values.len());
        for (name, value) in values {
            let property =
                component
                    .input(name)
                    .ok_or_else(|| SystemError::UnknownProperty {
                        group: "ins",
                        name: (*name).to_string(),
                    })?;
            resolved.push((property, value.clone()));
        }
        for (property, value) in resolved {
            self.properties.set_value(property, value)?;
        }
        Ok(())
    }

    /// Deep copy of a component's input values in declaration order
    pub fn clone_inputs(&self, id: ComponentId) -> Result<Vec<(String, PropertyValue)>, SystemError> {
        let component = self
            .components
            .get(&id)
            .ok_or(SystemError::UnknownComponent)?;
        Ok(component
            .ins
            .iter()
            .filter_map(|(name, property)| {
                self.properties
                    .clone_value(property)
                    .map(|value| (name.to_string(), value))
            })
            .collect())
    }

    /// Current value of a component input
    pub fn input_value(&self, id: ComponentId, name: &str) -> Option<&PropertyValue> {
        let property = self.components.get(&id)?.input(name)?;
        self.properties.value(property)
    }

    /// Current value of a component output
    pub fn output_value(&self, id: ComponentId, name: &str) -> Option<&PropertyValue> {
        let property = self.components.get(&id)?.output(name)?;
        self.properties.value(property)
    }

    // ------------------------------------------------------------------
    // Update driving
    // ------------------------------------------------------------------

    /// Topological order of components derived from the property link
    /// table: every component sorts after the components whose outputs feed
    /// its inputs.
    pub fn dependency_order(&self) -> Result<Vec<ComponentId>, CycleError> {
        // dependent component -> providers that must update first
        let mut providers: IndexMap<ComponentId, Vec<ComponentId>> = IndexMap::new();
        for (source, dependent) in self.properties.link_edges() {
            let from = self.properties.get(source).map(|p| p.owner);
            let to = self.properties.get(dependent).map(|p| p.owner);
            if let (Some(from), Some(to)) = (from, to) {
                // A component feeding itself is not an ordering constraint.
                if from != to {
                    providers.entry(to).or_default().push(from);
                }
            }
        }

        let mut visited = IndexSet::new();
        let mut temp_mark = IndexSet::new();
        let mut order = Vec::with_capacity(self.components.len());
        for id in self.components.keys() {
            if !visited.contains(id) {
                Self::visit(*id, &providers, &mut visited, &mut temp_mark, &mut order)?;
            }
        }
        Ok(order)
    }

    fn visit(
        id: ComponentId,
        providers: &IndexMap<ComponentId, Vec<ComponentId>>,
        visited: &mut IndexSet<ComponentId>,
        temp_mark: &mut IndexSet<ComponentId>,
        order: &mut Vec<ComponentId>,
    ) -> Result<(), CycleError> {
        if temp_mark.contains(&id) {
            return Err(CycleError);
        }
        if visited.contains(&id) {
            return Ok(());
        }

        temp_mark.insert(id);
        if let Some(deps) = providers.get(&id) {
            for dep in deps {
                Self::visit(*dep, providers, visited, temp_mark, order)?;
            }
        }
        temp_mark.shift_remove(&id);
        visited.insert(id);
        order.push(id);
        Ok(())
    }

    /// Run one pulse: propagate pending changes, call `update` on every
    /// component with a changed input (in dependency order, propagating
    /// after each), `tick` every component, then clear all changed flags.
    /// Returns the number of components updated.
    pub fn update_cycle(
        &mut self,
        updater: &mut dyn ComponentUpdater,
        pulse: &Pulse,
    ) -> Result<usize, UpdateError> {
        let order = self.dependency_order()?;
        self.properties.propagate();

        let mut updated = 0;
        for id in &order {
            let Some(component) = self.components.get(id) else {
                continue;
            };
            let input_changed = component.ins.ids().any(|p| self.properties.is_changed(p));
            if input_changed {
                updater.update(component, &mut self.properties, pulse)?;
                updated += 1;
                self.properties.propagate();
            }
        }
        for id in &order {
            if let Some(component) = self.components.get(id) {
                updater.tick(component, &mut self.properties, pulse)?;
            }
        }
        self.properties.clear_changed();
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::PropertySchema;

    fn test_types() -> TypeRegistry {
        let mut types = TypeRegistry::new();
        types.register(
            ComponentType::new("CLight")
                .with_ancestor("CObject3D")
                .with_input(PropertySchema::float("intensity", 1.0).with_range(0.0, 10.0))
                .with_input(PropertySchema::color("color", [1.0, 1.0, 1.0, 1.0]))
                .with_output(PropertySchema::float("power", 0.0)),
        );
        types.register(
            ComponentType::new("CMaterial")
                .with_input(PropertySchema::float("colorMap", 0.0))
                .with_output(PropertySchema::float("self", 0.0)),
        );
        types.register(
            ComponentType::new("CScene")
                .with_ancestor("CObject3D")
                .system_singleton(),
        );
        types.register(ComponentType::new("CTransform").node_singleton());
        types
    }

    fn system_with_node() -> (System, NodeId) {
        let mut system = System::new(test_types());
        let main = system.main_graph_id();
        let node = system.create_node(main, "Object").unwrap();
        (system, node)
    }

    #[test]
    fn test_component_lifecycle_scenario() {
        let (mut system, node) = system_with_node();
        let light = system.create_component(node, "CLight").unwrap();

        assert_eq!(system.component_registry().count("CLight"), 1);
        assert_eq!(system.component_registry().count("CObject3D"), 1);
        assert_eq!(system.get_component("CLight").unwrap().id, light);

        system.remove_component(light).unwrap();
        assert_eq!(system.component_registry().count("CLight"), 0);
        assert!(system.get_component_opt("CLight").is_none());
        assert!(system.get_component("CLight").is_err());
        assert!(system.properties().is_empty());
    }

    #[test]
    fn test_bulk_input_assignment_and_cloning() {
        let (mut system, node) = system_with_node();
        let light = system.create_component(node, "CLight").unwrap();

        system
            .set_inputs(
                light,
                &[
                    ("intensity", PropertyValue::Float(2.0)),
                    ("color", PropertyValue::Color([1.0, 0.0, 0.0, 1.0])),
                ],
            )
            .unwrap();
        assert_eq!(
            system.input_value(light, "intensity"),
            Some(&PropertyValue::Float(2.0))
        );
        assert_eq!(
            system.clone_inputs(light).unwrap(),
            vec![
                ("intensity".to_string(), PropertyValue::Float(2.0)),
                (
                    "color".to_string(),
                    PropertyValue::Color([1.0, 0.0, 0.0, 1.0])
                ),
            ]
        );

        // One bad name rejects the whole batch before any write.
        assert!(matches!(
            system.set_inputs(
                light,
                &[
                    ("intensity", PropertyValue::Float(9.0)),
                    ("wattage", PropertyValue::Float(1.0)),
                ],
            ),
            Err(SystemError::UnknownProperty { .. })
        ));
        assert_eq!(
            system.input_value(light, "intensity"),
            Some(&PropertyValue::Float(2.0))
        );
    }

    #[test]
    fn test_node_singleton_enforced_per_node() {
        let (mut system, node) = system_with_node();
        system.create_component(node, "CTransform").unwrap();
        assert!(matches!(
            system.create_component(node, "CTransform"),
            Err(SystemError::NodeSingleton(_))
        ));

        // A second node may carry its own instance.
        let main = system.main_graph_id();
        let other = system.create_node(main, "Other").unwrap();
        assert!(system.create_component(other, "CTransform").is_ok());
    }

    #[test]
    fn test_system_singleton_enforced_per_system() {
        let (mut system, node) = system_with_node();
        let main = system.main_graph_id();
        let other = system.create_node(main, "Other").unwrap();

        system.create_component(node, "CScene").unwrap();
        assert!(matches!(
            system.create_component(other, "CScene"),
            Err(SystemError::SystemSingleton(_))
        ));
    }

    #[test]
    fn test_non_singleton_duplicates_allowed() {
        let (mut system, node) = system_with_node();
        system.create_component(node, "CLight").unwrap();
        system.create_component(node, "CLight").unwrap();
        assert_eq!(system.component_registry().count("CLight"), 2);
    }

    #[test]
    fn test_two_node_link_scenario() {
        let (mut system, node_a) = system_with_node();
        let main = system.main_graph_id();
        let node_b = system.create_node(main, "B").unwrap();

        let material = system.create_component(node_a, "CMaterial").unwrap();
        let consumer = system.create_component(node_b, "CMaterial").unwrap();
        system.link(material, "self", consumer, "colorMap").unwrap();

        system
            .set_output(material, "self", PropertyValue::Float(0.75))
            .unwrap();
        system.properties_mut().propagate();

        let input = system.component(consumer).unwrap().input("colorMap").unwrap();
        assert!(system.properties().is_changed(input));
        assert_eq!(
            system.input_value(consumer, "colorMap"),
            Some(&PropertyValue::Float(0.75))
        );

        // Unlinked inputs stop following the source.
        assert!(system.unlink(consumer, "colorMap").unwrap());
        system
            .set_output(material, "self", PropertyValue::Float(0.1))
            .unwrap();
        system.properties_mut().propagate();
        assert_eq!(
            system.input_value(consumer, "colorMap"),
            Some(&PropertyValue::Float(0.75))
        );
    }

    #[test]
    fn test_remove_node_disposes_components_exhaustively() {
        let (mut system, node) = system_with_node();
        system.create_component(node, "CLight").unwrap();
        system.create_component(node, "CMaterial").unwrap();

        system.remove_node(node).unwrap();
        assert!(system.node(node).is_none());
        assert!(system.component_registry().is_empty());
        assert!(system.node_registry().is_empty());
        assert!(system.properties().is_empty());
        assert_eq!(system.main_graph().node_count(), 0);
    }

    #[test]
    fn test_subgraph_activation_binds_aggregates() {
        let (mut system, node) = system_with_node();
        let scene = system.create_component(node, "CScene").unwrap();
        let subgraph = system.create_graph("Detail", Some(scene)).unwrap();
        let sub_node = system.create_node(subgraph, "Inner").unwrap();
        system.create_component(sub_node, "CLight").unwrap();

        // Inactive subgraph contents stay out of the aggregates.
        assert_eq!(system.component_registry().count("CLight"), 0);
        assert!(!system.node_registry().contains(sub_node));

        system.activate_graph(subgraph).unwrap();
        assert_eq!(system.component_registry().count("CLight"), 1);
        assert!(system.node_registry().contains(sub_node));

        // Re-activation is a no-op.
        system.activate_graph(subgraph).unwrap();
        assert_eq!(system.component_registry().count("CLight"), 1);
    }

    #[test]
    fn test_subgraph_activation_rejects_singleton_conflict() {
        let (mut system, node) = system_with_node();
        // The inactive subgraph holds its instance before the main graph
        // does, so creation passes and the conflict surfaces on activation.
        let subgraph = system.create_graph("Detail", None).unwrap();
        let sub_node = system.create_node(subgraph, "Inner").unwrap();
        system.create_component(sub_node, "CScene").unwrap();
        system.create_component(node, "CScene").unwrap();

        assert!(matches!(
            system.activate_graph(subgraph),
            Err(SystemError::SystemSingleton(_))
        ));
        // Nothing was bound.
        assert!(!system.node_registry().contains(sub_node));
    }

    #[test]
    fn test_tags_and_name_queries() {
        let (mut system, node) = system_with_node();
        let light = system.create_component(node, "CLight").unwrap();

        system.add_node_tag(node, "articles").unwrap();
        system.add_component_tag(light, "controller").unwrap();

        assert_eq!(system.nodes_by_tag("articles").len(), 1);
        assert_eq!(system.components_by_tag("controller").len(), 1);
        assert!(system.find_node_by_name("Object").is_some());
        assert!(system.find_node_by_name("Nope").is_none());

        system.remove_component(light).unwrap();
        assert!(system.components_by_tag("controller").is_empty());
    }

    #[test]
    fn test_dependency_order_follows_links() {
        let (mut system, node) = system_with_node();
        let a = system.create_component(node, "CMaterial").unwrap();
        let b = system.create_component(node, "CMaterial").unwrap();
        let c = system.create_component(node, "CMaterial").unwrap();
        // c depends on b depends on a.
        system.link(a, "self", b, "colorMap").unwrap();
        system.link(b, "self", c, "colorMap").unwrap();

        let order = system.dependency_order().unwrap();
        let pos = |id| order.iter().position(|o| *o == id).unwrap();
        assert!(pos(a) < pos(b));
        assert!(pos(b) < pos(c));
    }

    struct Doubler;

    impl ComponentUpdater for Doubler {
        fn update(
            &mut self,
            component: &Component,
            properties: &mut PropertyStore,
            _pulse: &Pulse,
        ) -> Result<(), UpdateError> {
            let input = component.input("colorMap").expect("test type");
            let value = properties.value(input).and_then(PropertyValue::as_float);
            if let (Some(value), Some(output)) = (value, component.output("self")) {
                properties.set_value(output, PropertyValue::Float(value * 2.0))?;
            }
            Ok(())
        }
    }

    #[test]
    fn test_update_cycle_runs_in_dependency_order() {
        let (mut system, node) = system_with_node();
        let a = system.create_component(node, "CMaterial").unwrap();
        let b = system.create_component(node, "CMaterial").unwrap();
        system.link(a, "self", b, "colorMap").unwrap();

        system
            .set_input(a, "colorMap", PropertyValue::Float(1.0))
            .unwrap();

        let pulse = Pulse::default();
        let updated = system.update_cycle(&mut Doubler, &pulse).unwrap();
        assert_eq!(updated, 2, "change flowed through both components");
        assert_eq!(
            system.output_value(b, "self"),
            Some(&PropertyValue::Float(4.0))
        );

        // Flags were consumed; a second pulse with no writes updates nothing.
        let updated = system.update_cycle(&mut Doubler, &pulse).unwrap();
        assert_eq!(updated, 0);
    }
}
