// SPDX-License-Identifier: MIT OR Apache-2.0
//! Versioned documents for saving and restoring a whole system.
//!
//! A [`SystemDocument`] captures the graph tree by value: graphs, nodes,
//! components, current property values and the link table. Component types
//! are *not* embedded; restoring resolves type names against a
//! [`TypeRegistry`] supplied by the caller, and any unknown name, duplicate
//! id or dangling link rejects the document as a whole.

use crate::component::ComponentId;
use crate::graph::GraphId;
use crate::node::NodeId;
use crate::property::PropertyValue;
use crate::system::{System, SystemError};
use crate::types::TypeRegistry;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Current document format version.
pub const FORMAT_VERSION: u32 = 1;

/// Error raised while building or restoring a document
#[derive(Debug, Error)]
pub enum DocumentError {
    /// Document was written by an unsupported format version
    #[error("Unsupported document version {0} (expected {FORMAT_VERSION})")]
    Version(u32),

    /// The document contains no graphs
    #[error("Document has no main graph")]
    NoMainGraph,

    /// A subgraph names a parent component absent from the document
    #[error("Graph '{graph}' references unknown parent component")]
    UnknownParent {
        /// Name of the offending graph
        graph: String,
    },

    /// A component document carries a property its type does not declare
    #[error("Component '{type_name}' has no {group} property '{name}'")]
    UnknownDocumentProperty {
        /// Component type name
        type_name: String,
        /// Property group (`ins` or `outs`)
        group: &'static str,
        /// The undeclared property name
        name: String,
    },

    /// A link references a component or output absent from the document
    #[error("Dangling link to component {component} output '{output}'")]
    DanglingLink {
        /// Referenced source component id
        component: Uuid,
        /// Referenced output property name
        output: String,
    },

    /// Rebuilding the system failed (unknown type, duplicate id, singleton
    /// violation, value type mismatch)
    #[error(transparent)]
    System(#[from] SystemError),

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

/// Serialized system: every graph, main graph first
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemDocument {
    /// Format version for compatibility checks
    pub version: u32,
    /// All graphs; the first entry is the main graph
    pub graphs: Vec<GraphDocument>,
}

/// Serialized graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphDocument {
    /// Graph id
    pub id: Uuid,
    /// Display name
    pub name: String,
    /// Owning component for nested subgraphs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<Uuid>,
    /// Whether the graph was bound into the system registries
    pub active: bool,
    /// Nodes in creation order
    pub nodes: Vec<NodeDocument>,
}

/// Serialized node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDocument {
    /// Node id
    pub id: Uuid,
    /// Display name
    pub name: String,
    /// Tags on the node
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Components in creation order
    pub components: Vec<ComponentDocument>,
}

/// Serialized component
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentDocument {
    /// Component id
    pub id: Uuid,
    /// Registered type name, resolved on restore
    pub type_name: String,
    /// Tags on the component
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Input values and links
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ins: Vec<PropertyDocument>,
    /// Output values
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outs: Vec<PropertyDocument>,
}

/// Serialized property value, with the incoming link for inputs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyDocument {
    /// Property name within its group
    pub name: String,
    /// Current value
    pub value: PropertyValue,
    /// Incoming link, inputs only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<LinkDocument>,
}

/// Serialized link edge: the source side of an input link
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkDocument {
    /// Source component id
    pub component: Uuid,
    /// Source output property name
    pub output: String,
}

impl System {
    /// Capture the whole system as a document
    pub fn to_document(&self) -> SystemDocument {
        let graphs = self
            .graphs()
            .map(|graph| GraphDocument {
                id: graph.id.0,
                name: graph.name.clone(),
                parent: graph.parent.map(|c| c.0),
                active: graph.active,
                nodes: graph
                    .nodes()
                    .iter()
                    .filter_map(|id| self.node(*id))
                    .map(|node| NodeDocument {
                        id: node.id.0,
                        name: node.name.clone(),
                        tags: node.tags.clone(),
                        components: node
                            .components()
                            .iter()
                            .filter_map(|id| self.component(*id))
                            .map(|component| self.component_document(component))
                            .collect(),
                    })
                    .collect(),
            })
            .collect();
        SystemDocument {
            version: FORMAT_VERSION,
            graphs,
        }
    }

    fn component_document(&self, component: &crate::component::Component) -> ComponentDocument {
        let store = self.properties();
        let ins = component
            .ins
            .iter()
            .filter_map(|(name, id)| {
                let value = store.clone_value(id)?;
                let link = store.source_of(id).and_then(|source| {
                    let property = store.get(source)?;
                    Some(LinkDocument {
                        component: property.owner.0,
                        output: property.name.clone(),
                    })
                });
                Some(PropertyDocument {
                    name: name.to_string(),
                    value,
                    link,
                })
            })
            .collect();
        let outs = component
            .outs
            .iter()
            .filter_map(|(name, id)| {
                Some(PropertyDocument {
                    name: name.to_string(),
                    value: store.clone_value(id)?,
                    link: None,
                })
            })
            .collect();
        ComponentDocument {
            id: component.id.0,
            type_name: component.type_name.clone(),
            tags: component.tags.clone(),
            ins,
            outs,
        }
    }

    /// Rebuild a system from a document, resolving type names against the
    /// given registry.
    ///
    /// Restoration is all-or-nothing: an unsupported version, unknown type
    /// name, duplicate id, dangling link or value type mismatch fails the
    /// whole load and no partial system is returned. Restored values carry
    /// clear changed flags, so the first pulse after a load is quiet.
    pub fn from_document(
        document: &SystemDocument,
        types: TypeRegistry,
    ) -> Result<Self, DocumentError> {
        if document.version != FORMAT_VERSION {
            return Err(DocumentError::Version(document.version));
        }
        let main = document.graphs.first().ok_or(DocumentError::NoMainGraph)?;
        let mut system = System::with_main(types, GraphId(main.id), &main.name);

        for graph in document.graphs.iter().skip(1) {
            // Parents resolve after all components exist.
            system.create_graph_with_id(&graph.name, None, GraphId(graph.id))?;
        }

        for graph in &document.graphs {
            let graph_id = GraphId(graph.id);
            for node in &graph.nodes {
                let node_id = NodeId(node.id);
                system.create_node_with_id(graph_id, &node.name, node_id)?;
                for tag in &node.tags {
                    system.add_node_tag(node_id, tag)?;
                }
                for component in &node.components {
                    system.restore_component(node_id, component)?;
                }
            }
        }

        for graph in document.graphs.iter().skip(1) {
            if let Some(parent) = graph.parent {
                let parent = ComponentId(parent);
                if system.component(parent).is_none() {
                    return Err(DocumentError::UnknownParent {
                        graph: graph.name.clone(),
                    });
                }
                system.set_graph_parent(GraphId(graph.id), parent);
            }
        }

        // Links resolve once every component exists.
        for graph in &document.graphs {
            for node in &graph.nodes {
                for component in &node.components {
                    system.restore_links(component)?;
                }
            }
        }

        // Subgraph activation re-runs the singleton checks.
        for graph in document.graphs.iter().skip(1) {
            if graph.active {
                system.activate_graph(GraphId(graph.id))?;
            }
        }

        system.properties_mut().clear_changed();
        tracing::info!(
            graphs = document.graphs.len(),
            "restored system from document"
        );
        Ok(system)
    }

    fn restore_component(
        &mut self,
        node_id: NodeId,
        document: &ComponentDocument,
    ) -> Result<(), DocumentError> {
        let component_id = ComponentId(document.id);
        self.create_component_with_id(node_id, &document.type_name, component_id)?;

        for (group, entries) in [("ins", &document.ins), ("outs", &document.outs)] {
            for entry in entries {
                let component = self
                    .component(component_id)
                    .ok_or(SystemError::UnknownComponent)?;
                let property = match group {
                    "ins" => component.input(&entry.name),
                    _ => component.output(&entry.name),
                };
                let property = property.ok_or_else(|| DocumentError::UnknownDocumentProperty {
                    type_name: document.type_name.clone(),
                    group,
                    name: entry.name.clone(),
                })?;
                self.restore_value(property, &entry.value)?;
            }
        }

        let declared = self
            .component(component_id)
            .map(|c| c.tags.clone())
            .unwrap_or_default();
        for tag in &document.tags {
            if !declared.iter().any(|t| t == tag) {
                self.add_component_tag(component_id, tag)?;
            }
        }
        Ok(())
    }

    /// Write a restored value without setting the changed flag
    fn restore_value(
        &mut self,
        id: crate::property::PropertyId,
        value: &PropertyValue,
    ) -> Result<(), DocumentError> {
        let store = self.properties_mut();
        let property = store.get_mut(id).ok_or(SystemError::Property(
            crate::store::PropertyError::NotFound,
        ))?;
        let converted = value.converted_to(property.schema.kind).ok_or_else(|| {
            SystemError::Property(crate::store::PropertyError::TypeMismatch {
                expected: property.schema.kind,
                found: value.property_type(),
            })
        })?;
        property.value = converted;
        Ok(())
    }

    fn restore_links(&mut self, document: &ComponentDocument) -> Result<(), DocumentError> {
        for entry in &document.ins {
            let Some(link) = &entry.link else {
                continue;
            };
            let dangling = || DocumentError::DanglingLink {
                component: link.component,
                output: link.output.clone(),
            };
            let source = self
                .component(ComponentId(link.component))
                .ok_or_else(dangling)?
                .output(&link.output)
                .ok_or_else(dangling)?;
            let dependent = self
                .component(ComponentId(document.id))
                .ok_or(SystemError::UnknownComponent)?
                .input(&entry.name)
                .ok_or_else(dangling)?;
            self.properties_mut()
                .link(source, dependent)
                .map_err(SystemError::from)?;
        }
        Ok(())
    }
}

impl SystemDocument {
    /// Serialize to pretty JSON
    pub fn to_json(&self) -> Result<String, DocumentError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Deserialize from JSON
    pub fn from_json(text: &str) -> Result<Self, DocumentError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Serialize to RON
    pub fn to_ron(&self) -> Result<String, DocumentError> {
        Ok(ron::ser::to_string_pretty(
            self,
            ron::ser::PrettyConfig::default(),
        )?)
    }

    /// Deserialize from RON
    pub fn from_ron(text: &str) -> Result<Self, DocumentError> {
        Ok(ron::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::PropertySchema;
    use crate::types::ComponentType;

    fn test_types() -> TypeRegistry {
        let mut types = TypeRegistry::new();
        types.register(
            ComponentType::new("CLight")
                .with_ancestor("CObject3D")
                .with_input(PropertySchema::float("intensity", 1.0))
                .with_output(PropertySchema::float("power", 0.0)),
        );
        types.register(
            ComponentType::new("CAmplifier")
                .with_input(PropertySchema::float("signal", 0.0))
                .with_output(PropertySchema::float("out", 0.0)),
        );
        types.register(ComponentType::new("CScene").system_singleton());
        types
    }

    fn sample_system() -> System {
        let mut system = System::new(test_types());
        let main = system.main_graph_id();
        let node_a = system.create_node(main, "Lamp").unwrap();
        let node_b = system.create_node(main, "Amp").unwrap();
        system.add_node_tag(node_a, "articles").unwrap();

        let light = system.create_component(node_a, "CLight").unwrap();
        let amp = system.create_component(node_b, "CAmplifier").unwrap();
        system
            .set_input(light, "intensity", PropertyValue::Float(2.5))
            .unwrap();
        system
            .set_output(light, "power", PropertyValue::Float(0.5))
            .unwrap();
        system.link(light, "power", amp, "signal").unwrap();
        system
    }

    #[test]
    fn test_round_trip_preserves_structure_values_and_links() {
        let system = sample_system();
        let document = system.to_document();
        let restored = System::from_document(&document, test_types()).unwrap();

        let lamp = restored.find_node_by_name("Lamp").unwrap();
        assert_eq!(lamp.tags, vec!["articles".to_string()]);

        let light = restored.get_component("CLight").unwrap();
        assert_eq!(
            restored.input_value(light.id, "intensity"),
            Some(&PropertyValue::Float(2.5))
        );
        assert_eq!(
            restored.output_value(light.id, "power"),
            Some(&PropertyValue::Float(0.5))
        );

        // The lineage index and the link edge survive.
        assert_eq!(restored.component_registry().count("CObject3D"), 1);
        let amp = restored.get_component("CAmplifier").unwrap();
        let signal = amp.input("signal").unwrap();
        assert!(restored.properties().is_linked(signal));

        // Restored values start quiet.
        assert!(restored.properties().changed_ids().is_empty());
    }

    #[test]
    fn test_text_round_trips() {
        let document = sample_system().to_document();

        let json = document.to_json().unwrap();
        let from_json = SystemDocument::from_json(&json).unwrap();
        assert_eq!(from_json.graphs.len(), document.graphs.len());

        let ron = document.to_ron().unwrap();
        let from_ron = SystemDocument::from_ron(&ron).unwrap();
        assert_eq!(from_ron.graphs[0].nodes.len(), document.graphs[0].nodes.len());
    }

    #[test]
    fn test_unknown_type_rejects_document() {
        let document = sample_system().to_document();
        // A registry missing CAmplifier cannot restore the document.
        let mut types = TypeRegistry::new();
        types.register(
            ComponentType::new("CLight")
                .with_ancestor("CObject3D")
                .with_input(PropertySchema::float("intensity", 1.0))
                .with_output(PropertySchema::float("power", 0.0)),
        );
        assert!(System::from_document(&document, types).is_err());
    }

    #[test]
    fn test_version_mismatch_rejected() {
        let mut document = sample_system().to_document();
        document.version = 99;
        assert!(matches!(
            System::from_document(&document, test_types()),
            Err(DocumentError::Version(99))
        ));
    }

    #[test]
    fn test_dangling_link_rejected() {
        let mut document = sample_system().to_document();
        // Point the amplifier's link at a component that does not exist.
        for graph in &mut document.graphs {
            for node in &mut graph.nodes {
                for component in &mut node.components {
                    for input in &mut component.ins {
                        if let Some(link) = &mut input.link {
                            link.component = Uuid::new_v4();
                        }
                    }
                }
            }
        }
        assert!(matches!(
            System::from_document(&document, test_types()),
            Err(DocumentError::DanglingLink { .. })
        ));
    }

    #[test]
    fn test_inactive_subgraph_round_trip() {
        let mut system = sample_system();
        let scene = {
            let main = system.main_graph_id();
            let node = system.create_node(main, "Scene").unwrap();
            system.create_component(node, "CScene").unwrap()
        };
        let subgraph = system.create_graph("Detail", Some(scene)).unwrap();
        let inner = system.create_node(subgraph, "Inner").unwrap();
        system.create_component(inner, "CLight").unwrap();

        let document = system.to_document();
        let restored = System::from_document(&document, test_types()).unwrap();

        let graph = restored.graph(subgraph).unwrap();
        assert!(!graph.active);
        assert_eq!(graph.parent, Some(scene));
        assert_eq!(graph.node_count(), 1);
        // Only the active main graph's light is in the aggregate.
        assert_eq!(restored.component_registry().count("CLight"), 1);
    }
}
