// SPDX-License-Identifier: MIT OR Apache-2.0
//! Component type descriptors and the type registry.
//!
//! Instead of runtime reflection over a prototype chain, every component
//! type is described once by a [`ComponentType`]: its name, an explicit
//! ancestor list terminating at the [`COMPONENT_ROOT`], singleton flags,
//! declared tags and the input/output property schemas. Deserialization
//! resolves type names through the [`TypeRegistry`]; unknown names fail.

use crate::property::PropertySchema;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Root type name terminating every component lineage.
pub const COMPONENT_ROOT: &str = "Component";

/// Root type name for the node registries.
pub const NODE_ROOT: &str = "Node";

/// Error raised by type registry lookups
#[derive(Debug, Error)]
pub enum TypeError {
    /// No type registered under the given name
    #[error("Unknown type: '{0}'")]
    UnknownType(String),
}

/// Static description of a component type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentType {
    /// Unique type name
    pub type_name: String,
    /// Ancestor type names, nearest first. The lineage implicitly terminates
    /// at [`COMPONENT_ROOT`] whether or not it is listed.
    pub ancestors: Vec<String>,
    /// At most one live instance per node
    pub node_singleton: bool,
    /// At most one live instance per system
    pub system_singleton: bool,
    /// Tags applied to every instance on creation
    pub tags: Vec<String>,
    /// Input property schemas (`ins`)
    pub ins: Vec<PropertySchema>,
    /// Output property schemas (`outs`)
    pub outs: Vec<PropertySchema>,
}

impl ComponentType {
    /// Create a new type descriptor
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            ancestors: Vec::new(),
            node_singleton: false,
            system_singleton: false,
            tags: Vec::new(),
            ins: Vec::new(),
            outs: Vec::new(),
        }
    }

    /// Append an ancestor type name (nearest base first)
    pub fn with_ancestor(mut self, name: impl Into<String>) -> Self {
        self.ancestors.push(name.into());
        self
    }

    /// Mark as node singleton
    pub fn node_singleton(mut self) -> Self {
        self.node_singleton = true;
        self
    }

    /// Mark as system singleton
    pub fn system_singleton(mut self) -> Self {
        self.system_singleton = true;
        self
    }

    /// Add a tag applied to every instance
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Declare an input property
    pub fn with_input(mut self, schema: PropertySchema) -> Self {
        self.ins.push(schema);
        self
    }

    /// Declare an output property
    pub fn with_output(mut self, schema: PropertySchema) -> Self {
        self.outs.push(schema);
        self
    }

    /// Full lineage for registry indexing: own name, ancestors, root
    pub fn lineage(&self) -> Vec<&str> {
        let mut lineage = Vec::with_capacity(self.ancestors.len() + 2);
        lineage.push(self.type_name.as_str());
        for ancestor in &self.ancestors {
            lineage.push(ancestor.as_str());
        }
        if lineage.last() != Some(&COMPONENT_ROOT) {
            lineage.push(COMPONENT_ROOT);
        }
        lineage
    }
}

/// Registry of component type descriptors, keyed by type name
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    types: IndexMap<String, ComponentType>,
}

impl TypeRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a type descriptor; re-registration replaces the previous one
    pub fn register(&mut self, component_type: ComponentType) {
        let name = component_type.type_name.clone();
        if self.types.insert(name.clone(), component_type).is_some() {
            tracing::warn!(type_name = %name, "replaced existing component type");
        }
    }

    /// Look up a type descriptor, failing for unregistered names
    pub fn get(&self, type_name: &str) -> Result<&ComponentType, TypeError> {
        self.types
            .get(type_name)
            .ok_or_else(|| TypeError::UnknownType(type_name.to_string()))
    }

    /// Look up a type descriptor, or `None`
    pub fn get_opt(&self, type_name: &str) -> Option<&ComponentType> {
        self.types.get(type_name)
    }

    /// Whether a type name is registered
    pub fn contains(&self, type_name: &str) -> bool {
        self.types.contains_key(type_name)
    }

    /// Iterate all registered descriptors
    pub fn types(&self) -> impl Iterator<Item = &ComponentType> {
        self.types.values()
    }

    /// Number of registered types
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}
