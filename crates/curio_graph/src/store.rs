// SPDX-License-Identifier: MIT OR Apache-2.0
//! Property storage, linking and change propagation.
//!
//! All properties live in one [`PropertyStore`] owned by the
//! [`System`](crate::system::System). Linking is kept as an explicit edge
//! table (source id to dependent ids plus the reverse map) rather than value
//! aliasing, and propagation is a plain graph traversal over that table.

use crate::property::{Property, PropertyId, PropertyType, PropertyValue};
use crate::publisher::{Event, Publisher};
use indexmap::IndexMap;
use thiserror::Error;

/// Channel name for property value events.
pub const VALUE_CHANNEL: &str = "value";

/// Error raised by property store operations
#[derive(Debug, Error)]
pub enum PropertyError {
    /// No property with the given id
    #[error("Property not found")]
    NotFound,

    /// Value type does not match the property schema and no conversion exists
    #[error("Type mismatch: property is {expected:?}, value is {found:?}")]
    TypeMismatch {
        /// Type declared by the property schema
        expected: PropertyType,
        /// Type of the rejected value
        found: PropertyType,
    },

    /// A property cannot be linked from itself
    #[error("Property cannot link from itself")]
    SelfLink,

    /// Source and dependent types are not link-compatible
    #[error("Incompatible link: {from:?} does not convert to {dependent:?}")]
    IncompatibleLink {
        /// Type of the source property
        from: PropertyType,
        /// Type of the dependent property
        dependent: PropertyType,
    },
}

/// Event emitted whenever a property value is written
#[derive(Debug, Clone)]
pub struct PropertyEvent {
    /// The written property
    pub property: PropertyId,
    /// The new value
    pub value: PropertyValue,
}

impl Event for PropertyEvent {
    fn channel(&self) -> &str {
        VALUE_CHANNEL
    }
}

/// Arena of all properties plus the link edge table.
pub struct PropertyStore {
    properties: IndexMap<PropertyId, Property>,
    /// source -> dependents fed from it
    links: IndexMap<PropertyId, Vec<PropertyId>>,
    /// dependent -> its single incoming source
    sources: IndexMap<PropertyId, PropertyId>,
    events: Publisher<PropertyEvent>,
}

impl PropertyStore {
    /// Create an empty store
    pub fn new() -> Self {
        let events = Publisher::new();
        events.add_event(VALUE_CHANNEL);
        Self {
            properties: IndexMap::new(),
            links: IndexMap::new(),
            sources: IndexMap::new(),
            events,
        }
    }

    /// Event stream carrying `"value"` events for every write
    pub fn events(&self) -> &Publisher<PropertyEvent> {
        &self.events
    }

    pub(crate) fn insert(&mut self, property: Property) -> PropertyId {
        let id = property.id;
        self.properties.insert(id, property);
        id
    }

    /// Remove a property and all link edges touching it
    pub(crate) fn remove(&mut self, id: PropertyId) -> Option<Property> {
        self.unlink(id);
        if let Some(dependents) = self.links.shift_remove(&id) {
            for dependent in dependents {
                self.sources.shift_remove(&dependent);
            }
        }
        self.properties.shift_remove(&id)
    }

    /// Get a property by id
    pub fn get(&self, id: PropertyId) -> Option<&Property> {
        self.properties.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: PropertyId) -> Option<&mut Property> {
        self.properties.get_mut(&id)
    }

    /// Current value of a property
    pub fn value(&self, id: PropertyId) -> Option<&PropertyValue> {
        self.get(id).map(|p| &p.value)
    }

    /// Deep copy of a property's current value
    pub fn clone_value(&self, id: PropertyId) -> Option<PropertyValue> {
        self.get(id).map(Property::clone_value)
    }

    /// Value clamped to the property's schema constraints
    pub fn validated_value(&self, id: PropertyId) -> Option<PropertyValue> {
        self.get(id).map(Property::validated_value)
    }

    /// Whether a property's changed flag is set
    pub fn is_changed(&self, id: PropertyId) -> bool {
        self.get(id).is_some_and(|p| p.changed)
    }

    /// Number of properties in the store
    pub fn len(&self) -> usize {
        self.properties.len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Write a value, marking the property changed and emitting exactly one
    /// `"value"` event, even when the new value equals the old one.
    pub fn set_value(&mut self, id: PropertyId, value: PropertyValue) -> Result<(), PropertyError> {
        let property = self.properties.get_mut(&id).ok_or(PropertyError::NotFound)?;
        let expected = property.schema.kind;
        let value = value
            .converted_to(expected)
            .ok_or(PropertyError::TypeMismatch {
                expected,
                found: value.property_type(),
            })?;
        property.value = value.clone();
        property.changed = true;

        let _ = self.events.emit(&PropertyEvent {
            property: id,
            value,
        });
        Ok(())
    }

    /// Establish a push link so that `dependent` mirrors `source` on every
    /// propagation pass. A dependent has at most one incoming link;
    /// re-linking replaces the previous edge.
    pub fn link(&mut self, source: PropertyId, dependent: PropertyId) -> Result<(), PropertyError> {
        if source == dependent {
            return Err(PropertyError::SelfLink);
        }
        let source_kind = self
            .get(source)
            .ok_or(PropertyError::NotFound)?
            .schema
            .kind;
        let dependent_kind = self
            .get(dependent)
            .ok_or(PropertyError::NotFound)?
            .schema
            .kind;
        if !source_kind.can_link_to(&dependent_kind) {
            return Err(PropertyError::IncompatibleLink {
                from: source_kind,
                dependent: dependent_kind,
            });
        }

        self.unlink(dependent);
        self.links.entry(source).or_default().push(dependent);
        self.sources.insert(dependent, source);
        tracing::debug!(?source, ?dependent, "linked properties");
        Ok(())
    }

    /// Remove the incoming link of a dependent; returns whether one existed
    pub fn unlink(&mut self, dependent: PropertyId) -> bool {
        let Some(source) = self.sources.shift_remove(&dependent) else {
            return false;
        };
        if let Some(dependents) = self.links.get_mut(&source) {
            dependents.retain(|d| *d != dependent);
            if dependents.is_empty() {
                self.links.shift_remove(&source);
            }
        }
        true
    }

    /// Whether a dependent has an incoming link
    pub fn is_linked(&self, dependent: PropertyId) -> bool {
        self.sources.contains_key(&dependent)
    }

    /// The source feeding a dependent, if linked
    pub fn source_of(&self, dependent: PropertyId) -> Option<PropertyId> {
        self.sources.get(&dependent).copied()
    }

    /// The dependents fed from a source
    pub fn dependents_of(&self, source: PropertyId) -> &[PropertyId] {
        self.links.get(&source).map_or(&[], Vec::as_slice)
    }

    /// Iterate the link edge table as (source, dependent) pairs
    pub fn link_edges(&self) -> impl Iterator<Item = (PropertyId, PropertyId)> + '_ {
        self.links
            .iter()
            .flat_map(|(source, deps)| deps.iter().map(move |dep| (*source, *dep)))
    }

    /// Ids of all properties whose changed flag is currently set
    pub fn changed_ids(&self) -> Vec<PropertyId> {
        self.properties
            .iter()
            .filter(|(_, p)| p.changed)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Push changed values through the link table, transitively.
    ///
    /// The changed set is snapshotted up front, so writes performed by event
    /// subscribers during the pass feed the next pass, not this one. A
    /// rewritten dependent re-enters the queue so its own dependents see the
    /// pushed value, even when the dependent was itself in the initial
    /// changed set. A dependent already holding the pushed value is skipped,
    /// which is what terminates link cycles; a per-id re-queue budget bounds
    /// the pass regardless. Returns the number of dependent writes performed.
    pub fn propagate(&mut self) -> usize {
        let mut queue: Vec<PropertyId> = self.changed_ids();
        let budget = self.properties.len().max(1);
        let mut requeues: IndexMap<PropertyId, usize> = IndexMap::new();
        let mut writes = 0;

        while let Some(source) = queue.pop() {
            let dependents = self.dependents_of(source).to_vec();
            if dependents.is_empty() {
                continue;
            }
            let value = match self.value(source) {
                Some(value) => value.clone(),
                None => continue,
            };
            for dependent in dependents {
                let Some(target) = self.properties.get_mut(&dependent) else {
                    continue;
                };
                let Some(converted) = value.converted_to(target.schema.kind) else {
                    continue;
                };
                if target.changed && target.value == converted {
                    continue;
                }
                target.value = converted.clone();
                target.changed = true;
                writes += 1;
                let _ = self.events.emit(&PropertyEvent {
                    property: dependent,
                    value: converted,
                });
                let count = requeues.entry(dependent).or_insert(0);
                if *count < budget {
                    *count += 1;
                    queue.push(dependent);
                }
            }
        }
        writes
    }

    /// Clear every changed flag; called by the pulse driver once the flags
    /// have been consumed for the current cycle
    pub fn clear_changed(&mut self) {
        for property in self.properties.values_mut() {
            property.changed = false;
        }
    }
}

impl Default for PropertyStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::ComponentId;
    use crate::property::PropertySchema;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn float_property(store: &mut PropertyStore, name: &str, preset: f32) -> PropertyId {
        let schema = PropertySchema::float(name, preset);
        store.insert(Property::from_schema(&schema, "ins", ComponentId::new()))
    }

    #[test]
    fn test_set_value_marks_changed_and_emits() {
        let mut store = PropertyStore::new();
        let id = float_property(&mut store, "exposure", 1.0);

        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();
        store
            .events()
            .on(VALUE_CHANNEL, move |event: &PropertyEvent| {
                sink.borrow_mut().push(event.value.clone());
            })
            .unwrap();

        store.set_value(id, PropertyValue::Float(2.0)).unwrap();
        assert!(store.is_changed(id));
        assert_eq!(store.value(id), Some(&PropertyValue::Float(2.0)));

        // Writing an equal value still flags and emits.
        store.set_value(id, PropertyValue::Float(2.0)).unwrap();
        assert_eq!(log.borrow().len(), 2);
    }

    #[test]
    fn test_set_value_type_checks() {
        let mut store = PropertyStore::new();
        let id = float_property(&mut store, "exposure", 1.0);

        // Int converts into a float slot.
        store.set_value(id, PropertyValue::Int(3)).unwrap();
        assert_eq!(store.value(id), Some(&PropertyValue::Float(3.0)));

        assert!(matches!(
            store.set_value(id, PropertyValue::String("x".into())),
            Err(PropertyError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_link_propagates_value_and_changed_flag() {
        let mut store = PropertyStore::new();
        let source = float_property(&mut store, "out", 0.0);
        let dependent = float_property(&mut store, "in", 0.0);
        store.link(source, dependent).unwrap();

        store.set_value(source, PropertyValue::Float(5.0)).unwrap();
        store.clear_changed_except(source);
        let writes = store.propagate();

        assert_eq!(writes, 1);
        assert_eq!(store.value(dependent), Some(&PropertyValue::Float(5.0)));
        assert!(store.is_changed(dependent));
    }

    #[test]
    fn test_unlink_restores_independence() {
        let mut store = PropertyStore::new();
        let source = float_property(&mut store, "out", 0.0);
        let dependent = float_property(&mut store, "in", 0.0);
        store.link(source, dependent).unwrap();
        assert!(store.unlink(dependent));
        assert!(!store.unlink(dependent));

        store.set_value(source, PropertyValue::Float(5.0)).unwrap();
        store.propagate();
        assert_eq!(store.value(dependent), Some(&PropertyValue::Float(0.0)));
    }

    #[test]
    fn test_relink_replaces_previous_source() {
        let mut store = PropertyStore::new();
        let first = float_property(&mut store, "a", 1.0);
        let second = float_property(&mut store, "b", 2.0);
        let dependent = float_property(&mut store, "in", 0.0);

        store.link(first, dependent).unwrap();
        store.link(second, dependent).unwrap();
        assert_eq!(store.source_of(dependent), Some(second));
        assert!(store.dependents_of(first).is_empty());
    }

    #[test]
    fn test_link_validation() {
        let mut store = PropertyStore::new();
        let float = float_property(&mut store, "f", 0.0);
        let schema = PropertySchema::string("s", "");
        let string = store.insert(Property::from_schema(&schema, "ins", ComponentId::new()));

        assert!(matches!(
            store.link(float, float),
            Err(PropertyError::SelfLink)
        ));
        assert!(matches!(
            store.link(float, string),
            Err(PropertyError::IncompatibleLink {
                from: PropertyType::Float,
                dependent: PropertyType::String,
            })
        ));
    }

    #[test]
    fn test_propagate_is_transitive_and_cycle_safe() {
        let mut store = PropertyStore::new();
        let a = float_property(&mut store, "a", 0.0);
        let b = float_property(&mut store, "b", 0.0);
        let c = float_property(&mut store, "c", 0.0);
        store.link(a, b).unwrap();
        store.link(b, c).unwrap();
        // Close the loop; propagation must still terminate.
        store.link(c, a).unwrap();

        store.set_value(a, PropertyValue::Float(7.0)).unwrap();
        store.clear_changed_except(a);
        store.propagate();

        assert_eq!(store.value(b), Some(&PropertyValue::Float(7.0)));
        assert_eq!(store.value(c), Some(&PropertyValue::Float(7.0)));
    }

    #[test]
    fn test_propagate_rewrites_mid_chain_dependents() {
        let mut store = PropertyStore::new();
        let a = float_property(&mut store, "a", 0.0);
        let b = float_property(&mut store, "b", 0.0);
        let c = float_property(&mut store, "c", 0.0);
        store.link(a, b).unwrap();
        store.link(b, c).unwrap();

        // Both the chain head and the mid-chain dependent are written
        // before the pass; the head's value must still reach the tail.
        store.set_value(b, PropertyValue::Float(1.0)).unwrap();
        store.set_value(a, PropertyValue::Float(7.0)).unwrap();
        store.propagate();

        assert_eq!(store.value(b), Some(&PropertyValue::Float(7.0)));
        assert_eq!(store.value(c), Some(&PropertyValue::Float(7.0)));
    }

    #[test]
    fn test_remove_drops_both_edge_directions() {
        let mut store = PropertyStore::new();
        let source = float_property(&mut store, "out", 0.0);
        let dependent = float_property(&mut store, "in", 0.0);
        store.link(source, dependent).unwrap();

        store.remove(source);
        assert!(!store.is_linked(dependent));
        assert!(store.get(source).is_none());
    }

    impl PropertyStore {
        /// Test helper: clear every changed flag except one source.
        fn clear_changed_except(&mut self, keep: PropertyId) {
            for (id, property) in &mut self.properties {
                if *id != keep {
                    property.changed = false;
                }
            }
        }
    }
}
