// SPDX-License-Identifier: MIT OR Apache-2.0
//! Multi-index object registry with add/remove events.
//!
//! An [`ObjectRegistry`] does not own objects; it indexes the ids of objects
//! living in the [`System`](crate::system::System) arenas. Each object is
//! indexed once per name in its type lineage up to the registry's root type,
//! plus per tag, and every mutation emits a [`RegistryEvent`] that external
//! tree/list views subscribe to instead of polling.

use crate::publisher::{Event, Publisher};
use indexmap::{IndexMap, IndexSet};
use std::fmt::Debug;
use std::hash::Hash;
use thiserror::Error;

/// Channel name reserved for the generic tag event stream.
pub const TAG_CHANNEL: &str = "tag";

/// Error raised by registry mutations and lookups
#[derive(Debug, Error)]
pub enum RegistryError {
    /// `add` was called with an id that is already registered
    #[error("Object id already registered")]
    DuplicateId,

    /// `remove` was called with an id that is not registered
    #[error("Object id not registered")]
    NotRegistered,

    /// `get` found no instance for a type name
    #[error("Object of type '{0}' not found")]
    NotFound(String),

    /// Tag name was empty or the reserved word `"tag"`
    #[error("Invalid tag name: '{0}'")]
    InvalidTag(String),
}

/// Event emitted by a registry on every index mutation
#[derive(Debug, Clone)]
pub enum RegistryEvent<I> {
    /// An object was added to or removed from a type list
    Object {
        /// Lineage type name this event dispatches for
        type_name: String,
        /// True on add, false on remove
        added: bool,
        /// Id of the affected object
        id: I,
    },
    /// An object was tagged or untagged
    Tag {
        /// The tag name
        tag: String,
        /// True on add, false on remove
        added: bool,
        /// Id of the affected object
        id: I,
    },
}

impl<I> Event for RegistryEvent<I> {
    fn channel(&self) -> &str {
        match self {
            Self::Object { type_name, .. } => type_name,
            Self::Tag { .. } => TAG_CHANNEL,
        }
    }
}

/// Index of live object ids by type lineage, tag and id.
///
/// The registry is handed an explicit lineage slice on every `add`/`remove`
/// (produced by [`ComponentType::lineage`](crate::types::ComponentType::lineage));
/// it never inspects objects. Lineage walking stops once the registry's root
/// type name has been indexed.
pub struct ObjectRegistry<I> {
    root_type: String,
    by_type: IndexMap<String, Vec<I>>,
    by_tag: IndexMap<String, Vec<I>>,
    ids: IndexSet<I>,
    events: Publisher<RegistryEvent<I>>,
}

impl<I: Copy + Eq + Hash + Debug> ObjectRegistry<I> {
    /// Create a new registry rooted at the given type name
    pub fn new(root_type: impl Into<String>) -> Self {
        // Type channels are declared lazily as types appear, so the
        // publisher runs lenient; the tag channel exists from the start.
        let events = Publisher::lenient();
        events.add_event(TAG_CHANNEL);
        Self {
            root_type: root_type.into(),
            by_type: IndexMap::new(),
            by_tag: IndexMap::new(),
            ids: IndexSet::new(),
            events,
        }
    }

    /// The root type name this registry terminates lineage walks at
    pub fn root_type(&self) -> &str {
        &self.root_type
    }

    /// Event stream for add/remove and tag notifications
    pub fn events(&self) -> &Publisher<RegistryEvent<I>> {
        &self.events
    }

    /// Register an object under every lineage name up to the root type.
    ///
    /// Fails with [`RegistryError::DuplicateId`] if the id is already
    /// registered; in that case no index is touched.
    pub fn add(&mut self, id: I, lineage: &[&str]) -> Result<(), RegistryError> {
        if !self.ids.insert(id) {
            return Err(RegistryError::DuplicateId);
        }

        for type_name in Self::bounded(lineage, &self.root_type) {
            self.by_type
                .entry(type_name.to_string())
                .or_default()
                .push(id);
            self.events.add_event(type_name);
            let _ = self.events.emit(&RegistryEvent::Object {
                type_name: type_name.to_string(),
                added: true,
                id,
            });
        }
        Ok(())
    }

    /// Remove an object from every lineage name up to the root type.
    ///
    /// Fails with [`RegistryError::NotRegistered`] if the id is unknown.
    pub fn remove(&mut self, id: I, lineage: &[&str]) -> Result<(), RegistryError> {
        if !self.ids.shift_remove(&id) {
            return Err(RegistryError::NotRegistered);
        }

        for type_name in Self::bounded(lineage, &self.root_type) {
            if let Some(list) = self.by_type.get_mut(type_name) {
                list.retain(|entry| *entry != id);
            }
            let _ = self.events.emit(&RegistryEvent::Object {
                type_name: type_name.to_string(),
                added: false,
                id,
            });
        }
        Ok(())
    }

    /// Iterate a lineage slice, stopping after the registry root
    fn bounded<'a>(lineage: &'a [&'a str], root: &'a str) -> impl Iterator<Item = &'a str> {
        let mut done = false;
        lineage.iter().copied().take_while(move |name| {
            if done {
                return false;
            }
            done = *name == root;
            true
        })
    }

    /// Tag an object. The tag must be non-empty and not the reserved word
    /// `"tag"` (tag events multiplex through that channel). Tagging an
    /// already-tagged object is a no-op.
    pub fn add_by_tag(&mut self, tag: &str, id: I) -> Result<(), RegistryError> {
        if tag.is_empty() || tag == TAG_CHANNEL {
            return Err(RegistryError::InvalidTag(tag.to_string()));
        }

        let list = self.by_tag.entry(tag.to_string()).or_default();
        if list.contains(&id) {
            return Ok(());
        }
        list.push(id);

        self.events.add_event(tag);
        let event = RegistryEvent::Tag {
            tag: tag.to_string(),
            added: true,
            id,
        };
        let _ = self.events.emit(&event);
        let _ = self.events.emit_on(tag, &event);
        Ok(())
    }

    /// Untag an object; returns whether it was found under the tag
    pub fn remove_by_tag(&mut self, tag: &str, id: I) -> bool {
        let Some(list) = self.by_tag.get_mut(tag) else {
            return false;
        };
        let before = list.len();
        list.retain(|entry| *entry != id);
        if list.len() == before {
            return false;
        }

        let event = RegistryEvent::Tag {
            tag: tag.to_string(),
            added: false,
            id,
        };
        let _ = self.events.emit(&event);
        let _ = self.events.emit_on(tag, &event);
        true
    }

    /// First registered instance of a type, failing if there is none
    pub fn get(&self, type_name: &str) -> Result<I, RegistryError> {
        self.get_opt(type_name)
            .ok_or_else(|| RegistryError::NotFound(type_name.to_string()))
    }

    /// First registered instance of a type, or `None`
    pub fn get_opt(&self, type_name: &str) -> Option<I> {
        self.by_type.get(type_name)?.first().copied()
    }

    /// All instances registered under a type name, in registration order
    pub fn get_array(&self, type_name: &str) -> &[I] {
        self.by_type.get(type_name).map_or(&[], Vec::as_slice)
    }

    /// Defensive copy of the instance list for a type name
    pub fn clone_array(&self, type_name: &str) -> Vec<I> {
        self.get_array(type_name).to_vec()
    }

    /// Whether at least one instance of a type is registered
    pub fn has(&self, type_name: &str) -> bool {
        !self.get_array(type_name).is_empty()
    }

    /// Whether this exact id is registered
    pub fn contains(&self, id: I) -> bool {
        self.ids.contains(&id)
    }

    /// Number of instances registered under a type name
    pub fn count(&self, type_name: &str) -> usize {
        self.get_array(type_name).len()
    }

    /// All instances carrying a tag
    pub fn by_tag(&self, tag: &str) -> &[I] {
        self.by_tag.get(tag).map_or(&[], Vec::as_slice)
    }

    /// Iterate every registered id
    pub fn ids(&self) -> impl Iterator<Item = I> + '_ {
        self.ids.iter().copied()
    }

    /// Total number of registered objects
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether the registry holds no objects
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
