// SPDX-License-Identifier: MIT OR Apache-2.0
//! Component/property graph runtime for Curio.
//!
//! This crate provides the reactive object core that powers:
//! - Node/component scene descriptions
//! - Typed, linkable input/output properties
//! - Type and tag indexed object registries
//! - Change-driven update scheduling
//!
//! ## Architecture
//!
//! The runtime is built on:
//! - A [`System`] owning all graphs, nodes, components and properties
//! - Explicit [`ComponentType`] descriptors instead of runtime reflection
//! - An explicit property link table with push propagation
//! - String-channel publishers for registry and value events
//! - Versioned JSON/RON documents for persistence

pub mod component;
pub mod document;
pub mod graph;
pub mod node;
pub mod property;
pub mod publisher;
pub mod registry;
pub mod store;
pub mod system;
pub mod types;
pub mod update;

pub use component::{Component, ComponentId};
pub use document::{DocumentError, SystemDocument, FORMAT_VERSION};
pub use graph::{Graph, GraphId};
pub use node::{Node, NodeId};
pub use property::{
    GroupKind, Property, PropertyGroup, PropertyId, PropertySchema, PropertyType, PropertyValue,
};
pub use publisher::{Event, Publisher, PublisherError, SubscriptionId};
pub use registry::{ObjectRegistry, RegistryError, RegistryEvent};
pub use store::{PropertyError, PropertyEvent, PropertyStore};
pub use system::{System, SystemError};
pub use types::{ComponentType, TypeError, TypeRegistry, COMPONENT_ROOT, NODE_ROOT};
pub use update::{ComponentUpdater, CycleError, Pulse, UpdateError};
