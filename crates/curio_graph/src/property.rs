// SPDX-License-Identifier: MIT OR Apache-2.0
//! Typed reactive property cells and input/output groups.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::component::ComponentId;
use indexmap::IndexMap;

/// Unique identifier for a property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PropertyId(pub Uuid);

impl PropertyId {
    /// Create a new random property ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PropertyId {
    fn default() -> Self {
        Self::new()
    }
}

/// Data type of a property value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyType {
    /// Boolean value
    Bool,
    /// Integer value
    Int,
    /// Floating point value
    Float,
    /// 2D vector
    Vec2,
    /// 3D vector
    Vec3,
    /// 4D vector
    Vec4,
    /// Color (RGBA)
    Color,
    /// String value
    String,
}

impl PropertyType {
    /// Check if a value of this type can be linked into a property of
    /// another type. Same types always link; Int and Float convert both
    /// ways; Vec4 and Color are layout-identical.
    pub fn can_link_to(&self, other: &PropertyType) -> bool {
        if self == other {
            return true;
        }
        matches!(
            (self, other),
            (Self::Int, Self::Float)
                | (Self::Float, Self::Int)
                | (Self::Color, Self::Vec4)
                | (Self::Vec4, Self::Color)
        )
    }
}

/// Value stored in a property
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropertyValue {
    /// Boolean
    Bool(bool),
    /// Integer
    Int(i32),
    /// Float
    Float(f32),
    /// 2D vector
    Vec2([f32; 2]),
    /// 3D vector
    Vec3([f32; 3]),
    /// 4D vector
    Vec4([f32; 4]),
    /// Color (RGBA)
    Color([f32; 4]),
    /// String
    String(String),
}

impl PropertyValue {
    /// Get the property type for this value
    pub fn property_type(&self) -> PropertyType {
        match self {
            Self::Bool(_) => PropertyType::Bool,
            Self::Int(_) => PropertyType::Int,
            Self::Float(_) => PropertyType::Float,
            Self::Vec2(_) => PropertyType::Vec2,
            Self::Vec3(_) => PropertyType::Vec3,
            Self::Vec4(_) => PropertyType::Vec4,
            Self::Color(_) => PropertyType::Color,
            Self::String(_) => PropertyType::String,
        }
    }

    /// Convert this value into a target type, where a conversion exists
    pub fn converted_to(&self, target: PropertyType) -> Option<PropertyValue> {
        if self.property_type() == target {
            return Some(self.clone());
        }
        match (self, target) {
            (Self::Int(v), PropertyType::Float) => Some(Self::Float(*v as f32)),
            (Self::Float(v), PropertyType::Int) => Some(Self::Int(v.round() as i32)),
            (Self::Color(v), PropertyType::Vec4) => Some(Self::Vec4(*v)),
            (Self::Vec4(v), PropertyType::Color) => Some(Self::Color(*v)),
            _ => None,
        }
    }

    /// Get as bool if possible
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Get as integer if possible
    pub fn as_int(&self) -> Option<i32> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Get as float if possible
    pub fn as_float(&self) -> Option<f32> {
        match self {
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Get as Vec3 if possible
    pub fn as_vec3(&self) -> Option<[f32; 3]> {
        match self {
            Self::Vec3(v) => Some(*v),
            _ => None,
        }
    }

    /// Get as color if possible
    pub fn as_color(&self) -> Option<[f32; 4]> {
        match self {
            Self::Color(v) => Some(*v),
            _ => None,
        }
    }

    /// Get as string slice if possible
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }
}

/// Schema describing a property: its type, preset value and constraints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertySchema {
    /// Property name within its group
    pub name: String,
    /// Data type
    pub kind: PropertyType,
    /// Preset (default) value
    pub preset: PropertyValue,
    /// Minimum for numeric validation
    pub min: Option<f32>,
    /// Maximum for numeric validation
    pub max: Option<f32>,
    /// Option labels; the value is an index into this list
    pub options: Vec<String>,
    /// Event flag: the value is a pulse, not persistent state
    pub event: bool,
}

impl PropertySchema {
    /// Create a schema from a preset value
    pub fn new(name: impl Into<String>, preset: PropertyValue) -> Self {
        Self {
            name: name.into(),
            kind: preset.property_type(),
            preset,
            min: None,
            max: None,
            options: Vec::new(),
            event: false,
        }
    }

    /// Boolean property
    pub fn bool(name: impl Into<String>, preset: bool) -> Self {
        Self::new(name, PropertyValue::Bool(preset))
    }

    /// Integer property
    pub fn int(name: impl Into<String>, preset: i32) -> Self {
        Self::new(name, PropertyValue::Int(preset))
    }

    /// Float property
    pub fn float(name: impl Into<String>, preset: f32) -> Self {
        Self::new(name, PropertyValue::Float(preset))
    }

    /// 3D vector property
    pub fn vec3(name: impl Into<String>, preset: [f32; 3]) -> Self {
        Self::new(name, PropertyValue::Vec3(preset))
    }

    /// Color property
    pub fn color(name: impl Into<String>, preset: [f32; 4]) -> Self {
        Self::new(name, PropertyValue::Color(preset))
    }

    /// String property
    pub fn string(name: impl Into<String>, preset: impl Into<String>) -> Self {
        Self::new(name, PropertyValue::String(preset.into()))
    }

    /// Options property: an integer index into a label list
    pub fn options<S: Into<String>>(
        name: impl Into<String>,
        labels: impl IntoIterator<Item = S>,
        preset: i32,
    ) -> Self {
        Self {
            options: labels.into_iter().map(Into::into).collect(),
            ..Self::new(name, PropertyValue::Int(preset))
        }
    }

    /// Event property: a boolean pulse consumed within one update cycle
    pub fn event(name: impl Into<String>) -> Self {
        Self {
            event: true,
            ..Self::new(name, PropertyValue::Bool(false))
        }
    }

    /// Set the numeric validation range
    pub fn with_range(mut self, min: f32, max: f32) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    /// Set only a minimum bound
    pub fn with_min(mut self, min: f32) -> Self {
        self.min = Some(min);
        self
    }

    /// Set only a maximum bound
    pub fn with_max(mut self, max: f32) -> Self {
        self.max = Some(max);
        self
    }
}

/// A typed reactive value cell.
///
/// The `changed` flag is set by every write and by update propagation; it is
/// never cleared by reads. Clearing is the pulse driver's job once it has
/// consumed the flag for the current cycle.
#[derive(Debug, Clone)]
pub struct Property {
    /// Unique property ID
    pub id: PropertyId,
    /// Property name within its group
    pub name: String,
    /// Semantic path, e.g. `ins.exposure`
    pub path: String,
    /// Schema this property was created from
    pub schema: PropertySchema,
    /// Current value
    pub value: PropertyValue,
    /// Set on every write; cleared by the update driver
    pub changed: bool,
    /// Component owning this property
    pub owner: ComponentId,
}

impl Property {
    /// Create a property from a schema
    pub fn from_schema(schema: &PropertySchema, path_prefix: &str, owner: ComponentId) -> Self {
        Self {
            id: PropertyId::new(),
            name: schema.name.clone(),
            path: format!("{}.{}", path_prefix, schema.name),
            schema: schema.clone(),
            value: schema.preset.clone(),
            changed: false,
            owner,
        }
    }

    /// Deep copy of the current value
    pub fn clone_value(&self) -> PropertyValue {
        self.value.clone()
    }

    /// Current value clamped to the schema constraints.
    ///
    /// Numeric values clamp to min/max; options values clamp into the index
    /// range of the label list.
    pub fn validated_value(&self) -> PropertyValue {
        if !self.schema.options.is_empty() {
            if let PropertyValue::Int(index) = self.value {
                let last = self.schema.options.len() as i32 - 1;
                return PropertyValue::Int(index.clamp(0, last.max(0)));
            }
        }
        match self.value {
            PropertyValue::Float(v) => {
                let v = self.clamp_scalar(v);
                PropertyValue::Float(v)
            }
            PropertyValue::Int(v) => {
                let v = self.clamp_scalar(v as f32).round() as i32;
                PropertyValue::Int(v)
            }
            _ => self.value.clone(),
        }
    }

    fn clamp_scalar(&self, mut v: f32) -> f32 {
        if let Some(min) = self.schema.min {
            v = v.max(min);
        }
        if let Some(max) = self.schema.max {
            v = v.min(max);
        }
        v
    }

    /// Whether this property's type accepts values of the given type
    pub fn accepts(&self, kind: PropertyType) -> bool {
        kind.can_link_to(&self.schema.kind)
    }
}

/// Whether a group holds component inputs or outputs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupKind {
    /// Input group (`ins`)
    Input,
    /// Output group (`outs`)
    Output,
}

impl GroupKind {
    /// Path prefix used for properties in this group
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Input => "ins",
            Self::Output => "outs",
        }
    }
}

/// Named, ordered collection of properties belonging to one component
#[derive(Debug, Clone)]
pub struct PropertyGroup {
    kind: GroupKind,
    by_name: IndexMap<String, PropertyId>,
}

impl PropertyGroup {
    /// Create an empty group
    pub fn new(kind: GroupKind) -> Self {
        Self {
            kind,
            by_name: IndexMap::new(),
        }
    }

    /// Whether this is an input or output group
    pub fn kind(&self) -> GroupKind {
        self.kind
    }

    pub(crate) fn insert(&mut self, name: impl Into<String>, id: PropertyId) {
        self.by_name.insert(name.into(), id);
    }

    /// Look up a property by name
    pub fn get(&self, name: &str) -> Option<PropertyId> {
        self.by_name.get(name).copied()
    }

    /// Iterate (name, id) pairs in declaration order
    pub fn iter(&self) -> impl Iterator<Item = (&str, PropertyId)> {
        self.by_name.iter().map(|(name, id)| (name.as_str(), *id))
    }

    /// Property ids in declaration order
    pub fn ids(&self) -> impl Iterator<Item = PropertyId> + '_ {
        self.by_name.values().copied()
    }

    /// Number of properties in the group
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    /// Whether the group is empty
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}
