// SPDX-License-Identifier: MIT OR Apache-2.0
//! Keyframed property tracks carried by transitions.

use curio_graph::{PropertyId, PropertyValue};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a keyframe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyframeId(pub Uuid);

impl KeyframeId {
    /// Create a new random keyframe ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for KeyframeId {
    fn default() -> Self {
        Self::new()
    }
}

/// Interpolation mode between a keyframe and its successor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Interpolation {
    /// Hold the previous value until the next keyframe
    Step,
    /// Linear interpolation
    #[default]
    Linear,
    /// Smoothstep ease-in/ease-out
    EaseInOut,
}

impl Interpolation {
    /// Remap a normalized parameter according to the mode
    pub fn remap(&self, t: f32) -> f32 {
        match self {
            Self::Step => 0.0,
            Self::Linear => t,
            Self::EaseInOut => t * t * (3.0 - 2.0 * t),
        }
    }
}

/// A keyframe in a track
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Keyframe {
    /// Unique keyframe ID
    pub id: KeyframeId,
    /// Time in seconds from the transition start
    pub time: f32,
    /// Value at this keyframe
    pub value: PropertyValue,
    /// Interpolation mode to the next keyframe
    pub interpolation: Interpolation,
}

impl Keyframe {
    /// Create a new keyframe
    pub fn new(time: f32, value: PropertyValue) -> Self {
        Self {
            id: KeyframeId::new(),
            time,
            value,
            interpolation: Interpolation::Linear,
        }
    }

    /// Set the interpolation mode
    pub fn with_interpolation(mut self, interpolation: Interpolation) -> Self {
        self.interpolation = interpolation;
        self
    }
}

/// Linear interpolation between two property values of the same shape.
///
/// Numeric and vector values blend component-wise; booleans, strings and
/// mismatched shapes snap to the earlier value.
pub fn blend(a: &PropertyValue, b: &PropertyValue, t: f32) -> PropertyValue {
    fn lerp(a: f32, b: f32, t: f32) -> f32 {
        a + (b - a) * t
    }
    match (a, b) {
        (PropertyValue::Float(a), PropertyValue::Float(b)) => {
            PropertyValue::Float(lerp(*a, *b, t))
        }
        (PropertyValue::Int(a), PropertyValue::Int(b)) => {
            PropertyValue::Int(lerp(*a as f32, *b as f32, t).round() as i32)
        }
        (PropertyValue::Vec2(a), PropertyValue::Vec2(b)) => {
            PropertyValue::Vec2([lerp(a[0], b[0], t), lerp(a[1], b[1], t)])
        }
        (PropertyValue::Vec3(a), PropertyValue::Vec3(b)) => PropertyValue::Vec3([
            lerp(a[0], b[0], t),
            lerp(a[1], b[1], t),
            lerp(a[2], b[2], t),
        ]),
        (PropertyValue::Vec4(a), PropertyValue::Vec4(b)) => PropertyValue::Vec4([
            lerp(a[0], b[0], t),
            lerp(a[1], b[1], t),
            lerp(a[2], b[2], t),
            lerp(a[3], b[3], t),
        ]),
        (PropertyValue::Color(a), PropertyValue::Color(b)) => PropertyValue::Color([
            lerp(a[0], b[0], t),
            lerp(a[1], b[1], t),
            lerp(a[2], b[2], t),
            lerp(a[3], b[3], t),
        ]),
        _ => a.clone(),
    }
}

/// A keyframed value curve targeting one property
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Track {
    /// The property this track drives
    pub property: PropertyId,
    /// Keyframes, kept sorted by time
    pub keyframes: Vec<Keyframe>,
}

impl Track {
    /// Create an empty track for a property
    pub fn new(property: PropertyId) -> Self {
        Self {
            property,
            keyframes: Vec::new(),
        }
    }

    /// Add a keyframe, keeping the list sorted by time
    pub fn add_keyframe(&mut self, keyframe: Keyframe) {
        self.keyframes.push(keyframe);
        self.sort_keyframes();
    }

    /// Remove a keyframe by id
    pub fn remove_keyframe(&mut self, id: KeyframeId) {
        self.keyframes.retain(|k| k.id != id);
    }

    fn sort_keyframes(&mut self) {
        self.keyframes
            .sort_by(|a, b| a.time.total_cmp(&b.time));
    }

    /// Time of the last keyframe
    pub fn duration(&self) -> f32 {
        self.keyframes.last().map_or(0.0, |k| k.time)
    }

    /// Find the keyframes surrounding a time
    fn find_keyframes(&self, time: f32) -> (Option<&Keyframe>, Option<&Keyframe>) {
        if self.keyframes.is_empty() {
            return (None, None);
        }
        let next = self.keyframes.iter().position(|k| k.time >= time);
        match next {
            None => (self.keyframes.last(), None),
            Some(0) => (None, self.keyframes.first()),
            Some(idx) => (Some(&self.keyframes[idx - 1]), Some(&self.keyframes[idx])),
        }
    }

    /// Evaluate the track at a time, clamping outside the keyframe range
    pub fn evaluate(&self, time: f32) -> Option<PropertyValue> {
        let (prev, next) = self.find_keyframes(time);
        match (prev, next) {
            (None, None) => None,
            (Some(k), None) | (None, Some(k)) => Some(k.value.clone()),
            (Some(a), Some(b)) => {
                // An exact hit on a keyframe yields that keyframe's value,
                // even when the segment leading into it holds.
                if time >= b.time || (b.time - a.time).abs() < 1e-4 {
                    return Some(b.value.clone());
                }
                let t = (time - a.time) / (b.time - a.time);
                let t = a.interpolation.remap(t);
                Some(blend(&a.value, &b.value, t))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn float_track(keys: &[(f32, f32)]) -> Track {
        let mut track = Track::new(PropertyId::new());
        for (time, value) in keys {
            track.add_keyframe(Keyframe::new(*time, PropertyValue::Float(*value)));
        }
        track
    }

    #[test]
    fn test_evaluate_interpolates_between_keyframes() {
        let track = float_track(&[(0.0, 0.0), (2.0, 10.0)]);
        assert_eq!(track.evaluate(1.0), Some(PropertyValue::Float(5.0)));
        assert_eq!(track.evaluate(0.5), Some(PropertyValue::Float(2.5)));
    }

    #[test]
    fn test_evaluate_clamps_outside_range() {
        let track = float_track(&[(1.0, 3.0), (2.0, 7.0)]);
        assert_eq!(track.evaluate(0.0), Some(PropertyValue::Float(3.0)));
        assert_eq!(track.evaluate(9.0), Some(PropertyValue::Float(7.0)));
        assert_eq!(float_track(&[]).evaluate(0.0), None);
    }

    #[test]
    fn test_keyframes_sorted_regardless_of_insert_order() {
        let track = float_track(&[(2.0, 7.0), (0.0, 1.0), (1.0, 4.0)]);
        let times: Vec<f32> = track.keyframes.iter().map(|k| k.time).collect();
        assert_eq!(times, vec![0.0, 1.0, 2.0]);
        assert_eq!(track.duration(), 2.0);
    }

    #[test]
    fn test_step_holds_previous_value() {
        let mut track = Track::new(PropertyId::new());
        track.add_keyframe(
            Keyframe::new(0.0, PropertyValue::Float(1.0)).with_interpolation(Interpolation::Step),
        );
        track.add_keyframe(Keyframe::new(1.0, PropertyValue::Float(9.0)));
        assert_eq!(track.evaluate(0.99), Some(PropertyValue::Float(1.0)));
        assert_eq!(track.evaluate(1.0), Some(PropertyValue::Float(9.0)));
    }

    #[test]
    fn test_ease_in_out_midpoint() {
        let mut track = Track::new(PropertyId::new());
        track.add_keyframe(
            Keyframe::new(0.0, PropertyValue::Float(0.0))
                .with_interpolation(Interpolation::EaseInOut),
        );
        track.add_keyframe(Keyframe::new(1.0, PropertyValue::Float(1.0)));
        // Smoothstep is symmetric around the midpoint.
        assert_eq!(track.evaluate(0.5), Some(PropertyValue::Float(0.5)));
        let early = track.evaluate(0.25).unwrap();
        assert!(early.as_float().unwrap() < 0.25);
    }

    #[test]
    fn test_blend_snaps_non_numeric() {
        let a = PropertyValue::Bool(true);
        let b = PropertyValue::Bool(false);
        assert_eq!(blend(&a, &b, 0.7), PropertyValue::Bool(true));

        let a = PropertyValue::Vec3([0.0, 0.0, 0.0]);
        let b = PropertyValue::Vec3([1.0, 2.0, 4.0]);
        assert_eq!(blend(&a, &b, 0.5), PropertyValue::Vec3([0.5, 1.0, 2.0]));
    }
}
