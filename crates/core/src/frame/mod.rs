use std::collections::HashMap;

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Rigid transform for a single bone, already remapped into consumer axes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoneSample {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for BoneSample {
    fn default() -> Self {
        Self {
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl BoneSample {
    /// Creates a sample with unit scale.
    pub fn new(translation: Vec3, rotation: Quat) -> Self {
        Self {
            translation,
            rotation,
            scale: Vec3::ONE,
        }
    }

    /// Replaces the scale, for senders that transmit it.
    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }
}

/// Blend-shape weight. Curves carry no data beyond their scalar value.
pub type CurveSample = f32;

/// Bone transforms and curve weights describing one broadcast instant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub server_address: String,
    pub port: u16,
    pub bones: HashMap<String, BoneSample>,
    pub curves: HashMap<String, CurveSample>,
}

impl Frame {
    /// Creates an empty frame tagged with the listener it was assembled from.
    pub fn for_server(server_address: impl Into<String>, port: u16) -> Self {
        Self {
            server_address: server_address.into(),
            port,
            ..Self::default()
        }
    }

    /// Removes all samples while keeping the server tag.
    pub fn clear_data(&mut self) {
        self.bones.clear();
        self.curves.clear();
    }

    /// True when the frame holds neither bones nor curves.
    pub fn is_empty(&self) -> bool {
        self.bones.is_empty() && self.curves.is_empty()
    }

    /// Looks up a bone by name. Names are case-sensitive.
    pub fn bone(&self, name: &str) -> Option<&BoneSample> {
        self.bones.get(name)
    }

    /// Looks up a curve weight by name.
    pub fn curve(&self, name: &str) -> Option<CurveSample> {
        self.curves.get(name).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clear_data_keeps_server_tag() {
        let mut frame = Frame::for_server("127.0.0.1", 39539);
        frame.bones.insert("Hips".into(), BoneSample::default());
        frame.curves.insert("Blink".into(), 1.0);

        frame.clear_data();

        assert!(frame.is_empty());
        assert_eq!(frame.server_address, "127.0.0.1");
        assert_eq!(frame.port, 39539);
    }

    #[test]
    fn default_bone_has_unit_scale() {
        let bone = BoneSample::new(Vec3::X, Quat::IDENTITY);
        assert_eq!(bone.scale, Vec3::ONE);
        assert_eq!(bone.with_scale(Vec3::splat(2.0)).scale, Vec3::splat(2.0));
    }

    #[test]
    fn frame_serializes_to_json() {
        let mut frame = Frame::default();
        frame.curves.insert("A".into(), 0.25);
        let json = serde_json::to_string(&frame).unwrap();
        let back: Frame = serde_json::from_str(&json).unwrap();
        assert_eq!(back.curve("A"), Some(0.25));
    }
}
