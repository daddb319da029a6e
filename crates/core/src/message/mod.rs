//! VMC address vocabulary and payload interpretation.
//!
//! Performers stream Y-up coordinates in metres while consumers expect Z-up
//! centimetres, so every bone payload is remapped on ingestion.

use glam::{Quat, Vec3};

use crate::frame::{BoneSample, CurveSample};

const UNITS_PER_METRE: f32 = 100.0;

/// Address paths understood by the receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VmcAddress {
    /// `/VMC/Ext/Root/Pos`
    RootPos,
    /// `/VMC/Ext/Bone/Pos`
    BonePos,
    /// `/VMC/Ext/Blend/Val`
    BlendVal,
    /// `/VMC/Ext/Blend/Apply`
    BlendApply,
    /// `/VMC/Ext/OK`
    Ok,
    /// `/VMC/Ext/T`
    Time,
    /// Any other path. Ignored by the assembler.
    Other,
}

impl VmcAddress {
    /// Classifies an address path. Matching is exact and case-sensitive.
    pub fn parse(path: &str) -> Self {
        match path {
            "/VMC/Ext/Root/Pos" => Self::RootPos,
            "/VMC/Ext/Bone/Pos" => Self::BonePos,
            "/VMC/Ext/Blend/Val" => Self::BlendVal,
            "/VMC/Ext/Blend/Apply" => Self::BlendApply,
            "/VMC/Ext/OK" => Self::Ok,
            "/VMC/Ext/T" => Self::Time,
            _ => Self::Other,
        }
    }

    /// Wire path for a known address, `None` for [`VmcAddress::Other`].
    pub fn as_str(&self) -> Option<&'static str> {
        match self {
            Self::RootPos => Some("/VMC/Ext/Root/Pos"),
            Self::BonePos => Some("/VMC/Ext/Bone/Pos"),
            Self::BlendVal => Some("/VMC/Ext/Blend/Val"),
            Self::BlendApply => Some("/VMC/Ext/Blend/Apply"),
            Self::Ok => Some("/VMC/Ext/OK"),
            Self::Time => Some("/VMC/Ext/T"),
            Self::Other => None,
        }
    }

    /// Whether receipt of this address means the sender finished a frame.
    pub fn is_boundary(&self) -> bool {
        matches!(self, Self::BlendApply | Self::Ok | Self::Time)
    }
}

/// Sample decoded from a message's float arguments.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Payload {
    Bone(BoneSample),
    Curve(CurveSample),
    None,
}

impl Payload {
    /// Interprets the float arguments by count: one float is a curve weight,
    /// 7 to 9 floats a translation and rotation, 10 or more adds a scale.
    pub fn decode(floats: &[f64]) -> Self {
        match floats.len() {
            1 => Self::Curve(floats[0] as f32),
            7..=9 => Self::Bone(remap_bone(floats, false)),
            n if n >= 10 => Self::Bone(remap_bone(floats, true)),
            _ => Self::None,
        }
    }
}

/// Callers guarantee at least 7 floats, or 10 when `with_scale` is set.
fn remap_bone(v: &[f64], with_scale: bool) -> BoneSample {
    let f = |i: usize| v[i] as f32;

    let translation = Vec3::new(-f(0), f(2), f(1)) * UNITS_PER_METRE;
    let rotation = Quat::from_xyzw(-f(3), f(5), f(4), f(6));
    let sample = BoneSample::new(translation, rotation);

    if with_scale {
        sample.with_scale(Vec3::new(f(7), f(9), f(8)))
    } else {
        sample
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_known_paths_case_sensitively() {
        assert_eq!(VmcAddress::parse("/VMC/Ext/Bone/Pos"), VmcAddress::BonePos);
        assert_eq!(VmcAddress::parse("/VMC/Ext/OK"), VmcAddress::Ok);
        assert_eq!(VmcAddress::parse("/vmc/ext/ok"), VmcAddress::Other);
        assert_eq!(VmcAddress::parse("/VMC/Ext/Bone/Pos/"), VmcAddress::Other);
    }

    #[test]
    fn known_paths_round_trip_through_as_str() {
        for address in [
            VmcAddress::RootPos,
            VmcAddress::BonePos,
            VmcAddress::BlendVal,
            VmcAddress::BlendApply,
            VmcAddress::Ok,
            VmcAddress::Time,
        ] {
            let path = address.as_str().unwrap();
            assert_eq!(VmcAddress::parse(path), address);
        }
        assert_eq!(VmcAddress::Other.as_str(), None);
    }

    #[test]
    fn only_markers_are_boundaries() {
        assert!(VmcAddress::Ok.is_boundary());
        assert!(VmcAddress::Time.is_boundary());
        assert!(VmcAddress::BlendApply.is_boundary());
        assert!(!VmcAddress::BonePos.is_boundary());
        assert!(!VmcAddress::BlendVal.is_boundary());
        assert!(!VmcAddress::Other.is_boundary());
    }

    #[test]
    fn remaps_position_and_identity_rotation() {
        let Payload::Bone(bone) = Payload::decode(&[1.0, 2.0, 3.0, 0.0, 0.0, 0.0, 1.0]) else {
            panic!("seven floats should decode as a bone");
        };
        assert_eq!(bone.translation, Vec3::new(-100.0, 300.0, 200.0));
        assert_eq!(bone.rotation, Quat::IDENTITY);
        assert_eq!(bone.scale, Vec3::ONE);
    }

    #[test]
    fn remaps_rotation_components() {
        let Payload::Bone(bone) = Payload::decode(&[0.0, 0.0, 0.0, 0.1, 0.2, 0.3, 0.9]) else {
            panic!("expected bone");
        };
        assert_eq!(bone.rotation, Quat::from_xyzw(-0.1, 0.3, 0.2, 0.9));
    }

    #[test]
    fn ten_floats_carry_swizzled_scale() {
        let floats = [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 2.0, 3.0];
        let Payload::Bone(bone) = Payload::decode(&floats) else {
            panic!("expected bone");
        };
        assert_eq!(bone.scale, Vec3::new(1.0, 3.0, 2.0));
    }

    #[test]
    fn count_boundaries() {
        assert_eq!(Payload::decode(&[]), Payload::None);
        assert_eq!(Payload::decode(&[0.5]), Payload::Curve(0.5));
        assert_eq!(Payload::decode(&[0.0; 2]), Payload::None);
        assert_eq!(Payload::decode(&[0.0; 6]), Payload::None);
        assert!(matches!(Payload::decode(&[0.0; 7]), Payload::Bone(_)));
        assert!(matches!(Payload::decode(&[0.0; 9]), Payload::Bone(b) if b.scale == Vec3::ONE));
        assert!(matches!(Payload::decode(&[0.0; 10]), Payload::Bone(b) if b.scale == Vec3::ZERO));
    }
}
