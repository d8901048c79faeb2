//! Common types used across marionette
//!
//! This module provides shared type definitions used by multiple crates:
//! the resource-kind tag carried by graph nodes and the packed body code
//! that selects a character's gender/race/body variant.

use serde::{Deserialize, Serialize};

/// Resource kind referenced by a graph node.
///
/// The producer tags each node with an integer code built from the ASCII
/// bytes of the resource's file extension; everything the pipeline does not
/// handle specially is carried through as [`ResourceKind::Other`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    /// Skeleton container (bone hierarchy)
    Skeleton,
    /// Model container (meshes, submeshes, shapes)
    Model,
    /// Material container (shader pack, color table, texture list)
    Material,
    /// Raw texture
    Texture,
    /// Anything else (animation, physics, ...)
    Other(u64),
}

// Extension bytes packed big-endian, the producer's tagging scheme.
const CODE_SKELETON: u64 = 0x736B_6C62; // "sklb"
const CODE_MODEL: u64 = 0x6D_646C; // "mdl"
const CODE_MATERIAL: u64 = 0x6D74_726C; // "mtrl"
const CODE_TEXTURE: u64 = 0x74_6578; // "tex"

impl ResourceKind {
    /// Decode the producer's integer type code
    pub fn from_code(code: u64) -> Self {
        match code {
            CODE_SKELETON => ResourceKind::Skeleton,
            CODE_MODEL => ResourceKind::Model,
            CODE_MATERIAL => ResourceKind::Material,
            CODE_TEXTURE => ResourceKind::Texture,
            other => ResourceKind::Other(other),
        }
    }

    /// The file extension this kind corresponds to, if known
    pub fn extension(&self) -> Option<&'static str> {
        match self {
            ResourceKind::Skeleton => Some("sklb"),
            ResourceKind::Model => Some("mdl"),
            ResourceKind::Material => Some("mtrl"),
            ResourceKind::Texture => Some("tex"),
            ResourceKind::Other(_) => None,
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceKind::Skeleton => write!(f, "skeleton"),
            ResourceKind::Model => write!(f, "model"),
            ResourceKind::Material => write!(f, "material"),
            ResourceKind::Texture => write!(f, "texture"),
            ResourceKind::Other(code) => write!(f, "other({code:#x})"),
        }
    }
}

/// Character gender decoded from a body code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Gender {
    Male,
    Female,
}

/// Packed gender/race/body-type code attached to a resource tree.
///
/// Codes follow the producer's `c####` scheme: the hundreds pair selects the
/// race family and gender (odd hundreds male, even female), the low two
/// digits the body variant. The raw value doubles as the deform id used for
/// racial path substitution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BodyCode(pub u16);

/// Decoded view of a [`BodyCode`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BodyDescriptor {
    pub gender: Gender,
    /// 1-based race family index (two consecutive hundreds share a family)
    pub race: u8,
    /// Body variant (low two digits of the code)
    pub body_type: u8,
}

impl BodyCode {
    pub fn new(code: u16) -> Self {
        Self(code)
    }

    /// Raw value, used as the deform id for racial path substitution
    pub fn deform_id(&self) -> u16 {
        self.0
    }

    /// Decode into gender + race family + body variant.
    ///
    /// Returns `None` for codes outside the `c0101`..`c9999` shape.
    pub fn descriptor(&self) -> Option<BodyDescriptor> {
        let hundreds = self.0 / 100;
        if hundreds == 0 {
            return None;
        }
        let gender = if hundreds % 2 == 1 {
            Gender::Male
        } else {
            Gender::Female
        };
        Some(BodyDescriptor {
            gender,
            race: ((hundreds + 1) / 2) as u8,
            body_type: (self.0 % 100) as u8,
        })
    }

    /// The `c####` path segment this code appears as in resource paths
    pub fn tag(&self) -> String {
        format!("c{:04}", self.0)
    }
}

impl std::fmt::Display for BodyCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.tag())
    }
}

impl From<u16> for BodyCode {
    fn from(value: u16) -> Self {
        Self(value)
    }
}
