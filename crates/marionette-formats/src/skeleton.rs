//! Skeleton container boundary
//!
//! A parsed skeleton is an XML-like bone-hierarchy document: a flat list of
//! named bones with parent indices and reference-pose transforms. The binary
//! reader producing it is opaque to the pipeline.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::FormatResult;

/// Parses skeleton containers into bone-hierarchy documents
pub trait SkeletonParser: Send + Sync {
    fn parse(&self, bytes: &[u8]) -> FormatResult<SkeletonDocument>;
}

/// A single bone in a skeleton document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkeletonBone {
    /// Bone name, unique within one document
    pub name: String,
    /// Parent bone index (None for root bones)
    pub parent: Option<usize>,
    /// Reference-pose translation relative to the parent
    pub translation: [f32; 3],
    /// Reference-pose rotation quaternion (x, y, z, w)
    pub rotation: [f32; 4],
    /// Reference-pose scale
    pub scale: [f32; 3],
}

impl SkeletonBone {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            translation: [0.0; 3],
            rotation: [0.0, 0.0, 0.0, 1.0],
            scale: [1.0; 3],
        }
    }
}

/// Parsed bone-hierarchy representation of one skeleton container
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SkeletonDocument {
    /// All bones, parents before children
    pub bones: Vec<SkeletonBone>,
}

impl SkeletonDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a bone, returning its index
    pub fn add_bone(&mut self, bone: SkeletonBone) -> usize {
        let idx = self.bones.len();
        self.bones.push(bone);
        idx
    }

    /// Get bone count
    pub fn bone_count(&self) -> usize {
        self.bones.len()
    }

    /// Find bone index by name
    pub fn find_bone(&self, name: &str) -> Option<usize> {
        self.bones.iter().position(|b| b.name == name)
    }

    /// Index of the first root bone, if any
    pub fn root(&self) -> Option<usize> {
        self.bones.iter().position(|b| b.parent.is_none())
    }

    /// All bone names, in document order
    pub fn bone_names(&self) -> Vec<&str> {
        self.bones.iter().map(|b| b.name.as_str()).collect()
    }

    /// Validate hierarchy structure: parent indices in range, no self
    /// references, no duplicate names
    pub fn validate(&self) -> Result<(), String> {
        let mut seen: HashMap<&str, usize> = HashMap::new();
        for (idx, bone) in self.bones.iter().enumerate() {
            if let Some(parent) = bone.parent {
                if parent >= self.bones.len() {
                    return Err(format!(
                        "Bone {} has invalid parent index {}",
                        bone.name, parent
                    ));
                }
                if parent == idx {
                    return Err(format!("Bone {} references itself as parent", bone.name));
                }
            }
            if let Some(first) = seen.insert(bone.name.as_str(), idx) {
                return Err(format!(
                    "Bone name {} appears at indices {} and {}",
                    bone.name, first, idx
                ));
            }
        }
        Ok(())
    }
}
