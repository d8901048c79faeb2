//! Model container boundary
//!
//! A parsed model is a list of meshes, each carrying its vertex and index
//! data, optional submesh ranges, the bone-name table it skins against, its
//! named morph targets ("shapes"), and a material reference path.

use serde::{Deserialize, Serialize};

use crate::FormatResult;

/// Parses model containers into their mesh data
pub trait ModelParser: Send + Sync {
    fn parse(&self, bytes: &[u8]) -> FormatResult<ModelContainer>;
}

/// A single vertex as authored in the container
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
    /// Indices into the owning mesh's bone table
    pub blend_indices: [u8; 4],
    /// Skin weights matching `blend_indices`, summing to ~1 when skinned
    pub blend_weights: [f32; 4],
}

impl Default for Vertex {
    fn default() -> Self {
        Self {
            position: [0.0; 3],
            normal: [0.0, 0.0, 1.0],
            uv: [0.0; 2],
            blend_indices: [0; 4],
            blend_weights: [0.0; 4],
        }
    }
}

/// A contiguous index range within a mesh with its own morph subset
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SubMesh {
    pub index_offset: u32,
    pub index_count: u32,
}

/// One entry of a morph target: the vertex at `indices[base_index]` is
/// replaced by vertex `replacing_vertex` when the shape is applied
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ShapeValue {
    pub base_index: u32,
    pub replacing_vertex: u32,
}

/// A named morph target ("shape")
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShapeKey {
    pub name: String,
    pub values: Vec<ShapeValue>,
}

/// One mesh of a model container
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeshContainer {
    /// Position of this mesh within its container
    pub mesh_index: u16,
    /// Material reference path (resolved against synthesized materials)
    pub material: String,
    /// Bone names this mesh skins against; empty means rigid
    #[serde(default)]
    pub bone_table: Vec<String>,
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u16>,
    /// Submesh ranges; empty means the whole index range is one primitive
    #[serde(default)]
    pub submeshes: Vec<SubMesh>,
    /// Morph targets addressing this mesh's index buffer
    #[serde(default)]
    pub shapes: Vec<ShapeKey>,
}

impl MeshContainer {
    /// Get vertex count
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Get triangle count
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Whether this mesh declares a bone table (skinned vs rigid)
    pub fn has_skinning(&self) -> bool {
        !self.bone_table.is_empty()
    }

    /// Validate index ranges: indices address vertices, submeshes address
    /// the index buffer
    pub fn validate(&self) -> Result<(), String> {
        let vertex_count = self.vertices.len();
        if let Some(&bad) = self
            .indices
            .iter()
            .find(|&&i| (i as usize) >= vertex_count)
        {
            return Err(format!(
                "Index {bad} out of range for {vertex_count} vertices"
            ));
        }
        for (i, sub) in self.submeshes.iter().enumerate() {
            let end = sub.index_offset as usize + sub.index_count as usize;
            if end > self.indices.len() {
                return Err(format!(
                    "Submesh {i} range {}..{end} exceeds {} indices",
                    sub.index_offset,
                    self.indices.len()
                ));
            }
        }
        Ok(())
    }
}

/// A fully parsed model container
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelContainer {
    pub meshes: Vec<MeshContainer>,
}

impl ModelContainer {
    /// Total triangle count across meshes
    pub fn triangle_count(&self) -> usize {
        self.meshes.iter().map(|m| m.triangle_count()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad() -> MeshContainer {
        MeshContainer {
            mesh_index: 0,
            material: "/mt_c0101b0001_a.mtrl".to_string(),
            bone_table: vec!["j_spine".to_string()],
            vertices: vec![Vertex::default(); 4],
            indices: vec![0, 1, 2, 2, 1, 3],
            submeshes: vec![],
            shapes: vec![],
        }
    }

    #[test]
    fn test_counts() {
        let mesh = quad();
        assert_eq!(mesh.vertex_count(), 4);
        assert_eq!(mesh.triangle_count(), 2);
        assert!(mesh.has_skinning());
    }

    #[test]
    fn test_validate_catches_bad_index() {
        let mut mesh = quad();
        mesh.indices[3] = 9;
        assert!(mesh.validate().is_err());
    }

    #[test]
    fn test_validate_catches_bad_submesh() {
        let mut mesh = quad();
        mesh.submeshes.push(SubMesh {
            index_offset: 3,
            index_count: 6,
        });
        assert!(mesh.validate().is_err());
    }

    #[test]
    fn test_rigid_mesh() {
        let mut mesh = quad();
        mesh.bone_table.clear();
        assert!(!mesh.has_skinning());
    }
}
