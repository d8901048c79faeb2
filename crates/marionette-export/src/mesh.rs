//! Mesh assembly
//!
//! Turns a resolved mesh container into scene primitives: remaps the mesh's
//! bone table onto the merged joint list, applies race deform steps to
//! vertex positions, compacts each submesh's index range into its own
//! primitive with its morph subset, and adds skinned or rigid primitives to
//! the scene. Per-primitive failures never abort sibling meshes.

use std::collections::HashMap;

use marionette_formats::{MeshContainer, RaceDeformEntry};
use tracing::{debug, error, warn};

use crate::deform::deform_position;
use crate::scene::{MorphTargetData, PrimitiveData, SceneBuilder};
use crate::skeleton::BoneMap;

/// Assemble one mesh container into the scene. Returns the number of
/// primitives actually added.
pub fn assemble_mesh(
    scene: &mut SceneBuilder,
    mesh: &MeshContainer,
    model_name: &str,
    bone_map: &BoneMap,
    material: Option<usize>,
    deform_steps: &[RaceDeformEntry],
) -> usize {
    let use_skinning = mesh.has_skinning();

    // Remap the mesh's bone-table indices onto the global joint order;
    // bones absent from the map lose their influences, nothing more.
    let joint_remap: Vec<Option<u16>> = mesh
        .bone_table
        .iter()
        .map(|name| {
            let mapped = bone_map.joint_index(name).map(|i| i as u16);
            if mapped.is_none() {
                warn!(bone = %name, "Could not find bone in bone map");
            }
            mapped
        })
        .collect();

    let positions = deformed_positions(mesh, deform_steps, use_skinning);

    let ranges: Vec<(usize, usize, String)> = if mesh.submeshes.is_empty() {
        vec![(
            0,
            mesh.indices.len(),
            format!("{model_name}_{}", mesh.mesh_index),
        )]
    } else {
        mesh.submeshes
            .iter()
            .enumerate()
            .map(|(i, sub)| {
                (
                    sub.index_offset as usize,
                    sub.index_count as usize,
                    format!("{model_name}_{}.{i}", mesh.mesh_index),
                )
            })
            .collect()
    };

    let mut added = 0;
    for (start, count, name) in ranges {
        if start + count > mesh.indices.len() {
            warn!(%name, "Submesh range exceeds index buffer, skipping");
            continue;
        }
        if count == 0 {
            continue;
        }
        if use_skinning && !scene.valid_armature(bone_map.joints()) {
            warn!(%name, "Joints are not a valid armature, skipping submesh");
            continue;
        }

        let prim = build_range(
            mesh,
            &positions,
            &joint_remap,
            use_skinning,
            start,
            count,
            name.clone(),
            material,
        );

        debug!(%name, vertices = prim.positions.len(), "Building mesh primitive");

        let result = if use_skinning {
            scene.add_skinned_mesh(prim, bone_map.joints())
        } else {
            scene.add_rigid_mesh(prim)
        };

        match result {
            Ok(_) => added += 1,
            Err(e) => error!(%name, error = %e, "Failed to build primitive"),
        }
    }

    added
}

/// Vertex positions with the deform-step sequence applied
fn deformed_positions(
    mesh: &MeshContainer,
    deform_steps: &[RaceDeformEntry],
    use_skinning: bool,
) -> Vec<[f32; 3]> {
    mesh.vertices
        .iter()
        .map(|v| {
            let mut p = v.position;
            if use_skinning && !deform_steps.is_empty() {
                let influences: Vec<(&str, f32)> = v
                    .blend_indices
                    .iter()
                    .zip(v.blend_weights.iter())
                    .filter(|&(_, &w)| w > 0.0)
                    .filter_map(|(&bi, &w)| {
                        mesh.bone_table.get(bi as usize).map(|n| (n.as_str(), w))
                    })
                    .collect();
                for step in deform_steps {
                    p = deform_position(step, &influences, p);
                }
            }
            p
        })
        .collect()
}

/// Compact an index range into primitive data with its morph subset
#[allow(clippy::too_many_arguments)]
fn build_range(
    mesh: &MeshContainer,
    positions: &[[f32; 3]],
    joint_remap: &[Option<u16>],
    use_skinning: bool,
    start: usize,
    count: usize,
    name: String,
    material: Option<usize>,
) -> PrimitiveData {
    let slice = &mesh.indices[start..start + count];

    // Old vertex id -> local id, in first-use order
    let mut map: HashMap<u16, u16> = HashMap::new();
    let mut order: Vec<u16> = Vec::new();
    for &idx in slice {
        map.entry(idx).or_insert_with(|| {
            order.push(idx);
            (order.len() - 1) as u16
        });
    }
    let local_indices: Vec<u16> = slice.iter().map(|i| map[i]).collect();

    let local_positions: Vec<[f32; 3]> = order.iter().map(|&i| positions[i as usize]).collect();
    let normals: Vec<[f32; 3]> = order
        .iter()
        .map(|&i| mesh.vertices[i as usize].normal)
        .collect();
    let uvs: Vec<[f32; 2]> = order.iter().map(|&i| mesh.vertices[i as usize].uv).collect();

    let (joints, weights) = if use_skinning {
        let mut joints = Vec::with_capacity(order.len());
        let mut weights = Vec::with_capacity(order.len());
        for &i in &order {
            let v = &mesh.vertices[i as usize];
            let mut j = [0u16; 4];
            let mut w = [0f32; 4];
            for k in 0..4 {
                if v.blend_weights[k] > 0.0 {
                    match joint_remap.get(v.blend_indices[k] as usize).copied().flatten() {
                        Some(joint) => {
                            j[k] = joint;
                            w[k] = v.blend_weights[k];
                        }
                        // Dropped influence: weight zeroed, index left at 0
                        None => {}
                    }
                }
            }
            joints.push(j);
            weights.push(w);
        }
        (Some(joints), Some(weights))
    } else {
        (None, None)
    };

    let mut morphs = Vec::new();
    for shape in &mesh.shapes {
        let mut displacements = vec![[0.0f32; 3]; order.len()];
        let mut touched = false;
        for value in &shape.values {
            let bi = value.base_index as usize;
            if bi < start || bi >= start + count {
                continue;
            }
            let vid = mesh.indices[bi];
            let (Some(&local), Some(replacement)) =
                (map.get(&vid), positions.get(value.replacing_vertex as usize))
            else {
                continue;
            };
            let base = positions[vid as usize];
            displacements[local as usize] = [
                replacement[0] - base[0],
                replacement[1] - base[1],
                replacement[2] - base[2],
            ];
            touched = true;
        }
        if touched {
            morphs.push(MorphTargetData {
                name: shape.name.clone(),
                positions: displacements,
            });
        }
    }

    PrimitiveData {
        name,
        positions: local_positions,
        normals,
        uvs,
        joints,
        weights,
        indices: local_indices,
        material,
        morphs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skeleton::build_bone_map;
    use marionette_formats::{
        ShapeKey, ShapeValue, SkeletonBone, SkeletonDocument, SubMesh, Vertex,
    };
    use std::sync::Arc;

    fn skinned_scene() -> (SceneBuilder, BoneMap) {
        let mut doc = SkeletonDocument::new();
        let root = doc.add_bone(SkeletonBone::new("n_root"));
        let mut spine = SkeletonBone::new("j_spine");
        spine.parent = Some(root);
        doc.add_bone(spine);

        let mut scene = SceneBuilder::new("test");
        let map = build_bone_map(&[Arc::new(doc)], &mut scene);
        (scene, map)
    }

    fn vertex(pos: [f32; 3], bone: u8) -> Vertex {
        Vertex {
            position: pos,
            normal: [0.0, 0.0, 1.0],
            uv: [0.0, 0.0],
            blend_indices: [bone, 0, 0, 0],
            blend_weights: [1.0, 0.0, 0.0, 0.0],
        }
    }

    fn skinned_triangle() -> MeshContainer {
        MeshContainer {
            mesh_index: 0,
            material: "/mt_a.mtrl".to_string(),
            bone_table: vec!["j_spine".to_string()],
            vertices: vec![
                vertex([0.0, 0.0, 0.0], 0),
                vertex([1.0, 0.0, 0.0], 0),
                vertex([0.0, 1.0, 0.0], 0),
            ],
            indices: vec![0, 1, 2],
            submeshes: vec![],
            shapes: vec![],
        }
    }

    #[test]
    fn test_skinned_mesh_assembly() {
        let (mut scene, map) = skinned_scene();
        let mesh = skinned_triangle();

        let added = assemble_mesh(&mut scene, &mesh, "body", &map, None, &[]);
        assert_eq!(added, 1);
        assert_eq!(scene.mesh_count(), 1);
    }

    #[test]
    fn test_rigid_mesh_assembly() {
        let (mut scene, map) = skinned_scene();
        let mut mesh = skinned_triangle();
        mesh.bone_table.clear();

        let added = assemble_mesh(&mut scene, &mesh, "prop", &map, None, &[]);
        assert_eq!(added, 1);
    }

    #[test]
    fn test_missing_bone_drops_influences() {
        let (mut scene, map) = skinned_scene();
        let mut mesh = skinned_triangle();
        mesh.bone_table = vec!["j_unknown".to_string()];

        // Still assembles; the influence is dropped, not fatal
        let added = assemble_mesh(&mut scene, &mesh, "body", &map, None, &[]);
        assert_eq!(added, 1);
    }

    #[test]
    fn test_submeshes_build_independently() {
        let (mut scene, map) = skinned_scene();
        let mut mesh = skinned_triangle();
        mesh.vertices.push(vertex([1.0, 1.0, 0.0], 0));
        mesh.indices = vec![0, 1, 2, 2, 1, 3];
        mesh.submeshes = vec![
            SubMesh {
                index_offset: 0,
                index_count: 3,
            },
            SubMesh {
                index_offset: 3,
                index_count: 3,
            },
        ];

        let added = assemble_mesh(&mut scene, &mesh, "body", &map, None, &[]);
        assert_eq!(added, 2);
        assert_eq!(scene.mesh_count(), 2);
    }

    #[test]
    fn test_out_of_range_submesh_skipped() {
        let (mut scene, map) = skinned_scene();
        let mut mesh = skinned_triangle();
        mesh.submeshes = vec![SubMesh {
            index_offset: 0,
            index_count: 99,
        }];

        assert_eq!(assemble_mesh(&mut scene, &mesh, "body", &map, None, &[]), 0);
    }

    #[test]
    fn test_shape_restricted_to_submesh_range() {
        let (mut scene, map) = skinned_scene();
        let mut mesh = skinned_triangle();
        mesh.vertices.push(vertex([1.0, 1.0, 0.0], 0));
        mesh.vertices.push(vertex([5.0, 5.0, 5.0], 0)); // replacement vertex
        mesh.indices = vec![0, 1, 2, 2, 1, 3];
        mesh.submeshes = vec![
            SubMesh {
                index_offset: 0,
                index_count: 3,
            },
            SubMesh {
                index_offset: 3,
                index_count: 3,
            },
        ];
        // Shape only touches index 0, inside the first submesh
        mesh.shapes = vec![ShapeKey {
            name: "shp_test".to_string(),
            values: vec![ShapeValue {
                base_index: 0,
                replacing_vertex: 4,
            }],
        }];

        let prim_a = build_range(
            &mesh,
            &deformed_positions(&mesh, &[], true),
            &[Some(1)],
            true,
            0,
            3,
            "a".to_string(),
            None,
        );
        assert_eq!(prim_a.morphs.len(), 1);
        assert_eq!(prim_a.morphs[0].positions[0], [5.0, 5.0, 5.0]);

        let prim_b = build_range(
            &mesh,
            &deformed_positions(&mesh, &[], true),
            &[Some(1)],
            true,
            3,
            3,
            "b".to_string(),
            None,
        );
        assert!(prim_b.morphs.is_empty());

        assert_eq!(assemble_mesh(&mut scene, &mesh, "body", &map, None, &[]), 2);
    }

    #[test]
    fn test_deform_steps_move_vertices() {
        use std::collections::HashMap as Map;

        let (mut scene, map) = skinned_scene();
        let mesh = skinned_triangle();

        let mut bone_matrices = Map::new();
        bone_matrices.insert(
            "j_spine".to_string(),
            crate::scene::math::trs_matrix([0.0, 2.0, 0.0], [0.0, 0.0, 0.0, 1.0], [1.0; 3]),
        );
        let step = RaceDeformEntry {
            code: 201,
            parent: Some(101),
            bone_matrices,
        };

        let positions = deformed_positions(&mesh, &[step.clone()], true);
        assert!((positions[0][1] - 2.0).abs() < 1e-5);

        let added = assemble_mesh(&mut scene, &mesh, "body", &map, None, &[step]);
        assert_eq!(added, 1);
    }
}
