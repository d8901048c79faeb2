//! Scene builder implementation

use super::math::{self, Mat4};
use super::*;
use std::path::{Path, PathBuf};

/// Alpha rendering mode bound to an output material
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AlphaMode {
    Opaque,
    /// Mask cutout
    #[default]
    Mask,
    Blend,
}

impl AlphaMode {
    fn as_gltf(self) -> Option<String> {
        match self {
            AlphaMode::Opaque => None,
            AlphaMode::Mask => Some("MASK".to_string()),
            AlphaMode::Blend => Some("BLEND".to_string()),
        }
    }
}

/// Texture channel slot of an output material
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterialChannel {
    BaseColor,
    Normal,
    SpecularColor,
    Occlusion,
    Emissive,
}

/// Material description accumulated by the texture synthesizer
#[derive(Debug, Clone)]
pub struct MaterialDefinition {
    pub name: String,
    pub alpha_mode: AlphaMode,
    pub double_sided: bool,
    pub metallic_factor: f32,
    pub roughness_factor: f32,
    channels: Vec<(MaterialChannel, String)>,
}

impl MaterialDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alpha_mode: AlphaMode::default(),
            double_sided: false,
            metallic_factor: 0.0,
            roughness_factor: 1.0,
            channels: Vec::new(),
        }
    }

    /// Bind an image URI to a channel slot
    pub fn set_channel(&mut self, channel: MaterialChannel, uri: impl Into<String>) {
        self.channels.retain(|(c, _)| *c != channel);
        self.channels.push((channel, uri.into()));
    }

    /// URI bound to `channel`, if any
    pub fn channel(&self, channel: MaterialChannel) -> Option<&str> {
        self.channels
            .iter()
            .find(|(c, _)| *c == channel)
            .map(|(_, uri)| uri.as_str())
    }
}

/// One morph target of a primitive: named per-vertex position displacements
#[derive(Debug, Clone)]
pub struct MorphTargetData {
    pub name: String,
    pub positions: Vec<[f32; 3]>,
}

/// Vertex data of one mesh primitive, already compacted to its index range
#[derive(Debug, Clone)]
pub struct PrimitiveData {
    pub name: String,
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub uvs: Vec<[f32; 2]>,
    /// Per-vertex joint indices into the skin's joint list
    pub joints: Option<Vec<[u16; 4]>>,
    /// Per-vertex weights matching `joints`
    pub weights: Option<Vec<[f32; 4]>>,
    pub indices: Vec<u16>,
    pub material: Option<usize>,
    pub morphs: Vec<MorphTargetData>,
}

impl PrimitiveData {
    fn validate(&self) -> SceneResult<()> {
        let n = self.positions.len();
        if n == 0 {
            return Err(SceneError::InvalidMeshData("empty vertex set".to_string()));
        }
        if self.normals.len() != n || self.uvs.len() != n {
            return Err(SceneError::InvalidMeshData(format!(
                "attribute lengths disagree: {} positions, {} normals, {} uvs",
                n,
                self.normals.len(),
                self.uvs.len()
            )));
        }
        if self.joints.as_ref().map(Vec::len).unwrap_or(n) != n
            || self.weights.as_ref().map(Vec::len).unwrap_or(n) != n
        {
            return Err(SceneError::InvalidMeshData(
                "skin attribute lengths disagree".to_string(),
            ));
        }
        if let Some(&bad) = self.indices.iter().find(|&&i| (i as usize) >= n) {
            return Err(SceneError::InvalidMeshData(format!(
                "index {bad} out of range for {n} vertices"
            )));
        }
        for morph in &self.morphs {
            if morph.positions.len() != n {
                return Err(SceneError::InvalidMeshData(format!(
                    "morph target {} has {} positions, expected {n}",
                    morph.name,
                    morph.positions.len()
                )));
            }
        }
        Ok(())
    }
}

/// Internal node slot; children are derived at serialization time
#[derive(Debug, Clone)]
struct NodeSlot {
    name: String,
    parent: Option<usize>,
    translation: [f32; 3],
    rotation: [f32; 4],
    scale: [f32; 3],
    mesh: Option<usize>,
    skin: Option<usize>,
}

/// Accumulates transform nodes, materials and mesh primitives, then
/// serializes the lot as glTF 2.0 JSON + BIN
pub struct SceneBuilder {
    name: String,
    binary_data: Vec<u8>,
    accessors: Vec<Accessor>,
    buffer_views: Vec<BufferView>,
    nodes: Vec<NodeSlot>,
    meshes: Vec<Mesh>,
    materials: Vec<Material>,
    images: Vec<Image>,
    textures: Vec<Texture>,
    skins: Vec<Skin>,
    uses_specular_extension: bool,
}

impl SceneBuilder {
    /// Create a new scene builder
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            binary_data: Vec::new(),
            accessors: Vec::new(),
            buffer_views: Vec::new(),
            nodes: Vec::new(),
            meshes: Vec::new(),
            materials: Vec::new(),
            images: Vec::new(),
            textures: Vec::new(),
            skins: Vec::new(),
            uses_specular_extension: false,
        }
    }

    /// Add a transform node; `parent` must already exist
    pub fn add_node(
        &mut self,
        name: impl Into<String>,
        parent: Option<usize>,
        translation: [f32; 3],
        rotation: [f32; 4],
        scale: [f32; 3],
    ) -> usize {
        let idx = self.nodes.len();
        self.nodes.push(NodeSlot {
            name: name.into(),
            parent: parent.filter(|&p| p < idx),
            translation,
            rotation,
            scale,
            mesh: None,
            skin: None,
        });
        idx
    }

    /// Number of nodes added so far
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of mesh primitives added so far
    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    /// World transform of a node (local * parent chain)
    pub fn world_transform(&self, node: usize) -> Mat4 {
        let mut result = math::IDENTITY_MATRIX;
        let mut cursor = Some(node);
        let mut hops = 0;
        while let Some(idx) = cursor {
            let slot = &self.nodes[idx];
            let local = math::trs_matrix(slot.translation, slot.rotation, slot.scale);
            result = math::multiply(result, local);
            cursor = slot.parent;
            hops += 1;
            if hops > self.nodes.len() {
                break;
            }
        }
        result
    }

    /// Root node of `node`'s parent chain, or None if the chain is cyclic
    fn chain_root(&self, node: usize) -> Option<usize> {
        let mut cursor = node;
        let mut hops = 0;
        while let Some(parent) = self.nodes.get(cursor)?.parent {
            cursor = parent;
            hops += 1;
            if hops > self.nodes.len() {
                return None;
            }
        }
        Some(cursor)
    }

    /// Whether a joint set forms a structurally valid armature: non-empty,
    /// acyclic, and sharing one common root
    pub fn valid_armature(&self, joints: &[usize]) -> bool {
        let Some(&first) = joints.first() else {
            return false;
        };
        let Some(root) = self.chain_root(first) else {
            return false;
        };
        joints.iter().all(|&j| self.chain_root(j) == Some(root))
    }

    /// Register an output material and its texture channels
    pub fn add_material(&mut self, def: &MaterialDefinition) -> usize {
        let mut material = Material {
            name: Some(def.name.clone()),
            pbr_metallic_roughness: Some(PbrMetallicRoughness {
                base_color_factor: Some([1.0, 1.0, 1.0, 1.0]),
                base_color_texture: None,
                metallic_factor: Some(def.metallic_factor),
                roughness_factor: Some(def.roughness_factor),
            }),
            normal_texture: None,
            occlusion_texture: None,
            emissive_texture: None,
            emissive_factor: None,
            alpha_mode: def.alpha_mode.as_gltf(),
            double_sided: if def.double_sided { Some(true) } else { None },
            extensions: None,
        };

        for (channel, uri) in &def.channels {
            let image_idx = self.images.len();
            self.images.push(Image {
                uri: Some(uri.clone()),
            });
            let texture_idx = self.textures.len();
            self.textures.push(Texture { source: image_idx });
            let info = TextureInfo { index: texture_idx };

            match channel {
                MaterialChannel::BaseColor => {
                    if let Some(pbr) = material.pbr_metallic_roughness.as_mut() {
                        pbr.base_color_texture = Some(info);
                    }
                }
                MaterialChannel::Normal => material.normal_texture = Some(info),
                MaterialChannel::Occlusion => material.occlusion_texture = Some(info),
                MaterialChannel::Emissive => {
                    material.emissive_texture = Some(info);
                    material.emissive_factor = Some([1.0, 1.0, 1.0]);
                }
                MaterialChannel::SpecularColor => {
                    self.uses_specular_extension = true;
                    material.extensions = Some(MaterialExtensions {
                        specular: Some(SpecularExtension {
                            specular_color_texture: Some(info),
                        }),
                    });
                }
            }
        }

        let idx = self.materials.len();
        self.materials.push(material);
        idx
    }

    /// Add a rigid (unskinned) mesh primitive as its own scene node
    pub fn add_rigid_mesh(&mut self, prim: PrimitiveData) -> SceneResult<usize> {
        prim.validate()?;
        let mesh_idx = self.push_mesh(&prim)?;
        Ok(self.push_mesh_node(&prim.name, mesh_idx, None))
    }

    /// Add a skinned mesh primitive bound to `joints` (scene node indices)
    pub fn add_skinned_mesh(&mut self, prim: PrimitiveData, joints: &[usize]) -> SceneResult<usize> {
        prim.validate()?;
        if prim.joints.is_none() || prim.weights.is_none() {
            return Err(SceneError::InvalidMeshData(
                "skinned primitive without joint attributes".to_string(),
            ));
        }

        let skin_idx = self.push_skin(&prim.name, joints);
        let mesh_idx = self.push_mesh(&prim)?;
        Ok(self.push_mesh_node(&prim.name, mesh_idx, Some(skin_idx)))
    }

    fn push_mesh_node(&mut self, name: &str, mesh: usize, skin: Option<usize>) -> usize {
        let idx = self.add_node(name, None, [0.0; 3], [0.0, 0.0, 0.0, 1.0], [1.0; 3]);
        self.nodes[idx].mesh = Some(mesh);
        self.nodes[idx].skin = skin;
        idx
    }

    fn push_skin(&mut self, name: &str, joints: &[usize]) -> usize {
        let offset = self.pad_and_mark(4);
        for &joint in joints {
            let inverse_bind = math::invert_rigid(self.world_transform(joint));
            let flat = math::to_gltf_array(inverse_bind);
            self.binary_data
                .extend_from_slice(bytemuck::cast_slice(&flat));
        }
        let accessor = self.add_accessor(
            offset,
            joints.len(),
            "MAT4",
            COMPONENT_TYPE_FLOAT,
            None,
            None,
            None,
        );

        let skeleton = joints.first().and_then(|&j| self.chain_root(j));
        let idx = self.skins.len();
        self.skins.push(Skin {
            name: Some(format!("{name}_skin")),
            inverse_bind_matrices: accessor,
            joints: joints.to_vec(),
            skeleton,
        });
        idx
    }

    fn push_mesh(&mut self, prim: &PrimitiveData) -> SceneResult<usize> {
        let mut attributes = std::collections::HashMap::new();
        attributes.insert("POSITION".to_string(), self.add_positions(&prim.positions));
        attributes.insert("NORMAL".to_string(), self.add_vec3(&prim.normals));
        attributes.insert("TEXCOORD_0".to_string(), self.add_vec2(&prim.uvs));

        if let (Some(joints), Some(weights)) = (&prim.joints, &prim.weights) {
            attributes.insert("JOINTS_0".to_string(), self.add_joint_indices(joints));
            attributes.insert("WEIGHTS_0".to_string(), self.add_vec4(weights));
        }

        let indices = self.add_indices(&prim.indices);

        let mut targets = Vec::new();
        let mut target_names = Vec::new();
        for morph in &prim.morphs {
            let accessor = self.add_positions(&morph.positions);
            let mut map = std::collections::HashMap::new();
            map.insert("POSITION".to_string(), accessor);
            targets.push(map);
            target_names.push(morph.name.clone());
        }

        let primitive = Primitive {
            attributes,
            indices: Some(indices),
            material: prim.material,
            mode: Some(MODE_TRIANGLES),
            targets,
        };

        let extras = if target_names.is_empty() {
            None
        } else {
            Some(serde_json::json!({ "targetNames": target_names }))
        };

        let idx = self.meshes.len();
        self.meshes.push(Mesh {
            name: Some(prim.name.clone()),
            primitives: vec![primitive],
            weights: vec![0.0; prim.morphs.len()],
            extras,
        });
        Ok(idx)
    }

    // ---- buffer packing ----

    /// Pad the binary buffer to `align` and return the aligned offset
    fn pad_and_mark(&mut self, align: usize) -> usize {
        while self.binary_data.len() % align != 0 {
            self.binary_data.push(0);
        }
        self.binary_data.len()
    }

    fn add_positions(&mut self, positions: &[[f32; 3]]) -> usize {
        let offset = self.pad_and_mark(4);
        let mut min = [f32::MAX; 3];
        let mut max = [f32::MIN; 3];
        for p in positions {
            for i in 0..3 {
                min[i] = min[i].min(p[i]);
                max[i] = max[i].max(p[i]);
            }
        }
        self.binary_data
            .extend_from_slice(bytemuck::cast_slice(positions));
        self.add_accessor(
            offset,
            positions.len(),
            "VEC3",
            COMPONENT_TYPE_FLOAT,
            Some(min.to_vec()),
            Some(max.to_vec()),
            Some(TARGET_ARRAY_BUFFER),
        )
    }

    fn add_vec3(&mut self, values: &[[f32; 3]]) -> usize {
        let offset = self.pad_and_mark(4);
        self.binary_data
            .extend_from_slice(bytemuck::cast_slice(values));
        self.add_accessor(
            offset,
            values.len(),
            "VEC3",
            COMPONENT_TYPE_FLOAT,
            None,
            None,
            Some(TARGET_ARRAY_BUFFER),
        )
    }

    fn add_vec2(&mut self, values: &[[f32; 2]]) -> usize {
        let offset = self.pad_and_mark(4);
        self.binary_data
            .extend_from_slice(bytemuck::cast_slice(values));
        self.add_accessor(
            offset,
            values.len(),
            "VEC2",
            COMPONENT_TYPE_FLOAT,
            None,
            None,
            Some(TARGET_ARRAY_BUFFER),
        )
    }

    fn add_vec4(&mut self, values: &[[f32; 4]]) -> usize {
        let offset = self.pad_and_mark(4);
        self.binary_data
            .extend_from_slice(bytemuck::cast_slice(values));
        self.add_accessor(
            offset,
            values.len(),
            "VEC4",
            COMPONENT_TYPE_FLOAT,
            None,
            None,
            Some(TARGET_ARRAY_BUFFER),
        )
    }

    fn add_joint_indices(&mut self, values: &[[u16; 4]]) -> usize {
        let offset = self.pad_and_mark(2);
        self.binary_data
            .extend_from_slice(bytemuck::cast_slice(values));
        self.add_accessor(
            offset,
            values.len(),
            "VEC4",
            COMPONENT_TYPE_UNSIGNED_SHORT,
            None,
            None,
            Some(TARGET_ARRAY_BUFFER),
        )
    }

    fn add_indices(&mut self, indices: &[u16]) -> usize {
        let offset = self.pad_and_mark(2);
        self.binary_data
            .extend_from_slice(bytemuck::cast_slice(indices));
        self.add_accessor(
            offset,
            indices.len(),
            "SCALAR",
            COMPONENT_TYPE_UNSIGNED_SHORT,
            None,
            None,
            Some(TARGET_ELEMENT_ARRAY_BUFFER),
        )
    }

    /// Add accessor and buffer view
    #[allow(clippy::too_many_arguments)]
    fn add_accessor(
        &mut self,
        offset: usize,
        count: usize,
        accessor_type: &str,
        component_type: u32,
        min: Option<Vec<f32>>,
        max: Option<Vec<f32>>,
        target: Option<u32>,
    ) -> usize {
        let byte_length = self.binary_data.len() - offset;

        let buffer_view_index = self.buffer_views.len();
        self.buffer_views.push(BufferView {
            buffer: 0,
            byte_offset: Some(offset),
            byte_length,
            byte_stride: None,
            target,
        });

        let accessor_index = self.accessors.len();
        self.accessors.push(Accessor {
            buffer_view: Some(buffer_view_index),
            byte_offset: None,
            component_type,
            count,
            accessor_type: accessor_type.to_string(),
            max,
            min,
        });

        accessor_index
    }

    // ---- serialization ----

    /// Assemble the glTF document
    fn build_document(&self) -> Gltf {
        let mut nodes: Vec<Node> = self
            .nodes
            .iter()
            .map(|slot| Node {
                name: Some(slot.name.clone()),
                mesh: slot.mesh,
                skin: slot.skin,
                translation: Some(slot.translation),
                rotation: Some(slot.rotation),
                scale: Some(slot.scale),
                children: Vec::new(),
            })
            .collect();

        let mut roots = Vec::new();
        for (idx, slot) in self.nodes.iter().enumerate() {
            match slot.parent {
                Some(parent) => nodes[parent].children.push(idx),
                None => roots.push(idx),
            }
        }

        let extensions_used = if self.uses_specular_extension {
            vec!["KHR_materials_specular".to_string()]
        } else {
            Vec::new()
        };

        Gltf {
            asset: Asset {
                version: "2.0".to_string(),
                generator: Some("marionette".to_string()),
            },
            extensions_used,
            scene: Some(0),
            scenes: vec![Scene {
                name: Some(self.name.clone()),
                nodes: roots,
            }],
            nodes,
            meshes: self.meshes.clone(),
            materials: self.materials.clone(),
            accessors: self.accessors.clone(),
            buffer_views: self.buffer_views.clone(),
            buffers: vec![Buffer {
                uri: Some("scene.bin".to_string()),
                byte_length: self.binary_data.len(),
            }],
            skins: self.skins.clone(),
            images: self.images.clone(),
            textures: self.textures.clone(),
        }
    }

    /// Write `scene.gltf` + `scene.bin` into `dir`, returning the JSON path
    pub fn serialize(&self, dir: impl AsRef<Path>) -> SceneResult<PathBuf> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;

        let gltf = self.build_document();
        let json = serde_json::to_string_pretty(&gltf)?;

        let json_path = dir.join("scene.gltf");
        std::fs::write(&json_path, json)?;
        std::fs::write(dir.join("scene.bin"), &self.binary_data)?;

        Ok(json_path)
    }
}
