//! Export coordination
//!
//! One exporter instance owns every piece of cross-export state: the
//! skeleton cache, the export gate, the texture-write gate and the
//! model-load lock. An export walks Idle -> Preparing (output path, node
//! gathering, serialized skeleton resolution) -> Exporting (parallel
//! per-model texture/material resolution, serial mesh assembly, scene
//! serialization) -> Idle. A request arriving while another export holds
//! the gate is rejected outright.

use std::path::PathBuf;
use std::sync::Arc;

use marionette_core::{Error, ResourceKind, ResourceNode, ResourceTree, Result};
use marionette_formats::{AssetLibrary, DeformRegistry};
use parking_lot::Mutex;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::deform::RaceDeformer;
use crate::material::{self, MaterialRecord};
use crate::model::{ModelLoader, ResolvedModel};
use crate::scene::{MaterialDefinition, SceneBuilder};
use crate::skeleton::{build_bone_map, order_skeleton_nodes, SkeletonCache, SkeletonResolver};
use crate::textures::{TextureError, TextureSynthesizer, TextureWriter};
use crate::CancelFlag;

/// Exporter configuration
#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Root under which per-export directories are created
    pub output_root: PathBuf,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            output_root: std::env::temp_dir().join("marionette"),
        }
    }
}

/// What an export request produced
#[derive(Debug)]
pub enum ExportOutcome {
    /// Another export held the gate; nothing happened
    Busy,
    /// The cancel flag stopped the export before serialization
    Cancelled,
    Completed(ExportSummary),
}

/// Result data of a completed export
#[derive(Debug)]
pub struct ExportSummary {
    pub directory: PathBuf,
    pub scene_path: PathBuf,
    /// Primitives added to the scene
    pub meshes: usize,
    /// Materials registered
    pub materials: usize,
    /// Model nodes skipped after exhausting the fallback chain
    pub skipped_models: usize,
}

/// A material synthesized during the parallel phase, not yet registered
struct PreparedMaterial {
    full_path: String,
    game_path: String,
    definition: MaterialDefinition,
}

/// Per-model result of the parallel phase
struct PreparedModel<'t> {
    order: usize,
    node: &'t ResourceNode,
    resolved: Option<ResolvedModel>,
    materials: Vec<PreparedMaterial>,
}

/// Converts resource trees into serialized scenes.
///
/// All cross-export state lives here: the skeleton cache persists for the
/// instance's lifetime, the gates bound concurrency system-wide as long as
/// every caller shares the instance.
pub struct CharacterExporter {
    library: AssetLibrary,
    deformer: RaceDeformer,
    options: ExportOptions,
    /// Only touched during the serialized preparation phase
    skeleton_cache: Mutex<SkeletonCache>,
    /// At most one export in flight
    export_gate: Mutex<()>,
    /// At most one texture write in flight
    texture_writer: TextureWriter,
    /// The model loader is not reentrant
    model_lock: Mutex<()>,
}

impl CharacterExporter {
    pub fn new(library: AssetLibrary, deformers: Arc<DeformRegistry>, options: ExportOptions) -> Self {
        Self {
            library,
            deformer: RaceDeformer::new(deformers),
            options,
            skeleton_cache: Mutex::new(SkeletonCache::new()),
            export_gate: Mutex::new(()),
            texture_writer: TextureWriter::new(),
            model_lock: Mutex::new(()),
        }
    }

    /// Observed peak of concurrent texture writers (diagnostics)
    pub fn texture_write_peak(&self) -> usize {
        self.texture_writer.peak_concurrency()
    }

    /// Export the selected nodes of `tree`.
    ///
    /// `enabled` selects top-level nodes by position; skeletons are always
    /// honored regardless of selection. Returns [`ExportOutcome::Busy`]
    /// without touching anything when an export is already in flight.
    pub fn export(
        &self,
        tree: &ResourceTree,
        enabled: &[bool],
        cancel: &CancelFlag,
    ) -> Result<ExportOutcome> {
        let Some(_gate) = self.export_gate.try_lock() else {
            warn!("Export already in progress");
            return Ok(ExportOutcome::Busy);
        };

        // ---- Preparing ----
        let timestamp = chrono::Local::now().format("%Y-%m-%d-%H-%M-%S");
        let directory = self
            .options
            .output_root
            .join(format!("{}-{timestamp}", tree.name));
        std::fs::create_dir_all(&directory)?;

        debug!(path = %directory.display(), "Exporting character");

        let enabled_nodes: Vec<&ResourceNode> = tree
            .nodes
            .iter()
            .enumerate()
            .filter(|(i, _)| enabled.get(*i).copied().unwrap_or(false))
            .map(|(_, n)| n)
            .collect();

        // Skeletons live at the root level only, and are never excluded by
        // the selection: meshes without their bones are useless.
        let skeleton_nodes = order_skeleton_nodes(tree.nodes_of_kind(ResourceKind::Skeleton));
        let documents = {
            let mut cache = self.skeleton_cache.lock();
            let mut resolver = SkeletonResolver::new(&self.library, &mut cache);
            resolver.resolve(&skeleton_nodes)
        };

        #[allow(clippy::unwrap_used)] // pattern is a literal
        let low_poly = Regex::new(r"^chara/human/c\d+/obj/body/b0003/model/c\d+b0003_top\.mdl$").unwrap();
        let model_nodes: Vec<&ResourceNode> = enabled_nodes
            .iter()
            .filter(|n| n.kind() == ResourceKind::Model)
            .filter(|n| {
                if low_poly.is_match(&n.game_path) {
                    // The producer pairs every body with a hidden low-poly
                    // variant; exporting it just duplicates geometry.
                    warn!(path = %n.full_path(), "Skipping low-poly model");
                    false
                } else {
                    true
                }
            })
            .copied()
            .collect();

        let scene_name = model_nodes
            .first()
            .map(|n| n.game_path.clone())
            .unwrap_or_else(|| "scene".to_string());
        let mut scene = SceneBuilder::new(scene_name);
        let bone_map = build_bone_map(&documents, &mut scene);
        let deform_id = tree.body().deform_id();

        // ---- Exporting: parallel texture/material resolution ----
        let prepared: Mutex<Vec<PreparedModel>> = Mutex::new(Vec::new());
        let loader = ModelLoader::new(&self.library, &self.model_lock);
        let synthesizer = TextureSynthesizer::new(&self.library, &self.texture_writer);

        rayon::scope(|s| {
            for (order, node) in model_nodes.iter().copied().enumerate() {
                let prepared = &prepared;
                let loader = &loader;
                let synthesizer = &synthesizer;
                let directory = &directory;

                s.spawn(move |_| {
                    debug!(path = %node.full_path(), "Handling model");
                    let resolved = loader.load(node, Some(deform_id));

                    let materials: Mutex<Vec<PreparedMaterial>> = Mutex::new(Vec::new());
                    rayon::scope(|inner| {
                        for child in node
                            .children
                            .iter()
                            .filter(|c| c.kind() == ResourceKind::Material)
                        {
                            let materials = &materials;
                            inner.spawn(move |_| {
                                self.prepare_material(synthesizer, child, directory, cancel, materials);
                            });
                        }
                    });

                    prepared.lock().push(PreparedModel {
                        order,
                        node,
                        resolved,
                        materials: materials.into_inner(),
                    });
                });
            }
        });

        if cancel.is_cancelled() {
            debug!("Export cancelled before mesh assembly");
            return Ok(ExportOutcome::Cancelled);
        }

        // ---- Exporting: serial mesh assembly, in input-node order ----
        let mut prepared = prepared.into_inner();
        prepared.sort_by_key(|p| p.order);

        #[allow(clippy::unwrap_used)] // pattern is a literal
        let second_eye = Regex::new(r"^/mt_c\d+f.+_etc_b\.mtrl$").unwrap();

        let mut mesh_count = 0usize;
        let mut material_count = 0usize;
        let mut skipped_models = 0usize;

        for model in prepared {
            let Some(resolved) = model.resolved else {
                skipped_models += 1;
                continue;
            };

            let records: Vec<MaterialRecord> = model
                .materials
                .into_iter()
                .map(|m| MaterialRecord {
                    material: scene.add_material(&m.definition),
                    full_path: m.full_path,
                    game_path: m.game_path,
                })
                .collect();
            material_count += records.len();

            let model_name = crate::textures::material_base_name(model.node.full_path());
            let race_code = RaceDeformer::race_code_from_path(model.node.full_path());

            debug!(
                name = %model_name,
                meshes = resolved.container.meshes.len(),
                used_path = %resolved.path,
                "Assembling model"
            );

            for mesh in &resolved.container.meshes {
                if second_eye.is_match(&mesh.material) {
                    // The producer renders the second eye with a mirrored
                    // duplicate of the first; skip it.
                    warn!(material = %mesh.material, "Skipping mirrored-eye mesh");
                    continue;
                }

                let Some(record) = material::resolve(&records, &mesh.material) else {
                    warn!(material = %mesh.material, "Could not find material for mesh");
                    continue;
                };
                if record.game_path != mesh.material && record.full_path != mesh.material {
                    warn!(wanted = %mesh.material, using = %record.game_path, "Using closest material");
                }

                let deform_steps = match race_code {
                    Some(code) => self.deformer.deform_steps(code, deform_id),
                    None => Vec::new(),
                };

                mesh_count += crate::mesh::assemble_mesh(
                    &mut scene,
                    mesh,
                    &model_name,
                    &bone_map,
                    Some(record.material),
                    &deform_steps,
                );
            }
        }

        if cancel.is_cancelled() {
            debug!("Export cancelled before scene serialization");
            return Ok(ExportOutcome::Cancelled);
        }

        // ---- Scene serialization ----
        let scene_path = scene
            .serialize(directory.join("scene"))
            .map_err(|e| Error::export_failed(format!("scene serialization failed: {e}")))?;

        info!(
            path = %directory.display(),
            meshes = mesh_count,
            materials = material_count,
            "Exported character"
        );

        Ok(ExportOutcome::Completed(ExportSummary {
            directory,
            scene_path,
            meshes: mesh_count,
            materials: material_count,
            skipped_models,
        }))
    }

    /// Load, synthesize and record one material child node
    fn prepare_material(
        &self,
        synthesizer: &TextureSynthesizer<'_>,
        child: &ResourceNode,
        directory: &std::path::Path,
        cancel: &CancelFlag,
        out: &Mutex<Vec<PreparedMaterial>>,
    ) {
        let container = match self.library.load_material(child.full_path()) {
            Ok(c) => c,
            Err(e) => {
                warn!(path = %child.full_path(), error = %e, "Could not load material");
                return;
            }
        };

        let naming_path = if child.game_path.is_empty() {
            child.full_path()
        } else {
            child.game_path.as_str()
        };

        match synthesizer.compose(
            &container,
            naming_path,
            Some(&child.children),
            directory,
            cancel,
        ) {
            Ok(definition) => out.lock().push(PreparedMaterial {
                full_path: child.full_path().to_string(),
                game_path: child.game_path.clone(),
                definition,
            }),
            Err(TextureError::Cancelled) => {
                debug!(path = %child.full_path(), "Texture synthesis cancelled")
            }
            Err(e) => {
                warn!(path = %child.full_path(), error = %e, "Failed to compose textures for material")
            }
        }
    }
}
