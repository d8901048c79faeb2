//! End-to-end export pipeline tests against an in-memory asset library

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};

use marionette_core::{ResourceNode, ResourceTree};
use marionette_export::scene::Gltf;
use marionette_export::{CancelFlag, CharacterExporter, ExportOptions, ExportOutcome};
use marionette_formats::source::{FileSource, SourceError, SourceResult};
use marionette_formats::{
    AssetLibrary, DeformRegistry, MaterialContainer, MeshContainer, ModelContainer, ShapeKey,
    ShapeValue, SkeletonBone, SkeletonDocument, SubMesh, TextureRef, TextureUsage, Vertex,
};
use parking_lot::Mutex;

const TYPE_SKELETON: u64 = 0x736B_6C62;
const TYPE_MODEL: u64 = 0x6D_646C;
const TYPE_MATERIAL: u64 = 0x6D74_726C;
const TYPE_TEXTURE: u64 = 0x74_6578;

struct MapSource(HashMap<String, Vec<u8>>);

impl FileSource for MapSource {
    fn read(&self, path: &str) -> SourceResult<Vec<u8>> {
        self.0.get(path).cloned().ok_or(SourceError::NotFound {
            path: path.to_string(),
        })
    }
}

fn png_bytes(rgba: [u8; 4]) -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(2, 2, image::Rgba(rgba));
    let mut bytes = Vec::new();
    img.write_to(
        &mut std::io::Cursor::new(&mut bytes),
        image::ImageFormat::Png,
    )
    .unwrap();
    bytes
}

fn skeleton_json() -> Vec<u8> {
    let mut doc = SkeletonDocument::new();
    let root = doc.add_bone(SkeletonBone::new("n_root"));
    let mut spine = SkeletonBone::new("j_spine");
    spine.parent = Some(root);
    spine.translation = [0.0, 1.0, 0.0];
    doc.add_bone(spine);
    serde_json::to_vec(&doc).unwrap()
}

fn vertex(pos: [f32; 3]) -> Vertex {
    Vertex {
        position: pos,
        normal: [0.0, 0.0, 1.0],
        uv: [0.0, 0.0],
        blend_indices: [0, 0, 0, 0],
        blend_weights: [1.0, 0.0, 0.0, 0.0],
    }
}

fn model_json() -> Vec<u8> {
    let model = ModelContainer {
        meshes: vec![MeshContainer {
            mesh_index: 0,
            material: "/mt_body.mtrl".to_string(),
            bone_table: vec!["j_spine".to_string()],
            vertices: vec![
                vertex([0.0, 0.0, 0.0]),
                vertex([1.0, 0.0, 0.0]),
                vertex([0.0, 1.0, 0.0]),
            ],
            indices: vec![0, 1, 2],
            submeshes: vec![SubMesh {
                index_offset: 0,
                index_count: 3,
            }],
            shapes: vec![ShapeKey {
                name: "shp_test".to_string(),
                values: vec![ShapeValue {
                    base_index: 0,
                    replacing_vertex: 1,
                }],
            }],
        }],
    };
    serde_json::to_vec(&model).unwrap()
}

fn material_json() -> Vec<u8> {
    let material = MaterialContainer {
        shader_pack: "skin.shpk".to_string(),
        color_table: None,
        textures: vec![
            TextureRef {
                usage: TextureUsage::Normal,
                path: "chara/texture/body_n.tex".to_string(),
            },
            TextureRef {
                usage: TextureUsage::Diffuse,
                path: "chara/texture/body_d.tex".to_string(),
            },
            TextureRef {
                usage: TextureUsage::Specular,
                path: "dummy.tex".to_string(),
            },
        ],
    };
    serde_json::to_vec(&material).unwrap()
}

fn fixture_files() -> HashMap<String, Vec<u8>> {
    let mut files = HashMap::new();
    files.insert(
        "chara/human/c0101/skeleton/skl_c0101.sklb".to_string(),
        skeleton_json(),
    );
    files.insert(
        "chara/human/c0101/model/c0101b0001_top.mdl".to_string(),
        model_json(),
    );
    files.insert("chara/material/mt_body.mtrl".to_string(), material_json());
    files.insert(
        "chara/texture/body_n.tex".to_string(),
        // Blue channel carries the packed opacity for the skin pack
        png_bytes([10, 20, 99, 255]),
    );
    files.insert(
        "chara/texture/body_d.tex".to_string(),
        png_bytes([200, 150, 100, 255]),
    );
    files
}

fn fixture_tree() -> ResourceTree {
    let mut tree = ResourceTree::new("Hero", 101);

    tree.nodes.push(ResourceNode::new(
        "skeleton",
        "",
        TYPE_SKELETON,
        "chara/human/c0101/skeleton/skl_c0101.sklb",
        "chara/human/c0101/skeleton/skl_c0101.sklb",
    ));

    let mut model = ResourceNode::new(
        "body",
        "",
        TYPE_MODEL,
        "chara/human/c0101/model/c0101b0001_top.mdl",
        "chara/human/c0101/model/c0101b0001_top.mdl",
    );
    let mut material = ResourceNode::new(
        "material",
        "",
        TYPE_MATERIAL,
        "chara/material/mt_body.mtrl",
        "/mt_body.mtrl",
    );
    material.push_child(ResourceNode::new(
        "normal",
        "",
        TYPE_TEXTURE,
        "chara/texture/body_n.tex",
        "chara/texture/body_n.tex",
    ));
    model.push_child(material);
    tree.nodes.push(model);

    tree
}

fn exporter_with(source: Arc<dyn FileSource>, root: &std::path::Path) -> CharacterExporter {
    CharacterExporter::new(
        AssetLibrary::snapshot(source),
        Arc::new(DeformRegistry::empty()),
        ExportOptions {
            output_root: root.to_path_buf(),
        },
    )
}

fn export_dirs(root: &std::path::Path) -> Vec<std::path::PathBuf> {
    std::fs::read_dir(root)
        .map(|entries| entries.filter_map(|e| e.ok()).map(|e| e.path()).collect())
        .unwrap_or_default()
}

#[test]
fn skin_character_exports_end_to_end() {
    let root = tempfile::tempdir().unwrap();
    let exporter = exporter_with(Arc::new(MapSource(fixture_files())), root.path());

    let tree = fixture_tree();
    let outcome = exporter
        .export(&tree, &[true, true], &CancelFlag::new())
        .unwrap();

    let ExportOutcome::Completed(summary) = outcome else {
        panic!("expected completion, got {outcome:?}");
    };
    assert_eq!(summary.meshes, 1);
    assert_eq!(summary.materials, 1);
    assert_eq!(summary.skipped_models, 0);

    // One output directory named after the tree
    let dirs = export_dirs(root.path());
    assert_eq!(dirs.len(), 1);
    assert!(dirs[0]
        .file_name()
        .unwrap()
        .to_string_lossy()
        .starts_with("Hero-"));

    // Synthesized textures on disk, named by usage
    assert!(dirs[0].join("mt_body_diffuse.png").exists());
    assert!(dirs[0].join("mt_body_normal.png").exists());

    // The scene holds one skinned primitive with a mask-cutout material
    let text = std::fs::read_to_string(summary.scene_path).unwrap();
    let doc: Gltf = serde_json::from_str(&text).unwrap();
    assert_eq!(doc.meshes.len(), 1);
    assert_eq!(doc.skins.len(), 1);
    assert!(doc.meshes[0].primitives[0]
        .attributes
        .contains_key("JOINTS_0"));
    assert_eq!(doc.materials[0].alpha_mode.as_deref(), Some("MASK"));

    // Morph target carried through with its shape name
    assert_eq!(doc.meshes[0].primitives[0].targets.len(), 1);

    // The texture-write gate never admitted more than one writer
    assert_eq!(exporter.texture_write_peak(), 1);

    // The skin derivation moved the normal's blue into the diffuse alpha
    let diffuse = image::open(dirs[0].join("mt_body_diffuse.png"))
        .unwrap()
        .to_rgba8();
    assert_eq!(diffuse.get_pixel(0, 0).0, [200, 150, 100, 99]);
    let normal = image::open(dirs[0].join("mt_body_normal.png"))
        .unwrap()
        .to_rgba8();
    assert_eq!(normal.get_pixel(0, 0).0, [10, 20, 255, 99]);
}

#[test]
fn selection_excludes_models_but_not_skeletons() {
    let root = tempfile::tempdir().unwrap();
    let exporter = exporter_with(Arc::new(MapSource(fixture_files())), root.path());

    let tree = fixture_tree();
    // Only the skeleton node selected: skeleton still resolves, no meshes
    let outcome = exporter
        .export(&tree, &[true, false], &CancelFlag::new())
        .unwrap();

    let ExportOutcome::Completed(summary) = outcome else {
        panic!("expected completion, got {outcome:?}");
    };
    assert_eq!(summary.meshes, 0);
    assert_eq!(summary.materials, 0);
}

#[test]
fn unresolvable_model_is_skipped_not_fatal() {
    let root = tempfile::tempdir().unwrap();
    let mut files = fixture_files();
    files.remove("chara/human/c0101/model/c0101b0001_top.mdl");
    let exporter = exporter_with(Arc::new(MapSource(files)), root.path());

    let tree = fixture_tree();
    let outcome = exporter
        .export(&tree, &[true, true], &CancelFlag::new())
        .unwrap();

    let ExportOutcome::Completed(summary) = outcome else {
        panic!("expected completion, got {outcome:?}");
    };
    assert_eq!(summary.meshes, 0);
    assert_eq!(summary.skipped_models, 1);
}

#[test]
fn cancelled_export_stops_before_serialization() {
    let root = tempfile::tempdir().unwrap();
    let exporter = exporter_with(Arc::new(MapSource(fixture_files())), root.path());

    let cancel = CancelFlag::new();
    cancel.cancel();

    let outcome = exporter.export(&fixture_tree(), &[true, true], &cancel).unwrap();
    assert!(matches!(outcome, ExportOutcome::Cancelled));

    // No scene was serialized
    let dirs = export_dirs(root.path());
    assert_eq!(dirs.len(), 1);
    assert!(!dirs[0].join("scene").exists());
}

/// Source that parks the first read until released, so a second export
/// request deterministically observes the gate held
struct BlockingSource {
    inner: MapSource,
    started: mpsc::Sender<()>,
    release: Mutex<Option<mpsc::Receiver<()>>>,
    tripped: AtomicBool,
}

impl FileSource for BlockingSource {
    fn read(&self, path: &str) -> SourceResult<Vec<u8>> {
        if !self.tripped.swap(true, Ordering::SeqCst) {
            let _ = self.started.send(());
            if let Some(rx) = self.release.lock().take() {
                let _ = rx.recv();
            }
        }
        self.inner.read(path)
    }
}

#[test]
fn second_export_request_is_rejected_while_one_runs() {
    let root = tempfile::tempdir().unwrap();
    let (started_tx, started_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();

    let source = Arc::new(BlockingSource {
        inner: MapSource(fixture_files()),
        started: started_tx,
        release: Mutex::new(Some(release_rx)),
        tripped: AtomicBool::new(false),
    });

    let exporter = Arc::new(exporter_with(source, root.path()));
    let tree = Arc::new(fixture_tree());

    let background = {
        let exporter = Arc::clone(&exporter);
        let tree = Arc::clone(&tree);
        std::thread::spawn(move || exporter.export(&tree, &[true, true], &CancelFlag::new()))
    };

    // Wait until the first export is provably inside its gate
    started_rx.recv().unwrap();

    let outcome = exporter.export(&tree, &[true, true], &CancelFlag::new()).unwrap();
    assert!(matches!(outcome, ExportOutcome::Busy));

    release_tx.send(()).unwrap();
    let first = background.join().unwrap().unwrap();
    assert!(matches!(first, ExportOutcome::Completed(_)));

    // Exactly one output directory: the rejected request produced nothing
    assert_eq!(export_dirs(root.path()).len(), 1);
}
