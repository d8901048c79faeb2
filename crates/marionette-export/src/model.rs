//! Model resolution with an ordered fallback chain
//!
//! A mesh node is resolved through up to three path candidates, first success
//! wins: the node's full path, its game path, and the game path with the
//! embedded race-code segment substituted by the target deform id. Failures
//! stay recorded on the result so diagnostics can show what was tried.

use marionette_core::ResourceNode;
use marionette_formats::{AssetLibrary, ModelContainer};
use parking_lot::Mutex;
use regex::Regex;
use tracing::{debug, warn};

/// One failed resolution attempt, kept for diagnostics
#[derive(Debug)]
pub struct FailedAttempt {
    pub path: String,
    pub error: String,
}

/// A successfully resolved model and the chain history behind it
#[derive(Debug)]
pub struct ResolvedModel {
    pub container: ModelContainer,
    /// The candidate path that loaded
    pub path: String,
    /// Candidates tried before the winning one
    pub attempts: Vec<FailedAttempt>,
}

/// Loads model containers behind a shared exclusive lock (the underlying
/// loader is not safe for concurrent use)
pub struct ModelLoader<'a> {
    library: &'a AssetLibrary,
    lock: &'a Mutex<()>,
}

impl<'a> ModelLoader<'a> {
    pub fn new(library: &'a AssetLibrary, lock: &'a Mutex<()>) -> Self {
        Self { library, lock }
    }

    /// Resolve `node` through the fallback chain. Exhausting every candidate
    /// is a skip (logged), not an error.
    pub fn load(&self, node: &ResourceNode, deform_id: Option<u16>) -> Option<ResolvedModel> {
        let _guard = self.lock.lock();

        let mut attempts = Vec::new();
        for candidate in candidate_paths(node, deform_id) {
            match self.library.load_model(&candidate) {
                Ok(container) => {
                    if candidate != node.full_path() {
                        debug!(init = %node.full_path(), used = %candidate, "Resolved model via fallback");
                    }
                    return Some(ResolvedModel {
                        container,
                        path: candidate,
                        attempts,
                    });
                }
                Err(e) => {
                    warn!(path = %candidate, error = %e, "Failed to load model");
                    attempts.push(FailedAttempt {
                        path: candidate,
                        error: e.to_string(),
                    });
                }
            }
        }

        warn!(
            full_path = %node.full_path(),
            game_path = %node.game_path,
            "Could not load model from any candidate path"
        );
        None
    }
}

/// Ordered candidate paths for one mesh node
fn candidate_paths(node: &ResourceNode, deform_id: Option<u16>) -> Vec<String> {
    let mut candidates = vec![node.full_path().to_string()];
    if node.game_path != node.full_path() {
        candidates.push(node.game_path.clone());
    }
    if let Some(id) = deform_id {
        if let Some(substituted) = substitute_race_segment(&node.game_path, id) {
            if !candidates.contains(&substituted) {
                candidates.push(substituted);
            }
        }
    }
    candidates
}

/// Replace the `c` + digits race segment with the deform id's tag.
/// Returns None when the path carries no race segment.
fn substitute_race_segment(path: &str, deform_id: u16) -> Option<String> {
    #[allow(clippy::unwrap_used)] // pattern is a literal
    let race_segment = Regex::new(r"c\d+").unwrap();
    if !race_segment.is_match(path) {
        return None;
    }
    Some(
        race_segment
            .replace_all(path, format!("c{deform_id:04}"))
            .into_owned(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use marionette_formats::source::{FileSource, SourceError, SourceResult};
    use marionette_formats::MeshContainer;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn model_json() -> Vec<u8> {
        let model = ModelContainer {
            meshes: vec![MeshContainer {
                mesh_index: 0,
                material: "/mt_a.mtrl".to_string(),
                bone_table: vec![],
                vertices: vec![],
                indices: vec![],
                submeshes: vec![],
                shapes: vec![],
            }],
        };
        serde_json::to_vec(&model).unwrap()
    }

    struct MapSource(HashMap<String, Vec<u8>>);

    impl FileSource for MapSource {
        fn read(&self, path: &str) -> SourceResult<Vec<u8>> {
            self.0.get(path).cloned().ok_or(SourceError::NotFound {
                path: path.to_string(),
            })
        }
    }

    fn library(files: HashMap<String, Vec<u8>>) -> AssetLibrary {
        AssetLibrary::snapshot(Arc::new(MapSource(files)))
    }

    #[test]
    fn test_substitute_race_segment() {
        assert_eq!(
            substitute_race_segment("chara/human/c0201/model/c0201b0001_top.mdl", 101).as_deref(),
            Some("chara/human/c0101/model/c0101b0001_top.mdl")
        );
        assert_eq!(substitute_race_segment("chara/common/cloth.mdl", 101), None);
    }

    #[test]
    fn test_full_path_wins() {
        let mut files = HashMap::new();
        files.insert("mods/body.mdl".to_string(), model_json());
        files.insert("chara/body.mdl".to_string(), model_json());

        let library = library(files);
        let lock = Mutex::new(());
        let loader = ModelLoader::new(&library, &lock);

        let node = ResourceNode::new("", "", 0, "mods/body.mdl", "chara/body.mdl");
        let resolved = loader.load(&node, None).unwrap();
        assert_eq!(resolved.path, "mods/body.mdl");
        assert!(resolved.attempts.is_empty());
    }

    #[test]
    fn test_race_substituted_fallback_records_attempts() {
        let mut files = HashMap::new();
        // Only the race-substituted path exists
        files.insert(
            "chara/human/c0101/model/c0101b0001_top.mdl".to_string(),
            model_json(),
        );

        let library = library(files);
        let lock = Mutex::new(());
        let loader = ModelLoader::new(&library, &lock);

        let node = ResourceNode::new(
            "",
            "",
            0,
            r"C:\mods\c0201b0001_top.mdl",
            "chara/human/c0201/model/c0201b0001_top.mdl",
        );
        let resolved = loader.load(&node, Some(101)).unwrap();
        assert_eq!(resolved.path, "chara/human/c0101/model/c0101b0001_top.mdl");
        assert_eq!(resolved.attempts.len(), 2);
        assert_eq!(resolved.attempts[0].path, r"C:\mods\c0201b0001_top.mdl");
        assert_eq!(
            resolved.attempts[1].path,
            "chara/human/c0201/model/c0201b0001_top.mdl"
        );
    }

    #[test]
    fn test_exhausted_chain_is_none() {
        let library = library(HashMap::new());
        let lock = Mutex::new(());
        let loader = ModelLoader::new(&library, &lock);

        let node = ResourceNode::new("", "", 0, "a.mdl", "b.mdl");
        assert!(loader.load(&node, None).is_none());
    }

    #[test]
    fn test_no_deform_id_skips_substitution() {
        let mut files = HashMap::new();
        files.insert(
            "chara/human/c0101/model/c0101b0001_top.mdl".to_string(),
            model_json(),
        );
        let library = library(files);
        let lock = Mutex::new(());
        let loader = ModelLoader::new(&library, &lock);

        let node = ResourceNode::new(
            "",
            "",
            0,
            "chara/human/c0201/model/c0201b0001_top.mdl",
            "chara/human/c0201/model/c0201b0001_top.mdl",
        );
        assert!(loader.load(&node, None).is_none());
    }
}
