//! Skeleton resolution and bone-map construction
//!
//! Runs strictly before any mesh or material work, on the coordinator's
//! thread: the skeleton cache is only ever touched from here, and the
//! underlying loader cannot be used concurrently anyway.

use std::collections::HashMap;
use std::sync::Arc;

use marionette_core::ResourceNode;
use marionette_formats::{AssetLibrary, SkeletonDocument};
use tracing::{debug, warn};

use crate::scene::SceneBuilder;

/// Cache of parsed skeletons, keyed by the path string that loaded
/// successfully. Lives for the exporter instance; entries are never evicted
/// (skeleton sets per character are small).
pub type SkeletonCache = HashMap<String, Arc<SkeletonDocument>>;

/// Order skeleton nodes weapon-last, preserving input order within each
/// class. Weapon skeletons must merge after body skeletons so their bones win
/// name collisions.
pub fn order_skeleton_nodes<'a>(nodes: impl IntoIterator<Item = &'a ResourceNode>) -> Vec<&'a ResourceNode> {
    let mut ordered: Vec<&ResourceNode> = nodes.into_iter().collect();
    ordered.sort_by(|a, b| {
        let a_weapon = a.game_path.contains("weapon");
        let b_weapon = b.game_path.contains("weapon");
        a_weapon.cmp(&b_weapon)
    });
    ordered
}

/// Name-to-joint mapping produced by merging one or more skeletons
#[derive(Debug, Default)]
pub struct BoneMap {
    joints: Vec<usize>,
    by_name: HashMap<String, usize>,
    /// Scene node of the first skeleton root encountered
    pub root: Option<usize>,
}

impl BoneMap {
    /// Scene node bound to `name`, if any
    pub fn get(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).map(|&slot| self.joints[slot])
    }

    /// Position of `name` within the ordered joint list
    pub fn joint_index(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    /// The ordered global joint list handed to skins
    pub fn joints(&self) -> &[usize] {
        &self.joints
    }

    pub fn len(&self) -> usize {
        self.joints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joints.is_empty()
    }

    fn merge_bone(&mut self, name: &str, node: usize) {
        match self.by_name.get(name) {
            // Later skeletons win name collisions (weapon-last order)
            Some(&slot) => self.joints[slot] = node,
            None => {
                self.by_name.insert(name.to_string(), self.joints.len());
                self.joints.push(node);
            }
        }
    }
}

/// Loads skeleton containers and merges them into one bone map
pub struct SkeletonResolver<'a> {
    library: &'a AssetLibrary,
    cache: &'a mut SkeletonCache,
}

impl<'a> SkeletonResolver<'a> {
    pub fn new(library: &'a AssetLibrary, cache: &'a mut SkeletonCache) -> Self {
        Self { library, cache }
    }

    /// Load every skeleton node, trying the full path first and the game
    /// path second. Nodes failing both attempts are skipped with a warning.
    pub fn resolve(&mut self, nodes: &[&ResourceNode]) -> Vec<Arc<SkeletonDocument>> {
        let mut documents = Vec::new();

        for node in nodes {
            match self.resolve_node(node) {
                Some(doc) => documents.push(doc),
                None => warn!(
                    full_path = %node.full_path(),
                    game_path = %node.game_path,
                    "Skipping unloadable skeleton"
                ),
            }
        }

        documents
    }

    fn resolve_node(&mut self, node: &ResourceNode) -> Option<Arc<SkeletonDocument>> {
        // Full paths of certain packed assets are not loadable; the game
        // path is the reliable fallback there.
        for path in [node.full_path(), node.game_path.as_str()] {
            if let Some(doc) = self.cache.get(path) {
                return Some(Arc::clone(doc));
            }
            match self.library.load_skeleton(path) {
                Ok(doc) => {
                    let doc = Arc::new(doc);
                    self.cache.insert(path.to_string(), Arc::clone(&doc));
                    debug!(%path, bones = doc.bone_count(), "Loaded skeleton");
                    return Some(doc);
                }
                Err(e) => {
                    warn!(%path, error = %e, "Failed to load skeleton");
                }
            }
        }
        None
    }
}

/// Merge skeleton documents into scene joints and a bone map.
///
/// Each document contributes a transform-node hierarchy; bones sharing a name
/// with an earlier document replace the earlier entry in the map while
/// keeping its position in the joint order. The first document exposing a
/// root supplies the designated scene root.
pub fn build_bone_map(documents: &[Arc<SkeletonDocument>], scene: &mut SceneBuilder) -> BoneMap {
    let mut map = BoneMap::default();

    for doc in documents {
        let mut node_ids = Vec::with_capacity(doc.bones.len());
        for bone in &doc.bones {
            let parent = bone.parent.map(|p| node_ids[p]);
            let node = scene.add_node(
                bone.name.clone(),
                parent,
                bone.translation,
                bone.rotation,
                bone.scale,
            );
            node_ids.push(node);
            map.merge_bone(&bone.name, node);
        }

        if map.root.is_none() {
            map.root = doc.root().map(|r| node_ids[r]);
        }
    }

    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use marionette_formats::source::{FileSource, SourceError, SourceResult};
    use marionette_formats::{SkeletonBone, SkeletonParser};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn node(game_path: &str) -> ResourceNode {
        ResourceNode::new("", "", 0x736B_6C62, game_path, game_path)
    }

    #[test]
    fn test_weapon_nodes_sort_last() {
        let a = node("chara/human/c0101/skeleton/skl_c0101b0001.sklb");
        let w1 = node("chara/weapon/w0201/skeleton/skl_w0201.sklb");
        let b = node("chara/human/c0101/skeleton/skl_c0101f0002.sklb");
        let w2 = node("chara/weapon/w0301/skeleton/skl_w0301.sklb");

        let ordered = order_skeleton_nodes([&w1, &a, &w2, &b]);
        let paths: Vec<&str> = ordered.iter().map(|n| n.game_path.as_str()).collect();
        // Non-weapon first in input order, then weapons in input order
        assert_eq!(
            paths,
            vec![
                "chara/human/c0101/skeleton/skl_c0101b0001.sklb",
                "chara/human/c0101/skeleton/skl_c0101f0002.sklb",
                "chara/weapon/w0201/skeleton/skl_w0201.sklb",
                "chara/weapon/w0301/skeleton/skl_w0301.sklb",
            ]
        );
    }

    struct MapSource(HashMap<String, Vec<u8>>);

    impl FileSource for MapSource {
        fn read(&self, path: &str) -> SourceResult<Vec<u8>> {
            self.0.get(path).cloned().ok_or(SourceError::NotFound {
                path: path.to_string(),
            })
        }
    }

    struct CountingParser(AtomicUsize);

    impl SkeletonParser for CountingParser {
        fn parse(&self, bytes: &[u8]) -> marionette_formats::FormatResult<SkeletonDocument> {
            self.0.fetch_add(1, Ordering::SeqCst);
            serde_json::from_slice(bytes)
                .map_err(|e| marionette_formats::FormatError::malformed(e.to_string()))
        }
    }

    fn library_with(
        files: HashMap<String, Vec<u8>>,
        parser: Arc<CountingParser>,
    ) -> AssetLibrary {
        AssetLibrary::new(
            Arc::new(MapSource(files)),
            parser,
            Arc::new(marionette_formats::SnapshotModelParser),
            Arc::new(marionette_formats::SnapshotMaterialParser),
            Arc::new(marionette_formats::PngTextureDecoder),
            Arc::new(marionette_formats::SnapshotDeformParser),
        )
    }

    fn simple_doc(bone: &str) -> Vec<u8> {
        let mut doc = SkeletonDocument::new();
        doc.add_bone(SkeletonBone::new(bone));
        serde_json::to_vec(&doc).unwrap()
    }

    #[test]
    fn test_game_path_fallback_and_cache() {
        let mut files = HashMap::new();
        // Only the game path is loadable; the full path points elsewhere.
        files.insert("chara/skel.sklb".to_string(), simple_doc("n_root"));

        let parser = Arc::new(CountingParser(AtomicUsize::new(0)));
        let library = library_with(files, Arc::clone(&parser));

        let mut cache = SkeletonCache::new();
        let n = ResourceNode::new("", "", 0x736B_6C62, r"C:\mods\skel.sklb", "chara/skel.sklb");

        let mut resolver = SkeletonResolver::new(&library, &mut cache);
        let docs = resolver.resolve(&[&n]);
        assert_eq!(docs.len(), 1);
        assert!(cache.contains_key("chara/skel.sklb"));
        assert!(!cache.contains_key(r"C:\mods\skel.sklb"));

        // Second resolution hits the cache, the parser is not consulted again
        let mut resolver = SkeletonResolver::new(&library, &mut cache);
        let docs = resolver.resolve(&[&n]);
        assert_eq!(docs.len(), 1);
        assert_eq!(parser.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unloadable_skeleton_is_skipped() {
        let parser = Arc::new(CountingParser(AtomicUsize::new(0)));
        let library = library_with(HashMap::new(), parser);
        let mut cache = SkeletonCache::new();

        let n = node("chara/missing.sklb");
        let mut resolver = SkeletonResolver::new(&library, &mut cache);
        assert!(resolver.resolve(&[&n]).is_empty());
    }

    #[test]
    fn test_bone_map_merge_later_wins() {
        let mut body = SkeletonDocument::new();
        let root = body.add_bone(SkeletonBone::new("n_root"));
        let mut spine = SkeletonBone::new("j_spine");
        spine.parent = Some(root);
        body.add_bone(spine);

        let mut weapon = SkeletonDocument::new();
        weapon.add_bone(SkeletonBone::new("j_spine"));

        let mut scene = SceneBuilder::new("test");
        let map = build_bone_map(&[Arc::new(body), Arc::new(weapon)], &mut scene);

        // Three scene nodes exist, but j_spine now points at the weapon's node
        assert_eq!(scene.node_count(), 3);
        assert_eq!(map.len(), 2);
        assert_eq!(map.get("j_spine"), Some(2));
        // Root comes from the first document exposing one
        assert_eq!(map.root, Some(0));
        // Joint order is stable: n_root kept its slot
        assert_eq!(map.joint_index("n_root"), Some(0));
        assert_eq!(map.joint_index("j_spine"), Some(1));
    }
}
