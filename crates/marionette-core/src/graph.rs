//! Resource-graph data model
//!
//! A [`ResourceTree`] is the immutable input of one export: a named, flat list
//! of top-level [`ResourceNode`]s (each owning its children outright) plus the
//! packed body code of the captured character. Trees arrive either from a
//! live host integration or from a persisted JSON snapshot; both produce the
//! same in-memory shape.

use serde::{Deserialize, Deserializer, Serialize};

use crate::types::{BodyCode, ResourceKind};

/// One resource reference in the graph.
///
/// Ownership is strictly hierarchical: a node owns its children and nothing
/// points back up, so the graph is a tree by construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceNode {
    /// Primary display name (may be blank)
    pub name: String,
    /// Secondary name used when the primary is blank or whitespace
    #[serde(default)]
    pub fallback_name: String,
    /// Producer's integer resource-type code, see [`ResourceKind::from_code`]
    #[serde(rename = "type")]
    pub type_code: u64,
    /// Full resolved path, normalized exactly once at assignment
    #[serde(deserialize_with = "deserialize_full_path")]
    full_path: String,
    /// Canonical game-relative path
    pub game_path: String,
    /// Nested references (textures under a material, materials under a model)
    #[serde(default)]
    pub children: Vec<ResourceNode>,
}

impl ResourceNode {
    pub fn new(
        name: impl Into<String>,
        fallback_name: impl Into<String>,
        type_code: u64,
        full_path: impl Into<String>,
        game_path: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            fallback_name: fallback_name.into(),
            type_code,
            full_path: normalize_full_path(&full_path.into()),
            game_path: game_path.into(),
            children: Vec::new(),
        }
    }

    /// Display name, falling back when the primary is blank or whitespace
    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            &self.fallback_name
        } else {
            &self.name
        }
    }

    /// Resource kind decoded from the producer's type code
    pub fn kind(&self) -> ResourceKind {
        ResourceKind::from_code(self.type_code)
    }

    /// Full resolved path (already normalized)
    pub fn full_path(&self) -> &str {
        &self.full_path
    }

    /// Replace the full path; normalization is applied here and nowhere else
    pub fn set_full_path(&mut self, path: impl Into<String>) {
        self.full_path = normalize_full_path(&path.into());
    }

    /// Append a child node
    pub fn push_child(&mut self, child: ResourceNode) -> &mut Self {
        self.children.push(child);
        self
    }
}

/// The typed node tree describing one rendered character
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceTree {
    pub name: String,
    /// Packed gender/race/body code of the character
    pub race_code: u16,
    /// Top-level nodes, in the producer's order
    pub nodes: Vec<ResourceNode>,
}

impl ResourceTree {
    pub fn new(name: impl Into<String>, race_code: u16) -> Self {
        Self {
            name: name.into(),
            race_code,
            nodes: Vec::new(),
        }
    }

    /// Decoded body code of the captured character
    pub fn body(&self) -> BodyCode {
        BodyCode::new(self.race_code)
    }

    /// Top-level nodes of the given kind, in input order
    pub fn nodes_of_kind(&self, kind: ResourceKind) -> impl Iterator<Item = &ResourceNode> {
        self.nodes.iter().filter(move |n| n.kind() == kind)
    }
}

/// Normalize a full path: non-rooted paths have every backslash separator
/// rewritten to a forward slash; rooted paths are left byte-identical.
///
/// Idempotent: normalizing an already-normalized path is a no-op.
pub fn normalize_full_path(path: &str) -> String {
    if is_rooted(path) {
        path.to_string()
    } else {
        path.replace('\\', "/")
    }
}

/// Rooted under either path convention: `/...`, `\...`, `C:\...`, `C:/...`
fn is_rooted(path: &str) -> bool {
    if path.starts_with('/') || path.starts_with('\\') {
        return true;
    }
    let bytes = path.as_bytes();
    bytes.len() >= 3
        && bytes[0].is_ascii_alphabetic()
        && bytes[1] == b':'
        && (bytes[2] == b'\\' || bytes[2] == b'/')
}

fn deserialize_full_path<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Ok(normalize_full_path(&raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_rooted_backslashes_rewritten() {
        let node = ResourceNode::new("a", "", 0, r"chara\human\c0101\body.mtrl", "g");
        assert_eq!(node.full_path(), "chara/human/c0101/body.mtrl");
        assert!(!node.full_path().contains('\\'));
    }

    #[test]
    fn test_rooted_paths_untouched() {
        let windows = r"C:\mods\penumbra\body.tex";
        let node = ResourceNode::new("a", "", 0, windows, "g");
        assert_eq!(node.full_path(), windows);

        let unix = "/tmp/mods/body.tex";
        let node = ResourceNode::new("a", "", 0, unix, "g");
        assert_eq!(node.full_path(), unix);
    }

    #[test]
    fn test_normalization_idempotent() {
        let once = normalize_full_path(r"a\b\c.mdl");
        let twice = normalize_full_path(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_display_name_fallback() {
        let node = ResourceNode::new("   ", "fallback", 0, "p", "g");
        assert_eq!(node.display_name(), "fallback");

        let node = ResourceNode::new("primary", "fallback", 0, "p", "g");
        assert_eq!(node.display_name(), "primary");
    }

    #[test]
    fn test_snapshot_deserialization_normalizes() {
        let json = r#"{
            "name": "Character",
            "raceCode": 101,
            "nodes": [{
                "name": "body",
                "fallbackName": "",
                "type": 7169132,
                "fullPath": "chara\\human\\c0101\\model\\c0101b0001_top.mdl",
                "gamePath": "chara/human/c0101/model/c0101b0001_top.mdl",
                "children": []
            }]
        }"#;
        let tree: ResourceTree = serde_json::from_str(json).unwrap();
        assert_eq!(tree.body().tag(), "c0101");
        assert_eq!(
            tree.nodes[0].full_path(),
            "chara/human/c0101/model/c0101b0001_top.mdl"
        );
    }
}
