//! Body-deformer container boundary
//!
//! The deformer container records, per race code, which race it derives from
//! and the per-bone matrices reshaping a parent race's vertices into its own
//! proportions. A mesh authored for race A bound to race B's skeleton walks
//! the lineage from A to B and applies each step's matrices in order.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::FormatResult;

/// Parses body-deformer containers
pub trait DeformParser: Send + Sync {
    fn parse(&self, bytes: &[u8]) -> FormatResult<DeformRegistry>;
}

/// Deformation data for one race code
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaceDeformEntry {
    /// The race this entry deforms into
    pub code: u16,
    /// The race this entry deforms from (lineage parent)
    pub parent: Option<u16>,
    /// Per-bone deform matrices, row-major, row-vector convention
    pub bone_matrices: HashMap<String, [[f32; 4]; 4]>,
}

impl RaceDeformEntry {
    /// Deform matrix for `bone`, if this step affects it
    pub fn matrix(&self, bone: &str) -> Option<&[[f32; 4]; 4]> {
        self.bone_matrices.get(bone)
    }
}

/// Parsed body-deformer container: race lineage plus per-race bone matrices
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeformRegistry {
    entries: HashMap<u16, RaceDeformEntry>,
}

impl DeformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with no entries; every chain lookup yields no deformation
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, entry: RaceDeformEntry) {
        self.entries.insert(entry.code, entry);
    }

    pub fn entry(&self, code: u16) -> Option<&RaceDeformEntry> {
        self.entries.get(&code)
    }

    /// Ordered deform steps taking `from`'s proportions to `to`'s.
    ///
    /// Walks `to`'s lineage upward until `from` is found; the collected
    /// entries are returned closest-to-`from` first. Returns `None` when
    /// `from` is not an ancestor of `to` (no deformation applies), and an
    /// empty sequence when the codes match.
    pub fn chain(&self, from: u16, to: u16) -> Option<Vec<&RaceDeformEntry>> {
        let mut steps = Vec::new();
        let mut cursor = to;
        while cursor != from {
            let entry = self.entries.get(&cursor)?;
            steps.push(entry);
            cursor = entry.parent?;
        }
        steps.reverse();
        Some(steps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(code: u16, parent: Option<u16>) -> RaceDeformEntry {
        RaceDeformEntry {
            code,
            parent,
            bone_matrices: HashMap::new(),
        }
    }

    fn lineage() -> DeformRegistry {
        let mut registry = DeformRegistry::new();
        registry.insert(entry(101, None));
        registry.insert(entry(201, Some(101)));
        registry.insert(entry(1801, Some(201)));
        registry
    }

    #[test]
    fn test_chain_through_intermediate() {
        let registry = lineage();
        let steps = registry.chain(101, 1801).unwrap();
        let codes: Vec<u16> = steps.iter().map(|s| s.code).collect();
        assert_eq!(codes, vec![201, 1801]);
    }

    #[test]
    fn test_chain_direct() {
        let registry = lineage();
        let steps = registry.chain(201, 1801).unwrap();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].code, 1801);
    }

    #[test]
    fn test_chain_identity() {
        let registry = lineage();
        assert!(registry.chain(1801, 1801).unwrap().is_empty());
    }

    #[test]
    fn test_chain_unrelated() {
        let registry = lineage();
        assert!(registry.chain(9999, 1801).is_none());
    }
}
