//! Race deformation
//!
//! A mesh authored for one race bound to another race's skeleton needs its
//! vertices reshaped toward the target proportions. The deformer parses the
//! authoring race code out of the mesh path and turns the registry's lineage
//! into the ordered step sequence the assembler applies per vertex.

use std::sync::Arc;

use marionette_formats::{DeformRegistry, RaceDeformEntry};
use regex::Regex;
use tracing::debug;

use crate::scene::math;

/// Computes per-vertex deformation between race codes
pub struct RaceDeformer {
    registry: Arc<DeformRegistry>,
}

impl RaceDeformer {
    pub fn new(registry: Arc<DeformRegistry>) -> Self {
        Self { registry }
    }

    /// Parse the authoring race code out of a resource path (`c` + 4 digits)
    pub fn race_code_from_path(path: &str) -> Option<u16> {
        #[allow(clippy::unwrap_used)] // pattern is a literal
        let pattern = Regex::new(r"c(\d{4})").unwrap();
        pattern
            .captures(path)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse().ok())
    }

    /// Ordered deform steps from `from`'s proportions to `to`'s. Empty when
    /// no deformation applies (same race, or unrelated lineage).
    pub fn deform_steps(&self, from: u16, to: u16) -> Vec<RaceDeformEntry> {
        match self.registry.chain(from, to) {
            Some(steps) => {
                if !steps.is_empty() {
                    debug!(%from, %to, count = steps.len(), "Deform chain resolved");
                }
                steps.into_iter().cloned().collect()
            }
            None => Vec::new(),
        }
    }
}

/// Apply one deform step to a position, weighted by the vertex's skin
/// influences. Bones without a matrix in this step contribute identity.
pub fn deform_position(
    step: &RaceDeformEntry,
    influences: &[(&str, f32)],
    position: [f32; 3],
) -> [f32; 3] {
    let mut acc = math::ZERO_MATRIX;
    let mut total = 0.0f32;

    for &(bone, weight) in influences {
        if weight <= 0.0 {
            continue;
        }
        let matrix = step.matrix(bone).unwrap_or(&math::IDENTITY_MATRIX);
        math::accumulate_weighted(&mut acc, matrix, weight);
        total += weight;
    }

    if total <= 0.0 {
        return position;
    }

    math::transform_position(position, &acc)
}
