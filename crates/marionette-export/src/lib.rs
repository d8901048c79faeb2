//! Marionette Export Pipeline
//!
//! Converts a captured character resource graph into a portable scene:
//! - skeleton resolution and bone-map construction
//! - model loading through an ordered fallback chain
//! - race-specific vertex deformation
//! - material resolution (exact, then fuzzy)
//! - shader-pack texture synthesis and PNG rasterization
//! - mesh/submesh/morph assembly into a glTF 2.0 scene

pub mod deform;
pub mod exporter;
pub mod material;
pub mod mesh;
pub mod model;
pub mod scene;
pub mod skeleton;
pub mod textures;

pub use deform::RaceDeformer;
pub use exporter::{CharacterExporter, ExportOptions, ExportOutcome, ExportSummary};
pub use material::{levenshtein, MaterialRecord};
pub use model::{ModelLoader, ResolvedModel};
pub use scene::{SceneBuilder, SceneError};
pub use skeleton::{order_skeleton_nodes, BoneMap, SkeletonResolver};
pub use textures::{ShaderPack, TextureSynthesizer, TextureWriter};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation signal.
///
/// Checked at phase boundaries and inside per-texture-usage loops; nothing
/// is preempted mid-pixel-loop, so cancellation latency is bounded by one
/// usage iteration.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation of the in-flight export
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
